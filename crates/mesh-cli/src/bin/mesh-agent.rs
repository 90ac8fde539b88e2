use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use mesh_cli::cli::{AgentArgs, AgentCommand};
use mesh_protocol::{AgentClient, Delivery, MeshError};

const FLUSH_LIMIT: Duration = Duration::from_secs(2);

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = AgentArgs::parse();
    let mut client = AgentClient::connect(&args.name, &args.proxy_addr()).await?;

    match args.command {
        AgentCommand::Send {
            to,
            msg_type,
            content,
            file,
            wait_ms,
        } => {
            let content = match (content, file) {
                (_, Some(path)) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))?
                }
                (Some(raw), None) => mesh_cli::parse_content(&raw),
                (None, None) => serde_json::Value::Null,
            };

            let envelope = client.send(&to, &msg_type, content)?;
            println!("[SENT] {} -> {} ({})", envelope.from, to, envelope.message_id);

            if let Some(delivery) = client.recv_timeout(Duration::from_millis(wait_ms)).await? {
                print_delivery(&delivery);
            }
        }
        AgentCommand::Listen => loop {
            tokio::select! {
                delivery = client.recv() => match delivery {
                    Ok(delivery) => print_delivery(&delivery),
                    Err(MeshError::Transport(e)) => return Err(e.into()),
                    Err(e) => tracing::warn!("skipping delivery: {e}"),
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        },
    }

    let stats = client.stats();
    eprintln!("sent {} received {} dropped {}", stats.sent, stats.received, stats.dropped);
    client.close_flushed(FLUSH_LIMIT).await;
    Ok(())
}

fn print_delivery(delivery: &Delivery) {
    println!("[{}] {}", delivery.sender, String::from_utf8_lossy(&delivery.raw));
}
