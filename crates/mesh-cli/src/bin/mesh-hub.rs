use clap::Parser;
use mesh_cli::cli::HubArgs;
use mesh_protocol::MeshHub;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = HubArgs::parse();
    let _guard = mesh_cli::init_logging(args.log.dir(), "mesh-hub.log")?;

    let hub = MeshHub::bind(args.config()).await?;
    eprintln!("mesh-hub v{} listening on {}", env!("CARGO_PKG_VERSION"), hub.local_addr());

    let (handle, task) = hub.spawn();
    mesh_cli::run_until_interrupted(task, || async move { handle.shutdown().await }).await
}
