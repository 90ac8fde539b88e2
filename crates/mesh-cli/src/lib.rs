//! Shared plumbing for the `mesh-hub`, `mesh-proxy` and `mesh-agent` binaries.

pub mod cli;
pub mod logging;

use std::future::Future;

use mesh_protocol::MeshError;
use tokio::task::JoinHandle;

pub use logging::init_logging;

/// Wait for a runtime task to end on its own or for Ctrl-C.
///
/// On interrupt `shutdown` is awaited and then the task is joined. A loop
/// error (or a panic in it) comes back as the error.
pub async fn run_until_interrupted<F, Fut>(
    mut task: JoinHandle<Result<(), MeshError>>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    tokio::select! {
        result = &mut task => {
            result??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
        }
    }
    shutdown().await;
    task.await??;
    Ok(())
}

/// Parse `--content`: JSON if it parses, otherwise a JSON string.
pub fn parse_content(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
