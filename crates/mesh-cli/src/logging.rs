//! Subscriber setup shared by the binaries.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install stderr logging plus, when `log_dir` is given, a plain-text copy
/// in `<log_dir>/<file_name>`.
///
/// `RUST_LOG` overrides the default `info` filter. Keep the returned guard
/// alive for the life of the process or buffered file lines are lost.
pub fn init_logging(log_dir: Option<&Path>, file_name: &str) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let (writer, guard) = file_writer(dir, file_name)?;
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    if let Some(dir) = log_dir {
        tracing::info!("logging to {}", dir.join(file_name).display());
    }
    Ok(guard)
}

/// Non-blocking appender for one never-rotated file, creating `dir` first.
pub fn file_writer(dir: &Path, file_name: &str) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating log directory {}", dir.display()))?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_writer_creates_directory_and_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("logs");

        let (mut writer, guard) = file_writer(&dir, "mesh-hub.log").unwrap();
        writer.write_all(b"hub up\n").unwrap();
        drop(writer);
        drop(guard);

        let written = std::fs::read_to_string(dir.join("mesh-hub.log")).unwrap();
        assert!(written.contains("hub up"));
    }
}
