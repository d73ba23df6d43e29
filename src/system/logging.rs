//! Logging initialization
//!
//! Installs the global `tracing` subscriber from [`LoggingConfig`]:
//! stdout, an appended file, or a daily-rotating file, written through a
//! non-blocking worker. `RUST_LOG` overrides the configured level.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

type BoxedWriter = Box<dyn Write + Send + Sync>;

/// Select the log destination
fn build_writer(config: &LoggingConfig) -> anyhow::Result<BoxedWriter> {
    let log_file = match config.file.as_deref() {
        Some(file) if !file.is_empty() => file,
        _ => return Ok(Box::new(std::io::stdout())),
    };

    let path = Path::new(log_file);
    if config.enable_rotation {
        let dir = path.parent().unwrap_or(Path::new("."));
        let prefix = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("linkvault.log")
            .trim_end_matches(".log")
            .to_string();
        let appender = rolling::Builder::new()
            .rotation(rolling::Rotation::DAILY)
            .filename_prefix(prefix)
            .filename_suffix("log")
            .max_log_files(config.max_backups.max(1) as usize)
            .build(dir)
            .context("failed to create rolling log appender")?;
        Ok(Box::new(appender))
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        Ok(Box::new(file))
    }
}

/// Initialize the global subscriber.
///
/// Call once at startup. The returned guard must stay alive for buffered
/// log lines to be flushed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<WorkerGuard> {
    let (writer, guard) = tracing_appender::non_blocking(build_writer(config)?);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let to_console = config.file.as_deref().is_none_or(str::is_empty);

    let builder = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(filter)
        .with_level(true)
        .with_ansi(to_console);

    let installed = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))?;

    Ok(guard)
}
