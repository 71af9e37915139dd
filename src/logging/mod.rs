//! Logging setup.
//!
//! A single `tracing` subscriber is installed once, at process entry,
//! writing to stdout and to a daily-rotating file under `log_dir`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "modelmux=info";

/// Initialize the global tracing subscriber.
///
/// Returns a [`WorkerGuard`] that must be held for the lifetime of the
/// process — dropping it flushes and stops the non-blocking file writer.
pub fn init_logging(log_dir: impl AsRef<Path>) -> anyhow::Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let file_appender = tracing_appender::rolling::daily(log_dir.as_ref(), "modelmux.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = fmt::layer().with_target(true);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(guard)
}
