//! Tracing setup.
//!
//! Log lines always go to stderr; when the config names a log file they are
//! appended there as well, without ANSI codes. `RUST_LOG` overrides the
//! configured level.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the logging system.
///
/// `level` is a tracing level name ("error" through "trace"); `log_file`
/// additionally appends every line to that file.
pub fn init(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ovpnctl={level}")));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match log_file {
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
        }
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_target(false).with_ansi(false).with_writer(file))
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
        }
    }

    Ok(())
}

/// Initialize logging for tests; ignores the error when a subscriber is
/// already installed.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = init("debug", None);
}
