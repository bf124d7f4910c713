//! Tracing subscriber setup.

use crate::options::LoggingOptions;
use gisflow_shared::errors::{GisflowError, GisflowResult};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_PREFIX: &str = "gisflow.log";

/// Keeps the non-blocking file writer flushing for the life of the process.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install a global subscriber: console output plus optional daily log files.
///
/// `RUST_LOG` takes precedence over `options.default_filter` (itself
/// defaulting to `info`). Returns `Ok(false)` if a subscriber was already
/// installed, so calling this more than once is harmless.
pub fn init_logging(options: &LoggingOptions) -> GisflowResult<bool> {
    let default_filter = options.default_filter.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| {
            GisflowError::Config(format!("invalid log filter '{}': {}", default_filter, e))
        })?;

    let console = fmt::layer().with_target(true).with_ansi(options.ansi);

    let file = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                GisflowError::Config(format!(
                    "Failed to create log directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            if FILE_GUARD.set(guard).is_err() {
                // Already logging to a file; the new guard is dropped here.
                return Ok(false);
            }
            Some(fmt::layer().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(log_dir = ?options.log_dir, "Logging initialized");
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_repeatable() {
        let options = LoggingOptions::default();
        let _ = init_logging(&options).unwrap();
        assert!(!init_logging(&options).unwrap());
    }

    #[test]
    fn test_invalid_filter_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let options = LoggingOptions {
            default_filter: Some("gisflow=loud".into()),
            ..Default::default()
        };
        assert!(matches!(init_logging(&options), Err(GisflowError::Config(_))));
    }
}
