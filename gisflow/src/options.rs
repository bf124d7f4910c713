//! Workflow and logging configuration.

use gisflow_shared::errors::{GisflowError, GisflowResult};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the temp root directory.
pub const ENV_TEMP_ROOT: &str = "GISFLOW_TEMP_ROOT";
/// Environment variable overriding the workspace directory prefix.
pub const ENV_PREFIX: &str = "GISFLOW_PREFIX";

const DEFAULT_PREFIX: &str = "gisflow";

/// Options for a single workflow context.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowOptions {
    /// Parent directory for every workspace. Must be absolute.
    pub temp_root: PathBuf,
    /// Prefix of the per-workflow workspace directory name.
    pub prefix: String,
    /// Upper bound on a single remote fetch. `None` waits indefinitely.
    pub fetch_timeout_ms: Option<u64>,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            temp_root: std::env::temp_dir(),
            prefix: DEFAULT_PREFIX.to_string(),
            fetch_timeout_ms: None,
        }
    }
}

impl WorkflowOptions {
    /// Defaults overridden by `GISFLOW_TEMP_ROOT` / `GISFLOW_PREFIX`.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(root) = std::env::var(ENV_TEMP_ROOT) {
            if !root.is_empty() {
                options.temp_root = PathBuf::from(root);
            }
        }
        if let Ok(prefix) = std::env::var(ENV_PREFIX) {
            if !prefix.is_empty() {
                options.prefix = prefix;
            }
        }
        options
    }

    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = temp_root.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    /// Reject option sets that would place workspaces somewhere unpredictable.
    pub fn sanitize(&self) -> GisflowResult<()> {
        if !self.temp_root.is_absolute() {
            return Err(GisflowError::Config(format!(
                "temp_root must be an absolute path, got: {}",
                self.temp_root.display()
            )));
        }
        if self.prefix.is_empty() || self.prefix.contains(std::path::MAIN_SEPARATOR) {
            return Err(GisflowError::Config(format!(
                "prefix must be a non-empty single path component, got: {:?}",
                self.prefix
            )));
        }
        Ok(())
    }
}

/// Options for [`crate::init_logging`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for daily rolling log files. Console only when unset.
    pub log_dir: Option<PathBuf>,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: Option<String>,
    pub ansi: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        let options = WorkflowOptions::default();
        assert!(options.sanitize().is_ok());
        assert_eq!(options.prefix, "gisflow");
        assert!(options.fetch_timeout().is_none());
    }

    #[test]
    fn test_relative_temp_root_rejected() {
        let options = WorkflowOptions::default().with_temp_root("relative/dir");
        let err = options.sanitize().unwrap_err();
        assert!(matches!(err, GisflowError::Config(_)));
    }

    #[test]
    fn test_prefix_with_separator_rejected() {
        let bad = format!("a{}b", std::path::MAIN_SEPARATOR);
        let options = WorkflowOptions::default().with_prefix(bad);
        assert!(options.sanitize().is_err());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let options: WorkflowOptions =
            serde_json::from_str(r#"{"prefix": "gunit", "fetch_timeout_ms": 1500}"#).unwrap();
        assert_eq!(options.prefix, "gunit");
        assert_eq!(options.fetch_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(options.temp_root, std::env::temp_dir());
    }
}
