//! Error types for the gisflow pipelining engine.

use std::fmt;
use thiserror::Error;

/// Result alias used throughout gisflow.
pub type GisflowResult<T> = Result<T, GisflowError>;

/// Errors raised while building or running a workflow.
#[derive(Debug, Error)]
pub enum GisflowError {
    /// External command exited non-zero, could not be launched, or timed out.
    #[error("external command `{command}` failed ({status}): {diagnostics}")]
    ExternalProcessFailure {
        command: String,
        status: ExitStatusCode,
        diagnostics: String,
    },

    /// A file source could not be opened or fetched.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Acquisition attempted while the workflow is not active.
    #[error("workflow context closed: {0}")]
    ContextClosed(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GisflowError {
    /// Exit code of a failed external command, when the process ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            GisflowError::ExternalProcessFailure { status, .. } => status.0,
            _ => None,
        }
    }

    pub fn is_external_failure(&self) -> bool {
        matches!(self, GisflowError::ExternalProcessFailure { .. })
    }

    pub fn is_context_closed(&self) -> bool {
        matches!(self, GisflowError::ContextClosed(_))
    }

    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, GisflowError::SourceUnavailable(_))
    }
}

/// Exit code of an external process. `None` means the process never produced
/// one (launch failure, signal, timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatusCode(pub Option<i32>);

impl fmt::Display for ExitStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "no exit code"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_failure_display() {
        let err = GisflowError::ExternalProcessFailure {
            command: "gdal_translate".into(),
            status: ExitStatusCode(Some(1)),
            diagnostics: "ERROR 4: missing.tif: No such file".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("gdal_translate"));
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("No such file"));
        assert_eq!(err.exit_code(), Some(1));
        assert!(err.is_external_failure());
    }

    #[test]
    fn test_launch_failure_has_no_exit_code() {
        let err = GisflowError::ExternalProcessFailure {
            command: "gdaldem".into(),
            status: ExitStatusCode(None),
            diagnostics: "not found".into(),
        };
        assert_eq!(err.exit_code(), None);
        assert!(err.to_string().contains("no exit code"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: GisflowError = io.into();
        assert!(matches!(err, GisflowError::Io(_)));
        assert!(!err.is_context_closed());
    }
}
