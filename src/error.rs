//! Error types for logger setup and sink failures
//!
//! Configuration-time errors ([`PathResolutionError`], [`InvalidSinkConfigError`])
//! are returned from [`crate::LoggerFacade::configure`]. Runtime write failures
//! ([`SinkWriteError`]) never reach the call site of a log statement; the facade
//! reports them through the remaining healthy sinks.

use std::path::PathBuf;

use thiserror::Error;

/// A writable log directory could not be established
#[derive(Debug, Clone, Error)]
#[error("cannot use log directory {}: {reason}", .path.display())]
pub struct PathResolutionError {
    /// The directory that was tried last
    pub path: PathBuf,
    /// Human-readable reason
    pub reason: String,
}

impl PathResolutionError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A sink configuration failed validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid sink config '{sink}': field '{field}' {reason}")]
pub struct InvalidSinkConfigError {
    /// Name of the offending sink config
    pub sink: String,
    /// Offending field
    pub field: &'static str,
    pub reason: String,
}

impl InvalidSinkConfigError {
    pub fn new(sink: impl Into<String>, field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            field,
            reason: reason.into(),
        }
    }
}

/// Categories of disk errors for user-friendly messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    /// Permission denied (read or write)
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// Sink panicked or its lock was poisoned
    Internal,
    /// Other IO error
    Other,
}

impl DiskErrorKind {
    /// Get a user-friendly message for this error kind
    pub fn user_message(&self) -> &'static str {
        match self {
            DiskErrorKind::DiskFull => "disk full",
            DiskErrorKind::PermissionDenied => "permission denied",
            DiskErrorKind::NotFound => "file or directory not found",
            DiskErrorKind::Internal => "internal sink failure",
            DiskErrorKind::Other => "write failed",
        }
    }
}

/// Categorize an IO error into a user-friendly category
pub fn categorize_io_error(e: &std::io::Error) -> DiskErrorKind {
    use std::io::ErrorKind;

    match e.kind() {
        ErrorKind::WriteZero => DiskErrorKind::DiskFull,
        ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,
        ErrorKind::NotFound => DiskErrorKind::NotFound,
        _ => {
            #[cfg(unix)]
            {
                if let Some(os_error) = e.raw_os_error() {
                    // ENOSPC = 28, EDQUOT = 122 on Linux and 69 on macOS
                    if os_error == 28 || os_error == 122 || os_error == 69 {
                        return DiskErrorKind::DiskFull;
                    }
                    // EACCES
                    if os_error == 13 {
                        return DiskErrorKind::PermissionDenied;
                    }
                }
            }
            DiskErrorKind::Other
        }
    }
}

/// A sink failed to persist or display a record
#[derive(Debug, Clone, Error)]
#[error("sink '{sink}' failed ({}): {message}", .kind.user_message())]
pub struct SinkWriteError {
    pub sink: String,
    pub kind: DiskErrorKind,
    pub message: String,
}

impl SinkWriteError {
    /// Build from an IO error raised while writing to `sink`
    pub fn io(sink: impl Into<String>, e: &std::io::Error) -> Self {
        Self {
            sink: sink.into(),
            kind: categorize_io_error(e),
            message: e.to_string(),
        }
    }

    pub fn internal(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            kind: DiskErrorKind::Internal,
            message: message.into(),
        }
    }
}

/// Top-level error returned by the facade
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error(transparent)]
    PathResolution(#[from] PathResolutionError),

    #[error(transparent)]
    InvalidSinkConfig(#[from] InvalidSinkConfigError),

    /// A sink passed validation but could not be activated
    #[error("failed to activate sink '{sink}': {source}")]
    Activation {
        sink: String,
        #[source]
        source: std::io::Error,
    },

    /// Options file could not be read or parsed
    #[error("failed to load logger options from {}: {message}", .path.display())]
    ConfigFile { path: PathBuf, message: String },

    /// The facade was shut down and cannot be configured again
    #[error("logger facade is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_categorize_permission_denied() {
        let e = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(categorize_io_error(&e), DiskErrorKind::PermissionDenied);
    }

    #[cfg(unix)]
    #[test]
    fn test_categorize_enospc() {
        let e = io::Error::from_raw_os_error(28);
        assert_eq!(categorize_io_error(&e), DiskErrorKind::DiskFull);
    }

    #[test]
    fn test_categorize_other() {
        let e = io::Error::new(io::ErrorKind::Other, "weird");
        assert_eq!(categorize_io_error(&e), DiskErrorKind::Other);
    }

    #[test]
    fn test_invalid_sink_config_names_sink_and_field() {
        let e = InvalidSinkConfigError::new("file", "rotation_size", "must be positive");
        let text = e.to_string();
        assert!(text.contains("'file'"));
        assert!(text.contains("'rotation_size'"));
    }

    #[test]
    fn test_sink_write_error_message() {
        let e = SinkWriteError::io("file", &io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(e.kind, DiskErrorKind::NotFound);
        assert!(e.to_string().contains("file or directory not found"));
    }
}
