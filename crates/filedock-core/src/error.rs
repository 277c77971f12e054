//! Error types for filedock.
//!
//! Public store, registry and session operations do not raise these across
//! their boundary; they log and return a sentinel instead. The variants are
//! used internally, by fallible constructors, and by the loader's error
//! callback.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the filedock library.
#[derive(Debug, Error)]
pub enum IngestError {
    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Content loading errors
    #[error("Failed to read {file_name}: {message}")]
    Read { file_name: String, message: String },

    #[error("Load aborted for {file_id}")]
    Aborted { file_id: String },

    // Identity registry errors
    #[error("Registry error for {file_id}: {message}")]
    Registry { file_id: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for filedock operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Coarse classification of an [`IngestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Read,
    Aborted,
    Registry,
    Internal,
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl IngestError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        IngestError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        IngestError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a registry error.
    pub fn registry(file_id: impl Into<String>, message: impl Into<String>) -> Self {
        IngestError::Registry {
            file_id: file_id.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Validation { .. } => ErrorKind::Validation,
            IngestError::Read { .. } | IngestError::Io { .. } => ErrorKind::Read,
            IngestError::Aborted { .. } => ErrorKind::Aborted,
            IngestError::Registry { .. } => ErrorKind::Registry,
            _ => ErrorKind::Internal,
        }
    }

    /// Check whether a caller may reasonably try the same load again.
    ///
    /// There is no built-in retry; this only informs callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Read { .. } | IngestError::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestError::validation("id", "must not be empty");
        assert_eq!(err.to_string(), "Validation error for id: must not be empty");

        let err = IngestError::Aborted {
            file_id: "file-a-1".into(),
        };
        assert_eq!(err.to_string(), "Load aborted for file-a-1");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            IngestError::registry("x", "unknown id").kind(),
            ErrorKind::Registry
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(IngestError::from(io).kind(), ErrorKind::Read);
        assert_eq!(IngestError::Other("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(IngestError::Read {
            file_name: "a.png".into(),
            message: "device busy".into(),
        }
        .is_retryable());
        assert!(!IngestError::Aborted {
            file_id: "x".into()
        }
        .is_retryable());
    }
}
