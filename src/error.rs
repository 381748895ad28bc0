//! Error types with actionable diagnostics.
//!
//! Every failure the crate surfaces to a caller lives here. Malformed log
//! lines are deliberately absent: they are reported to the parser's
//! [`ErrorPolicy`](crate::parser::ErrorPolicy) and skipped, never raised.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for logbook operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while writing or reading logs.
#[derive(Error, Debug)]
pub enum Error {
    /// A backend needs a key that the record does not carry.
    #[error("Missing required key '{key}' for the {backend} backend\n  → Add '{key}' to the record or map an existing key onto it with key_map")]
    MissingRequiredKey { backend: String, key: String },

    /// A glob or directory resolved to zero files.
    #[error("No log files matched: {pattern}\n  → Check the path or glob pattern")]
    NoMatchingFiles { pattern: String },

    /// The glob pattern itself could not be compiled.
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A backend failed to persist or forward a record.
    #[error("{backend} backend write failed: {message}")]
    BackendWrite { backend: String, message: String },

    /// A backend was configured but cannot be instantiated.
    #[error("Unsupported backend: {backend}\n  → Provide a client for '{backend}' or remove it from the loggers config")]
    UnsupportedBackend { backend: String },

    /// Configuration is missing fields or could not be parsed.
    #[error("Invalid logbook configuration: {message}")]
    Config { message: String },

    /// A serialized experiment directory is incomplete or corrupt.
    #[error("Invalid experiment at {path}: {message}")]
    InvalidExperiment { path: PathBuf, message: String },

    /// Stored metric columns are inconsistent.
    #[error("Invalid metric table: {message}")]
    InvalidTable { message: String },

    /// IO error with context.
    #[error("IO error: {context}\n  Cause: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a backend write failure.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendWrite {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this error was caused by caller input rather than the environment.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::MissingRequiredKey { .. }
                | Self::NoMatchingFiles { .. }
                | Self::InvalidPattern { .. }
                | Self::UnsupportedBackend { .. }
                | Self::Config { .. }
        )
    }
}
