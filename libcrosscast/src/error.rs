//! Error types for Crosscast

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T, E = CrosscastError> = std::result::Result<T, E>;

/// Result of a single backend operation
pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Error, Debug)]
pub enum CrosscastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrosscastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosscastError::InvalidInput(_) => 3,
            CrosscastError::Backend(BackendError::Authentication(_)) => 2,
            CrosscastError::Backend(_) => 1,
            CrosscastError::Config(_) => 1,
            CrosscastError::Io(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Failure of a single backend operation.
///
/// The variants form a closed taxonomy: every per-backend failure, whether
/// detected locally or reported by the remote side, lands in exactly one of
/// them and is captured into that backend's `PublishResult`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Chunk {index} (bytes {start}-{end}) failed to upload: {reason}")]
    ChunkUploadFailed {
        index: usize,
        start: u64,
        end: u64,
        reason: String,
    },

    #[error("Finalize rejected: {0}")]
    FinalizeFailed(String),

    #[error("Server-side processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Processing did not finish within {}s", waited.as_secs())]
    ProcessingTimeout { waited: Duration },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response shape: {0}")]
    UnexpectedResponseShape(String),
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Authentication(_) => ErrorKind::Authentication,
            BackendError::Validation(_) => ErrorKind::Validation,
            BackendError::ChunkUploadFailed { .. } => ErrorKind::ChunkUploadFailed,
            BackendError::FinalizeFailed(_) => ErrorKind::FinalizeFailed,
            BackendError::ProcessingFailed(_) => ErrorKind::ProcessingFailed,
            BackendError::ProcessingTimeout { .. } => ErrorKind::ProcessingTimeout,
            BackendError::Network(_) => ErrorKind::Network,
            BackendError::UnexpectedResponseShape(_) => ErrorKind::UnexpectedResponseShape,
        }
    }
}

/// Tag identifying which kind of failure a backend produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    Validation,
    ChunkUploadFailed,
    FinalizeFailed,
    ProcessingFailed,
    ProcessingTimeout,
    Network,
    UnexpectedResponseShape,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::Validation => "validation",
            ErrorKind::ChunkUploadFailed => "chunk_upload_failed",
            ErrorKind::FinalizeFailed => "finalize_failed",
            ErrorKind::ProcessingFailed => "processing_failed",
            ErrorKind::ProcessingTimeout => "processing_timeout",
            ErrorKind::Network => "network",
            ErrorKind::UnexpectedResponseShape => "unexpected_response_shape",
        };
        write!(f, "{}", s)
    }
}

/// Map an HTTP status returned by a backend to the error taxonomy
///
/// - 401/403 → `Authentication`
/// - 400/413/422 → `Validation`
/// - anything else → `Network`
pub fn error_for_status(status: u16, context: &str, body: &str) -> BackendError {
    match status {
        401 | 403 => BackendError::Authentication(format!(
            "{} rejected credentials (HTTP {}): {}. \
             Suggestion: verify the access token has not expired.",
            context, status, body
        )),
        400 | 413 | 422 => {
            BackendError::Validation(format!("{} rejected request (HTTP {}): {}", context, status, body))
        }
        _ => BackendError::Network(format!("{} failed (HTTP {}): {}", context, status, body)),
    }
}
