//! Error types for pagekv
//!
//! Provides a unified error type for all operations.
//!
//! Structural refusals (a split or merge whose preconditions are not met)
//! are not errors; those operations report them through `Option`/`bool`.

use thiserror::Error;

/// Result type alias using PageKvError
pub type Result<T> = std::result::Result<T, PageKvError>;

/// Unified error type for pagekv operations
#[derive(Debug, Error)]
pub enum PageKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Operation not permitted: {0}")]
    Capability(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    // -------------------------------------------------------------------------
    // Page Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt page: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Backing Cache Errors
    // -------------------------------------------------------------------------
    #[error("Backing cache error: {0}")]
    Backend(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for PageKvError {
    fn from(err: bincode::Error) -> Self {
        PageKvError::Serialization(err.to_string())
    }
}

impl From<PageKvError> for std::io::Error {
    fn from(err: PageKvError) -> Self {
        use std::io::ErrorKind;

        let kind = match &err {
            PageKvError::Io(inner) => inner.kind(),
            PageKvError::InvalidArgument(_) | PageKvError::OutOfRange(_) => {
                ErrorKind::InvalidInput
            }
            PageKvError::Capability(_) => ErrorKind::PermissionDenied,
            PageKvError::NotFound(_) => ErrorKind::NotFound,
            PageKvError::Unsupported(_) => ErrorKind::Unsupported,
            PageKvError::Serialization(_) | PageKvError::Corruption(_) => ErrorKind::InvalidData,
            _ => ErrorKind::Other,
        };

        match err {
            PageKvError::Io(inner) => inner,
            other => std::io::Error::new(kind, other),
        }
    }
}
