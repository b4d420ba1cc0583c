//! Error types for the spine store

use std::path::PathBuf;
use thiserror::Error;

/// Spine store errors
#[derive(Error, Debug)]
pub enum SpineError {
    /// I/O failure reading or writing a segment directory
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory layout violates the one-marker rule
    #[error("Inconsistent segment directory: {0}")]
    Inconsistent(String),

    /// Spine file bytes do not decode
    #[error("Corrupt spine {index}: {reason}")]
    Corrupt { index: usize, reason: String },
}

impl SpineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SpineError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(index: usize, reason: impl Into<String>) -> Self {
        SpineError::Corrupt {
            index,
            reason: reason.into(),
        }
    }
}

/// Result type for spine operations
pub type Result<T> = std::result::Result<T, SpineError>;
