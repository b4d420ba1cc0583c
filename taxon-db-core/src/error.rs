//! Error types for taxon-db-core

use thiserror::Error;

use crate::ids::StampSeq;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A stamp sequence the stamp service has never issued
    #[error("Unknown stamp: {0}")]
    UnknownStamp(StampSeq),

    /// A concept sequence or nid with no known translation
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    /// Collaborator failure (identifier, stamp or position service)
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Create an unknown identifier error
    pub fn unknown_identifier(msg: impl Into<String>) -> Self {
        CoreError::UnknownIdentifier(msg.into())
    }

    /// Create a collaborator error
    pub fn collaborator(msg: impl Into<String>) -> Self {
        CoreError::Collaborator(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        CoreError::Other(msg.into())
    }
}
