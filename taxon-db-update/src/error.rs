//! Error types for taxonomy updates

use taxon_db_core::{ConceptSeq, CoreError};
use taxon_db_record::RecordError;
use thiserror::Error;

/// Update engine errors
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Collaborator failure (e.g. the stamp service cannot retire a stamp)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Record could not be packed or the stored record does not decode
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Expression arena is malformed
    #[error("Invalid logical expression: {0}")]
    InvalidExpression(String),

    /// Previous and current expressions describe different concepts
    #[error("Expression concept mismatch: expected {expected}, found {found}")]
    ConceptMismatch {
        expected: ConceptSeq,
        found: ConceptSeq,
    },
}

impl UpdateError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        UpdateError::InvalidExpression(msg.into())
    }
}

/// Result type for update operations
pub type Result<T> = std::result::Result<T, UpdateError>;
