//! Error types for tree construction

use taxon_db_core::{ConceptSeq, CoreError};
use taxon_db_record::RecordError;
use thiserror::Error;

/// Tree build errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The build was cancelled before it finished
    #[error("Tree build cancelled")]
    Cancelled,

    /// A stored record failed to decode
    #[error("Record of {origin}: {source}")]
    Record {
        origin: ConceptSeq,
        #[source]
        source: RecordError,
    },

    /// Collaborator failure
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for tree operations
pub type Result<T> = std::result::Result<T, TreeError>;
