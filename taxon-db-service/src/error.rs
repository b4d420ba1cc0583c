//! Error types for the taxonomy service

use std::path::PathBuf;
use thiserror::Error;

use taxon_db_core::{CoreError, Nid};
use taxon_db_record::RecordError;
use taxon_db_spine::SpineError;
use taxon_db_tree::TreeError;
use taxon_db_update::UpdateError;

/// Service errors
#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Persistence failure
    #[error(transparent)]
    Spine(#[from] SpineError),

    /// A stored record does not decode
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    /// Tree build failed or was cancelled
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Config file unreadable or invalid
    #[error("Invalid taxonomy config: {detail}")]
    Config {
        path: Option<PathBuf>,
        detail: String,
    },

    /// Semantic change could not be resolved for a committed nid
    #[error("Change for {nid}: {detail}")]
    Change { nid: Nid, detail: String },

    /// One or more updates of a commit batch failed
    #[error("Commit batch failed: {failed} of {total} updates ({first})")]
    Batch {
        failed: usize,
        total: usize,
        first: Box<TaxonomyError>,
    },

    /// A worker task panicked or was aborted
    #[error("Task aborted: {0}")]
    TaskAborted(String),

    /// Persistence requested but no data directory is configured
    #[error("No data directory configured")]
    NoDataDir,
}

impl TaxonomyError {
    pub fn config(detail: impl Into<String>) -> Self {
        TaxonomyError::Config {
            path: None,
            detail: detail.into(),
        }
    }

    pub fn change(nid: Nid, detail: impl Into<String>) -> Self {
        TaxonomyError::Change {
            nid,
            detail: detail.into(),
        }
    }

    /// True for [`TreeError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaxonomyError::Tree(TreeError::Cancelled))
    }
}

/// Result type for service operations
pub type Result<T> = std::result::Result<T, TaxonomyError>;
