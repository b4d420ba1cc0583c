//! Commit glue.
//!
//! A commit delivers the nids of changed semantics. A [`LogicGraphSource`]
//! resolves each nid to the change the taxonomy cares about (a new logic
//! graph version or a new concept version); anything else resolves to
//! `None` and is ignored.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;

use taxon_db_core::{ConceptSeq, Nid, StampSeq};
use taxon_db_update::{LogicGraphChange, UpdateStats};

use crate::error::Result;

/// Semantics changed by one commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitRecord {
    pub semantic_nids: Vec<Nid>,
}

impl CommitRecord {
    pub fn new(semantic_nids: impl IntoIterator<Item = Nid>) -> Self {
        Self {
            semantic_nids: semantic_nids.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.semantic_nids.is_empty()
    }
}

/// A committed change relevant to the taxonomy.
#[derive(Clone, Debug)]
pub enum SemanticChange {
    /// New stated or inferred logic graph version.
    LogicGraph(LogicGraphChange),
    /// New version of the concept itself (status record).
    ConceptVersion { concept: ConceptSeq, stamp: StampSeq },
}

impl SemanticChange {
    pub fn concept(&self) -> ConceptSeq {
        match self {
            SemanticChange::LogicGraph(change) => change.origin(),
            SemanticChange::ConceptVersion { concept, .. } => *concept,
        }
    }
}

/// Resolves committed semantic nids.
pub trait LogicGraphSource: Debug + Send + Sync {
    /// The taxonomy-relevant change carried by `nid`, if any.
    fn change_for(&self, nid: Nid) -> Result<Option<SemanticChange>>;
}

/// Receives commits.
#[async_trait]
pub trait CommitListener: Send + Sync {
    /// Returns once every change of the commit is applied.
    async fn on_commit(&self, commit: &CommitRecord) -> Result<UpdateStats>;
}

/// In-memory [`LogicGraphSource`] for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryLogicGraphSource {
    changes: RwLock<HashMap<Nid, SemanticChange>>,
}

impl MemoryLogicGraphSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the change carried by `nid`, replacing any earlier one.
    pub fn insert(&self, nid: Nid, change: SemanticChange) {
        self.changes.write().insert(nid, change);
    }

    pub fn len(&self) -> usize {
        self.changes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.read().is_empty()
    }
}

impl LogicGraphSource for MemoryLogicGraphSource {
    fn change_for(&self, nid: Nid) -> Result<Option<SemanticChange>> {
        Ok(self.changes.read().get(&nid).cloned())
    }
}
