//! Coordinate-bound taxonomy views.
//!
//! Two implementations of [`TaxonomySnapshot`]:
//!
//! - [`TreeSnapshot`] answers from a precomputed [`Tree`] (cycle-free,
//!   cheap repeated queries, expensive to build)
//! - [`RecordSnapshot`] reads records on demand: parents from the origin's
//!   record, children from the reverse index confirmed against each
//!   candidate's record, kind-of by walking parents
//!
//! Both agree on which concepts take part: a concept is present only while
//! its concept-status self record is active at the coordinate, and an edge
//! counts only when both of its ends are present.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::Arc;

use taxon_db_core::{ConceptSeq, PositionCalculator, TaxonomyCoordinate};
use taxon_db_record::{TaxonomyRecord, TypeMatch};
use taxon_db_tree::{kind_of_walk, Tree};

use crate::error::Result;
use crate::store::TaxonomyStore;

/// Whether a snapshot is backed by a precomputed tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum SnapshotMode {
    #[default]
    Tree,
    NoTree,
}

/// Immutable view of the taxonomy at one coordinate.
pub trait TaxonomySnapshot: Debug + Send + Sync {
    fn coordinate(&self) -> &TaxonomyCoordinate;

    fn mode(&self) -> SnapshotMode;

    /// The concept's status record is active at the coordinate.
    fn is_concept_active(&self, concept: ConceptSeq) -> Result<bool>;

    /// Active parents, ascending.
    fn parents(&self, concept: ConceptSeq) -> Result<Vec<ConceptSeq>>;

    /// Active children, ascending.
    fn children(&self, concept: ConceptSeq) -> Result<Vec<ConceptSeq>>;

    /// `child` is `parent` or one of its descendants.
    fn is_kind_of(&self, child: ConceptSeq, parent: ConceptSeq) -> Result<bool>;

    /// Every concept below `concept`, ascending, `concept` excluded.
    fn descendants(&self, concept: ConceptSeq) -> Result<Vec<ConceptSeq>> {
        let mut seen = std::collections::BTreeSet::new();
        let mut queue: VecDeque<ConceptSeq> = VecDeque::from([concept]);
        while let Some(next) = queue.pop_front() {
            for child in self.children(next)? {
                if child != concept && seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        Ok(seen.into_iter().collect())
    }
}

// ============================================================================
// RecordSnapshot
// ============================================================================

/// Snapshot answering straight from the stored records.
#[derive(Debug, Clone)]
pub struct RecordSnapshot {
    coordinate: TaxonomyCoordinate,
    calc: Arc<dyn PositionCalculator>,
    store: Arc<TaxonomyStore>,
    suspicious_depth: usize,
}

impl RecordSnapshot {
    pub fn new(
        coordinate: TaxonomyCoordinate,
        calc: Arc<dyn PositionCalculator>,
        store: Arc<TaxonomyStore>,
        suspicious_depth: usize,
    ) -> Self {
        Self {
            coordinate,
            calc,
            store,
            suspicious_depth,
        }
    }

    pub fn calculator(&self) -> &Arc<dyn PositionCalculator> {
        &self.calc
    }

    /// Record of `concept` if the concept is active. Every record read here
    /// is checked against the reverse index.
    fn active_record(&self, concept: ConceptSeq) -> Result<Option<TaxonomyRecord>> {
        let Some(record) = self.store.record(concept)? else {
            return Ok(None);
        };
        self.store.verify_index(concept, &record)?;
        let active =
            record.concept_satisfies_stamp(concept, self.calc.as_ref(), &self.coordinate.vocabulary);
        Ok(active.then_some(record))
    }

    fn is_a(&self) -> TypeMatch<'static> {
        TypeMatch::One(self.coordinate.vocabulary.is_a)
    }
}

impl TaxonomySnapshot for RecordSnapshot {
    fn coordinate(&self) -> &TaxonomyCoordinate {
        &self.coordinate
    }

    fn mode(&self) -> SnapshotMode {
        SnapshotMode::NoTree
    }

    fn is_concept_active(&self, concept: ConceptSeq) -> Result<bool> {
        Ok(self.active_record(concept)?.is_some())
    }

    fn parents(&self, concept: ConceptSeq) -> Result<Vec<ConceptSeq>> {
        let Some(record) = self.active_record(concept)? else {
            return Ok(Vec::new());
        };
        let mut parents = Vec::new();
        for parent in record.destinations_of_type(
            self.is_a(),
            self.coordinate.flags(),
            self.calc.as_ref(),
            self.coordinate.policy,
        ) {
            if self.is_concept_active(parent)? {
                parents.push(parent);
            }
        }
        Ok(parents)
    }

    fn children(&self, concept: ConceptSeq) -> Result<Vec<ConceptSeq>> {
        if !self.is_concept_active(concept)? {
            return Ok(Vec::new());
        }
        // The index holds every origin that ever referenced `concept`; the
        // origin's own record decides whether the edge is active now.
        let mut children = Vec::new();
        for origin in self.store.index().origins_of(concept) {
            let Some(record) = self.active_record(origin)? else {
                continue;
            };
            if record.is_active_destination(
                concept,
                self.is_a(),
                self.coordinate.flags(),
                self.calc.as_ref(),
                self.coordinate.policy,
            ) {
                children.push(origin);
            }
        }
        Ok(children)
    }

    fn is_kind_of(&self, child: ConceptSeq, parent: ConceptSeq) -> Result<bool> {
        if child == parent {
            return self.is_concept_active(child);
        }
        kind_of_walk(child, parent, |c| self.parents(c), self.suspicious_depth)
    }
}

// ============================================================================
// TreeSnapshot
// ============================================================================

/// Snapshot backed by a finished tree build.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    tree: Arc<Tree>,
    records: RecordSnapshot,
}

impl TreeSnapshot {
    pub fn new(tree: Arc<Tree>, records: RecordSnapshot) -> Self {
        Self { tree, records }
    }

    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    pub fn roots(&self) -> &[ConceptSeq] {
        self.tree.roots()
    }

    /// Back edges dropped while building the tree.
    pub fn cycles(&self) -> &[(ConceptSeq, ConceptSeq)] {
        self.tree.cycles()
    }
}

impl TaxonomySnapshot for TreeSnapshot {
    fn coordinate(&self) -> &TaxonomyCoordinate {
        self.records.coordinate()
    }

    fn mode(&self) -> SnapshotMode {
        SnapshotMode::Tree
    }

    fn is_concept_active(&self, concept: ConceptSeq) -> Result<bool> {
        self.records.is_concept_active(concept)
    }

    fn parents(&self, concept: ConceptSeq) -> Result<Vec<ConceptSeq>> {
        Ok(self.tree.parents_of(concept).to_vec())
    }

    fn children(&self, concept: ConceptSeq) -> Result<Vec<ConceptSeq>> {
        Ok(self.tree.children_of(concept).to_vec())
    }

    fn is_kind_of(&self, child: ConceptSeq, parent: ConceptSeq) -> Result<bool> {
        if child == parent {
            return Ok(self.tree.contains(child));
        }
        Ok(self.tree.is_descendant_of(child, parent))
    }

    fn descendants(&self, concept: ConceptSeq) -> Result<Vec<ConceptSeq>> {
        Ok(self.tree.descendants_of(concept))
    }
}
