//! Taxonomy update engine.
//!
//! Turns a committed logic graph version into stamp records on the origin's
//! taxonomy record:
//!
//! - relationships only in the new version get a tuple with the new stamp
//! - relationships only in the previous version get a tuple with the retired
//!   counterpart of the new stamp
//!
//! Nothing is ever deleted. The delta is merged into the stored record with
//! an accumulate (compare-and-swap retry), so concurrent updates of the same
//! origin are serialized without a lock.

use std::sync::Arc;
use tracing::debug;

use taxon_db_core::{ConceptSeq, PremiseType, StampSeq, StampService, TaxonomyFlags, TaxonomyVocabulary};
use taxon_db_record::{DestinationOriginIndex, PackedRecord, TaxonomyRecordBuilder};
use taxon_db_spine::SpinedArrayMap;

use crate::differ::{ExpressionDiffer, RelationshipDiffer};
use crate::error::Result;
use crate::expression::LogicalExpression;

/// A committed logic graph version of one concept.
#[derive(Clone, Debug)]
pub struct LogicGraphChange {
    pub premise: PremiseType,
    /// Stamp of the new version.
    pub stamp: StampSeq,
    pub previous: Option<LogicalExpression>,
    pub current: LogicalExpression,
}

impl LogicGraphChange {
    pub fn new(premise: PremiseType, stamp: StampSeq, current: LogicalExpression) -> Self {
        Self {
            premise,
            stamp,
            previous: None,
            current,
        }
    }

    pub fn with_previous(mut self, previous: LogicalExpression) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn origin(&self) -> ConceptSeq {
        self.current.concept()
    }
}

/// Counters for one update (or a batch, via [`UpdateStats::absorb`]).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateStats {
    pub added: usize,
    pub retired: usize,
    pub features_skipped: usize,
    pub universal_skipped: usize,
    pub role_groups_expanded: usize,
    pub concept_versions: usize,
}

impl UpdateStats {
    pub fn absorb(&mut self, other: &UpdateStats) {
        self.added += other.added;
        self.retired += other.retired;
        self.features_skipped += other.features_skipped;
        self.universal_skipped += other.universal_skipped;
        self.role_groups_expanded += other.role_groups_expanded;
        self.concept_versions += other.concept_versions;
    }
}

/// Records to merge into one origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaxonomyDelta {
    pub origin: ConceptSeq,
    pub record: TaxonomyRecordBuilder,
    pub stats: UpdateStats,
}

impl TaxonomyDelta {
    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TaxonomyUpdateEngine {
    vocabulary: TaxonomyVocabulary,
    stamps: Arc<dyn StampService>,
    differ: Arc<dyn ExpressionDiffer>,
}

impl TaxonomyUpdateEngine {
    /// Engine with the default [`RelationshipDiffer`].
    pub fn new(vocabulary: TaxonomyVocabulary, stamps: Arc<dyn StampService>) -> Self {
        Self {
            vocabulary,
            stamps,
            differ: Arc::new(RelationshipDiffer),
        }
    }

    pub fn with_differ(mut self, differ: Arc<dyn ExpressionDiffer>) -> Self {
        self.differ = differ;
        self
    }

    pub fn vocabulary(&self) -> &TaxonomyVocabulary {
        &self.vocabulary
    }

    /// Stamp records implied by `change`, not yet applied.
    pub fn compute(&self, change: &LogicGraphChange) -> Result<TaxonomyDelta> {
        let diff = self
            .differ
            .diff(change.previous.as_ref(), &change.current, &self.vocabulary)?;
        let flags = change.premise.flags();
        let mut record = TaxonomyRecordBuilder::new();

        for rel in &diff.added {
            record.add_stamp_record(rel.destination, rel.type_seq, change.stamp, flags);
        }
        if !diff.removed.is_empty() {
            let retired = self.stamps.retired_stamp_for(change.stamp)?;
            for rel in &diff.removed {
                record.add_stamp_record(rel.destination, rel.type_seq, retired, flags);
            }
        }

        Ok(TaxonomyDelta {
            origin: change.origin(),
            record,
            stats: UpdateStats {
                added: diff.added.len(),
                retired: diff.removed.len(),
                features_skipped: diff.features_skipped,
                universal_skipped: diff.universal_skipped,
                role_groups_expanded: diff.role_groups_expanded,
                concept_versions: 0,
            },
        })
    }

    /// Self record marking a concept version under `stamp`.
    pub fn concept_status_delta(&self, concept: ConceptSeq, stamp: StampSeq) -> TaxonomyDelta {
        let mut record = TaxonomyRecordBuilder::new();
        record.add_stamp_record(
            concept,
            self.vocabulary.concept_status,
            stamp,
            TaxonomyFlags::CONCEPT_STATUS,
        );
        TaxonomyDelta {
            origin: concept,
            record,
            stats: UpdateStats {
                concept_versions: 1,
                ..UpdateStats::default()
            },
        }
    }

    /// Merge `delta` into the stored record of its origin and index the
    /// destinations it mentions.
    pub fn apply(
        &self,
        delta: &TaxonomyDelta,
        records: &SpinedArrayMap<PackedRecord>,
        index: &DestinationOriginIndex,
    ) -> Result<Arc<PackedRecord>> {
        let stored = records.accumulate_and_get(delta.origin.as_usize(), &delta.record, |current, add| {
            PackedRecord::merged(current, add)
        })?;
        let concept_status = self.vocabulary.concept_status;
        let relationship_destinations: Vec<ConceptSeq> = delta
            .record
            .destinations()
            .filter(|d| {
                delta
                    .record
                    .get(*d)
                    .is_some_and(|set| set.iter().any(|t| t.type_seq != concept_status))
            })
            .collect();
        index.insert_all(delta.origin, relationship_destinations);
        Ok(stored)
    }

    /// [`compute`](Self::compute) then [`apply`](Self::apply).
    pub fn update(
        &self,
        change: &LogicGraphChange,
        records: &SpinedArrayMap<PackedRecord>,
        index: &DestinationOriginIndex,
    ) -> Result<UpdateStats> {
        let delta = self.compute(change)?;
        if !delta.is_empty() {
            self.apply(&delta, records, index)?;
        }
        debug!(
            origin = %delta.origin,
            premise = ?change.premise,
            added = delta.stats.added,
            retired = delta.stats.retired,
            role_groups = delta.stats.role_groups_expanded,
            features_skipped = delta.stats.features_skipped,
            "taxonomy update applied"
        );
        Ok(delta.stats)
    }
}
