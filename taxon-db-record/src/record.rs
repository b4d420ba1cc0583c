//! Per-origin taxonomy records.
//!
//! [`TaxonomyRecordBuilder`] is the mutable form used while merging updates.
//! [`TaxonomyRecord`] is the frozen form: immutable, cheap to clone and safe
//! to use as a map or set key. Both map destination → [`TypeStampFlagSet`]
//! with destinations in ascending order.

use std::collections::BTreeMap;
use std::sync::Arc;

use taxon_db_core::{
    ActivePolicy, ConceptSeq, PositionCalculator, StampSeq, TaxonomyFlags, TaxonomyVocabulary,
};

use crate::error::Result;
use crate::packed::PackedRecord;
use crate::tsf::{TypeMatch, TypeStampFlag, TypeStampFlagSet};

type Destinations = BTreeMap<ConceptSeq, TypeStampFlagSet>;

// ============================================================================
// Builder
// ============================================================================

/// Mutable record. Comparable but not hashable; freeze it to use as a key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaxonomyRecordBuilder {
    destinations: Destinations,
}

impl TaxonomyRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one version of the origin → `destination` relationship.
    pub fn add_stamp_record(
        &mut self,
        destination: ConceptSeq,
        type_seq: ConceptSeq,
        stamp: StampSeq,
        flags: TaxonomyFlags,
    ) -> bool {
        self.destinations
            .entry(destination)
            .or_default()
            .add(type_seq, stamp, flags)
    }

    pub fn add_tuple(&mut self, destination: ConceptSeq, tuple: TypeStampFlag) -> bool {
        self.destinations.entry(destination).or_default().insert(tuple)
    }

    /// Union `other` into `self`, creating destinations as needed.
    pub fn merge(&mut self, other: &TaxonomyRecordBuilder) {
        merge_into(&mut self.destinations, &other.destinations);
    }

    pub fn merge_record(&mut self, other: &TaxonomyRecord) {
        merge_into(&mut self.destinations, &other.destinations);
    }

    pub fn get(&self, destination: ConceptSeq) -> Option<&TypeStampFlagSet> {
        self.destinations.get(&destination)
    }

    pub fn destinations(&self) -> impl Iterator<Item = ConceptSeq> + '_ {
        self.destinations.keys().copied()
    }

    /// Number of destinations.
    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Total tuples across destinations.
    pub fn tuple_count(&self) -> usize {
        self.destinations.values().map(TypeStampFlagSet::len).sum()
    }

    pub fn pack(&self) -> Result<PackedRecord> {
        PackedRecord::from_destinations(&self.destinations)
    }

    pub fn freeze(self) -> TaxonomyRecord {
        TaxonomyRecord {
            destinations: Arc::new(self.destinations),
        }
    }
}

fn merge_into(into: &mut Destinations, from: &Destinations) {
    for (destination, set) in from {
        into.entry(*destination).or_default().merge(set);
    }
}

// ============================================================================
// Frozen record
// ============================================================================

/// Immutable record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TaxonomyRecord {
    destinations: Arc<Destinations>,
}

impl TaxonomyRecord {
    /// Mutable copy. Cheap if this is the only handle.
    pub fn thaw(self) -> TaxonomyRecordBuilder {
        TaxonomyRecordBuilder {
            destinations: Arc::try_unwrap(self.destinations).unwrap_or_else(|shared| (*shared).clone()),
        }
    }

    pub fn get(&self, destination: ConceptSeq) -> Option<&TypeStampFlagSet> {
        self.destinations.get(&destination)
    }

    pub fn destinations(&self) -> impl Iterator<Item = ConceptSeq> + '_ {
        self.destinations.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConceptSeq, &TypeStampFlagSet)> {
        self.destinations.iter().map(|(d, s)| (*d, s))
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    pub fn pack(&self) -> Result<PackedRecord> {
        PackedRecord::from_destinations(&self.destinations)
    }

    /// Destinations whose relationship of a matching type is active at the
    /// calculator's coordinate, ascending.
    ///
    /// A tuple qualifies when its flags contain `flags`. Under
    /// [`ActivePolicy::MatchingPremise`] only qualifying tuples take part in
    /// the latest-active decision; under [`ActivePolicy::AcrossPremises`]
    /// every tuple of a matching type does, provided at least one qualifies.
    pub fn destinations_of_type(
        &self,
        types: TypeMatch<'_>,
        flags: TaxonomyFlags,
        calc: &dyn PositionCalculator,
        policy: ActivePolicy,
    ) -> Vec<ConceptSeq> {
        self.destinations
            .iter()
            .filter(|(_, set)| set_is_active(set, types, flags, calc, policy))
            .map(|(destination, _)| *destination)
            .collect()
    }

    /// True if `destination` is an active destination of a matching type.
    pub fn is_active_destination(
        &self,
        destination: ConceptSeq,
        types: TypeMatch<'_>,
        flags: TaxonomyFlags,
        calc: &dyn PositionCalculator,
        policy: ActivePolicy,
    ) -> bool {
        self.destinations
            .get(&destination)
            .is_some_and(|set| set_is_active(set, types, flags, calc, policy))
    }

    /// Destinations with any tuple of a matching type, regardless of
    /// coordinate or flags.
    pub fn destinations_with_any_history(&self, types: TypeMatch<'_>) -> Vec<ConceptSeq> {
        self.destinations
            .iter()
            .filter(|(_, set)| set.contains_type_with_flags(types, TaxonomyFlags::EMPTY))
            .map(|(destination, _)| *destination)
            .collect()
    }

    /// Lookup with exact flag semantics (`EMPTY` is a wildcard).
    pub fn contains_destination_with_type_and_flags(
        &self,
        destination: ConceptSeq,
        types: TypeMatch<'_>,
        flags: TaxonomyFlags,
    ) -> bool {
        self.destinations
            .get(&destination)
            .is_some_and(|set| set.contains_type_with_flags(types, flags))
    }

    /// Concept-active state: the self record of type `vocabulary.concept_status`
    /// carrying the CONCEPT_STATUS flag is latest-active at the coordinate.
    pub fn concept_satisfies_stamp(
        &self,
        self_seq: ConceptSeq,
        calc: &dyn PositionCalculator,
        vocabulary: &TaxonomyVocabulary,
    ) -> bool {
        let Some(set) = self.destinations.get(&self_seq) else {
            return false;
        };
        let stamps = set.stamps_of_type_containing(
            TypeMatch::One(vocabulary.concept_status),
            TaxonomyFlags::CONCEPT_STATUS,
        );
        !stamps.is_empty() && calc.is_latest_active(&stamps)
    }
}

fn set_is_active(
    set: &TypeStampFlagSet,
    types: TypeMatch<'_>,
    flags: TaxonomyFlags,
    calc: &dyn PositionCalculator,
    policy: ActivePolicy,
) -> bool {
    match policy {
        ActivePolicy::MatchingPremise => {
            let stamps = set.stamps_of_type_containing(types, flags);
            !stamps.is_empty() && calc.is_latest_active(&stamps)
        }
        ActivePolicy::AcrossPremises => {
            let qualifies = set
                .iter()
                .any(|t| types.matches(t.type_seq) && t.flags.contains(flags));
            if !qualifies {
                return false;
            }
            let stamps = set.stamps_of_type_containing(types, TaxonomyFlags::EMPTY);
            calc.is_latest_active(&stamps)
        }
    }
}

impl From<TaxonomyRecordBuilder> for TaxonomyRecord {
    fn from(builder: TaxonomyRecordBuilder) -> Self {
        builder.freeze()
    }
}
