//! Record storage shared by the facade and every snapshot.
//!
//! Holds the packed per-origin records, the destination → origin reverse
//! index and a [`StampedGate`] that orders store-wide events (load, index
//! rebuild) against multi-step reads and updates.
//!
//! Reads run optimistically against two gates: the store's own and the one
//! the record spines take while growing or clearing. A read is retried under
//! both shared locks when either gate moved while it ran.

use std::path::Path;
use tracing::{info, warn};

use taxon_db_core::{ConceptSeq, TaxonomyVocabulary};
use taxon_db_record::{DestinationOriginIndex, PackedRecord, RecordError, TaxonomyRecord};
use taxon_db_spine::{SpineDirectory, SpinedArrayMap, StampedGate};
use taxon_db_tree::RecordSource;
use taxon_db_update::{LogicGraphChange, TaxonomyDelta, TaxonomyUpdateEngine, UpdateStats};

use crate::config::TaxonomyConfig;
use crate::error::Result;

/// Subdirectory of a data directory holding the record spines.
pub const RECORDS_DIR: &str = "taxonomy-records";

/// Versions of both gates guarding store reads.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReadStamp {
    store: u64,
    spines: u64,
}

#[derive(Debug)]
pub struct TaxonomyStore {
    vocabulary: TaxonomyVocabulary,
    records: SpinedArrayMap<PackedRecord>,
    index: DestinationOriginIndex,
    gate: StampedGate,
}

impl TaxonomyStore {
    pub fn new(vocabulary: TaxonomyVocabulary, spine_size: usize, spine_increment: usize) -> Self {
        Self {
            vocabulary,
            records: SpinedArrayMap::new(spine_size, spine_increment),
            index: DestinationOriginIndex::new(),
            gate: StampedGate::new(),
        }
    }

    pub fn from_config(vocabulary: TaxonomyVocabulary, config: &TaxonomyConfig) -> Self {
        Self::new(vocabulary, config.spine_size, config.spine_increment)
    }

    pub fn vocabulary(&self) -> &TaxonomyVocabulary {
        &self.vocabulary
    }

    pub fn records(&self) -> &SpinedArrayMap<PackedRecord> {
        &self.records
    }

    pub fn index(&self) -> &DestinationOriginIndex {
        &self.index
    }

    pub fn gate(&self) -> &StampedGate {
        &self.gate
    }

    /// Stamp for an optimistic read, or `None` while a load, rebuild or
    /// spine growth is in progress.
    pub fn try_optimistic(&self) -> Option<ReadStamp> {
        Some(ReadStamp {
            store: self.gate.try_optimistic()?,
            spines: self.records.store().gate().try_optimistic()?,
        })
    }

    /// True if neither gate moved since `stamp` was taken.
    pub fn validate(&self, stamp: ReadStamp) -> bool {
        self.gate.validate(stamp.store) && self.records.store().gate().validate(stamp.spines)
    }

    /// Run `f` optimistically; rerun it under both shared locks if a
    /// structural change raced with it. `f` must not grow the record spines.
    fn optimistic_read<R>(&self, f: impl Fn() -> R) -> R {
        if let Some(stamp) = self.try_optimistic() {
            let result = f();
            if self.validate(stamp) {
                return result;
            }
        }
        let _store = self.gate.read();
        let _spines = self.records.store().gate().read();
        f()
    }

    /// Decoded record of `origin`.
    pub fn record(&self, origin: ConceptSeq) -> std::result::Result<Option<TaxonomyRecord>, RecordError> {
        self.optimistic_read(|| {
            self.records
                .get(origin.as_usize())
                .map(|packed| packed.unpack())
                .transpose()
        })
    }

    /// Every origin with a stored record, ascending.
    pub fn origins(&self) -> Vec<ConceptSeq> {
        self.optimistic_read(|| {
            self.records
                .keys()
                .into_iter()
                .map(|key| ConceptSeq(key as u32))
                .collect()
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Apply one logic graph change.
    pub fn update(&self, engine: &TaxonomyUpdateEngine, change: &LogicGraphChange) -> Result<UpdateStats> {
        let _shared = self.gate.read();
        Ok(engine.update(change, &self.records, &self.index)?)
    }

    /// Merge a precomputed delta.
    pub fn apply(&self, engine: &TaxonomyUpdateEngine, delta: &TaxonomyDelta) -> Result<UpdateStats> {
        let _shared = self.gate.read();
        if !delta.is_empty() {
            engine.apply(delta, &self.records, &self.index)?;
        }
        Ok(delta.stats)
    }

    /// Replace the contents with the records persisted under `dir` and
    /// rebuild the reverse index from them.
    pub fn load(&self, dir: &Path) -> Result<usize> {
        let segment = SpineDirectory::open(dir.join(RECORDS_DIR))?;
        let _exclusive = self.gate.write();
        let spines = self.records.load(&segment)?;
        let entries = self.index_entries()?;
        self.index.rebuild(entries);
        info!(
            dir = %dir.display(),
            spines,
            records = self.records.len(),
            index_pairs = self.index.len(),
            "taxonomy store loaded"
        );
        Ok(spines)
    }

    /// Check that the reverse index holds every relationship destination of
    /// `origin`'s record. On a mismatch the index is rebuilt from the stored
    /// records and `false` is returned.
    ///
    /// Must not be called while holding the store gate.
    pub fn verify_index(&self, origin: ConceptSeq, record: &TaxonomyRecord) -> Result<bool> {
        let destinations = relationship_destinations(record, self.vocabulary.concept_status);
        if self.index.verify(origin, &destinations) {
            return Ok(true);
        }
        warn!(origin = %origin, "reverse index is missing destinations; rebuilding");
        self.rebuild_index()?;
        Ok(false)
    }

    /// Rebuild the reverse index from the stored records. Returns the number
    /// of indexed pairs.
    pub fn rebuild_index(&self) -> Result<usize> {
        let _exclusive = self.gate.write();
        let entries = self.index_entries()?;
        self.index.rebuild(entries);
        Ok(self.index.len())
    }

    /// Persist every changed spine under `dir`.
    pub fn sync(&self, dir: &Path) -> Result<usize> {
        let segment = SpineDirectory::open(dir.join(RECORDS_DIR))?;
        let _shared = self.gate.read();
        let written = self.records.sync(&segment)?;
        info!(dir = %dir.display(), spines = written, "taxonomy store synced");
        Ok(written)
    }

    /// `(origin, relationship destinations)` for every stored record.
    /// Concept-status self records are not relationships.
    fn index_entries(&self) -> Result<Vec<(ConceptSeq, Vec<ConceptSeq>)>> {
        let concept_status = self.vocabulary.concept_status;
        let mut entries = Vec::new();
        let mut failure = None;
        self.records.for_each(|key, packed| {
            if failure.is_some() {
                return;
            }
            match packed.unpack() {
                Ok(record) => {
                    entries.push((
                        ConceptSeq(key as u32),
                        relationship_destinations(&record, concept_status),
                    ));
                }
                Err(e) => failure = Some(e),
            }
        });
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(entries),
        }
    }
}

/// Destinations of `record` that carry at least one non-status tuple.
fn relationship_destinations(record: &TaxonomyRecord, concept_status: ConceptSeq) -> Vec<ConceptSeq> {
    record
        .iter()
        .filter(|(_, set)| set.iter().any(|t| t.type_seq != concept_status))
        .map(|(destination, _)| destination)
        .collect()
}

impl RecordSource for TaxonomyStore {
    fn record(&self, origin: ConceptSeq) -> std::result::Result<Option<TaxonomyRecord>, RecordError> {
        TaxonomyStore::record(self, origin)
    }
}
