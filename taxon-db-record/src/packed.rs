//! Packed `u32` form of a taxonomy record.
//!
//! A packed record is a sequence of runs (see [`tsf`](crate::tsf) for the run
//! layout), destinations ascending. A destination whose set exceeds one run's
//! capacity occupies several consecutive runs; unpacking unions them.
//!
//! This is the value stored per origin in the spine store.

use std::collections::BTreeMap;

use taxon_db_core::ConceptSeq;
use taxon_db_spine::PackedInts;

use crate::error::Result;
use crate::record::{TaxonomyRecord, TaxonomyRecordBuilder};
use crate::tsf::TypeStampFlagSet;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PackedRecord {
    ints: Box<[u32]>,
}

impl PackedRecord {
    pub(crate) fn from_destinations(destinations: &BTreeMap<ConceptSeq, TypeStampFlagSet>) -> Result<Self> {
        let total = destinations.values().map(TypeStampFlagSet::packed_len).sum();
        let mut ints = Vec::with_capacity(total);
        for (destination, set) in destinations {
            set.write_runs(*destination, &mut ints)?;
        }
        debug_assert_eq!(ints.len(), total);
        Ok(Self {
            ints: ints.into_boxed_slice(),
        })
    }

    /// Validate `ints` as a sequence of well-formed runs.
    pub fn from_ints(ints: Vec<u32>) -> Result<Self> {
        let packed = Self {
            ints: ints.into_boxed_slice(),
        };
        packed.unpack_builder()?;
        Ok(packed)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.ints
    }

    /// Int count.
    pub fn len(&self) -> usize {
        self.ints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ints.is_empty()
    }

    pub fn unpack_builder(&self) -> Result<TaxonomyRecordBuilder> {
        let mut builder = TaxonomyRecordBuilder::new();
        let mut offset = 0;
        while offset < self.ints.len() {
            let mut set = TypeStampFlagSet::new();
            let (destination, consumed) = TypeStampFlagSet::read_run(&self.ints, offset, &mut set)?;
            for tuple in set.iter() {
                builder.add_tuple(destination, *tuple);
            }
            offset += consumed;
        }
        Ok(builder)
    }

    pub fn unpack(&self) -> Result<TaxonomyRecord> {
        Ok(self.unpack_builder()?.freeze())
    }

    /// `current ∪ delta`, packed. The merge step of a record accumulate.
    pub fn merged(current: Option<&PackedRecord>, delta: &TaxonomyRecordBuilder) -> Result<PackedRecord> {
        let mut builder = match current {
            Some(packed) => packed.unpack_builder()?,
            None => TaxonomyRecordBuilder::new(),
        };
        builder.merge(delta);
        builder.pack()
    }
}

impl PackedInts for PackedRecord {
    fn ints(&self) -> &[u32] {
        &self.ints
    }

    fn from_ints(ints: Vec<u32>) -> std::result::Result<Self, String> {
        PackedRecord::from_ints(ints).map_err(|e| e.to_string())
    }
}
