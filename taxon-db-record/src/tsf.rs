//! Type-stamp-flag tuples and their per-destination sets.
//!
//! A [`TypeStampFlagSet`] holds every version ever asserted for one
//! origin → destination relationship. It only grows: retirement is a new
//! tuple whose stamp the stamp service reports as inactive.
//!
//! ## Packed run layout
//!
//! ```text
//! header: destination (low 24 bits) | run length (high 8 bits)
//! then per tuple: type, stamp, flags
//! run length = 1 + 3 × tuples, at most MAX_TUPLES_PER_RUN tuples per run
//! ```

use smallvec::SmallVec;
use std::collections::BTreeSet;

use taxon_db_core::{ConceptSeq, StampSeq, TaxonomyFlags, PACKED_VALUE_MASK};

use crate::error::{RecordError, Result};

/// Ints per packed tuple.
pub const INTS_PER_TUPLE: usize = 3;

/// Tuples that fit one run: the 8-bit length header caps a run at 255 ints.
pub const MAX_TUPLES_PER_RUN: usize = (0xFF - 1) / INTS_PER_TUPLE;

const LENGTH_SHIFT: u32 = 24;

/// Type selector for lookups.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypeMatch<'a> {
    Any,
    One(ConceptSeq),
    AnyOf(&'a [ConceptSeq]),
}

impl TypeMatch<'_> {
    #[inline]
    pub fn matches(&self, type_seq: ConceptSeq) -> bool {
        match self {
            TypeMatch::Any => true,
            TypeMatch::One(t) => *t == type_seq,
            TypeMatch::AnyOf(types) => types.contains(&type_seq),
        }
    }
}

/// One version of a relationship.
///
/// Field order gives the set order: type, then stamp, then flags.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeStampFlag {
    pub type_seq: ConceptSeq,
    pub stamp: StampSeq,
    pub flags: TaxonomyFlags,
}

impl TypeStampFlag {
    pub fn new(type_seq: ConceptSeq, stamp: StampSeq, flags: TaxonomyFlags) -> Self {
        Self {
            type_seq,
            stamp,
            flags,
        }
    }

    fn check_packable(&self) -> Result<()> {
        if !self.type_seq.fits_packed() {
            return Err(RecordError::ValueOutOfRange {
                field: "type",
                value: self.type_seq.0,
            });
        }
        if !self.stamp.fits_packed() {
            return Err(RecordError::ValueOutOfRange {
                field: "stamp",
                value: self.stamp.0,
            });
        }
        Ok(())
    }
}

/// Ordered, deduplicated set of [`TypeStampFlag`]s for one destination.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TypeStampFlagSet {
    tuples: BTreeSet<TypeStampFlag>,
}

/// Stamps collected for one latest-active decision. Most relationships have
/// only a handful of versions.
pub type StampList = SmallVec<[StampSeq; 8]>;

impl TypeStampFlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a version. Returns false when the exact tuple was already present.
    pub fn add(&mut self, type_seq: ConceptSeq, stamp: StampSeq, flags: TaxonomyFlags) -> bool {
        self.tuples.insert(TypeStampFlag::new(type_seq, stamp, flags))
    }

    pub fn insert(&mut self, tuple: TypeStampFlag) -> bool {
        self.tuples.insert(tuple)
    }

    /// Set union, in place.
    pub fn merge(&mut self, other: &TypeStampFlagSet) {
        self.tuples.extend(other.tuples.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeStampFlag> {
        self.tuples.iter()
    }

    /// Any tuple of a matching type whose flags match. Empty `flags` is a
    /// wildcard; otherwise flags must be equal.
    pub fn contains_type_with_flags(&self, types: TypeMatch<'_>, flags: TaxonomyFlags) -> bool {
        self.tuples
            .iter()
            .any(|t| types.matches(t.type_seq) && t.flags.matches(flags))
    }

    /// Every stamp of a matching type whose flags match (same rules as
    /// [`contains_type_with_flags`](Self::contains_type_with_flags)).
    pub fn stamps_of_type_with_flags(&self, types: TypeMatch<'_>, flags: TaxonomyFlags) -> StampList {
        self.tuples
            .iter()
            .filter(|t| types.matches(t.type_seq) && t.flags.matches(flags))
            .map(|t| t.stamp)
            .collect()
    }

    /// Every stamp of a matching type whose flags contain all of `required`.
    pub fn stamps_of_type_containing(&self, types: TypeMatch<'_>, required: TaxonomyFlags) -> StampList {
        self.tuples
            .iter()
            .filter(|t| types.matches(t.type_seq) && t.flags.contains(required))
            .map(|t| t.stamp)
            .collect()
    }

    /// Ints needed to pack this set as runs, headers included.
    pub fn packed_len(&self) -> usize {
        let n = self.tuples.len();
        let runs = n.div_ceil(MAX_TUPLES_PER_RUN);
        runs + n * INTS_PER_TUPLE
    }

    /// Append this set's runs for `destination` to `out`.
    pub fn write_runs(&self, destination: ConceptSeq, out: &mut Vec<u32>) -> Result<()> {
        if !destination.fits_packed() {
            return Err(RecordError::ValueOutOfRange {
                field: "destination",
                value: destination.0,
            });
        }
        let tuples: Vec<&TypeStampFlag> = self.tuples.iter().collect();
        for chunk in tuples.chunks(MAX_TUPLES_PER_RUN) {
            let len = (1 + chunk.len() * INTS_PER_TUPLE) as u32;
            out.push(destination.0 | (len << LENGTH_SHIFT));
            for tuple in chunk {
                tuple.check_packable()?;
                out.push(tuple.type_seq.0);
                out.push(tuple.stamp.0);
                out.push(tuple.flags.bits());
            }
        }
        Ok(())
    }

    /// Decode one run starting at `offset`. Returns the destination and the
    /// number of ints consumed.
    pub fn read_run(ints: &[u32], offset: usize, into: &mut Self) -> Result<(ConceptSeq, usize)> {
        let header = ints[offset];
        let len = (header >> LENGTH_SHIFT) as usize;
        let destination = ConceptSeq(header & PACKED_VALUE_MASK);
        if len == 0 {
            return Err(RecordError::ZeroLength { offset });
        }
        if (len - 1) % INTS_PER_TUPLE != 0 {
            return Err(RecordError::Misaligned { offset, len });
        }
        if offset + len > ints.len() {
            return Err(RecordError::Overrun {
                offset,
                len,
                available: ints.len(),
            });
        }
        for tuple in ints[offset + 1..offset + len].chunks_exact(INTS_PER_TUPLE) {
            into.tuples.insert(TypeStampFlag::new(
                ConceptSeq(tuple[0]),
                StampSeq(tuple[1]),
                TaxonomyFlags(tuple[2]),
            ));
        }
        Ok((destination, len))
    }
}

impl FromIterator<TypeStampFlag> for TypeStampFlagSet {
    fn from_iter<I: IntoIterator<Item = TypeStampFlag>>(iter: I) -> Self {
        Self {
            tuples: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISA: ConceptSeq = ConceptSeq(1);
    const PART_OF: ConceptSeq = ConceptSeq(2);

    #[test]
    fn add_is_idempotent() {
        let mut set = TypeStampFlagSet::new();
        assert!(set.add(ISA, StampSeq(10), TaxonomyFlags::STATED));
        assert!(!set.add(ISA, StampSeq(10), TaxonomyFlags::STATED));
        assert!(set.add(ISA, StampSeq(10), TaxonomyFlags::INFERRED));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn lookups_honour_wildcards() {
        let mut set = TypeStampFlagSet::new();
        set.add(ISA, StampSeq(10), TaxonomyFlags::STATED);
        set.add(PART_OF, StampSeq(11), TaxonomyFlags::INFERRED);

        assert!(set.contains_type_with_flags(TypeMatch::Any, TaxonomyFlags::EMPTY));
        assert!(set.contains_type_with_flags(TypeMatch::One(ISA), TaxonomyFlags::STATED));
        assert!(!set.contains_type_with_flags(TypeMatch::One(ISA), TaxonomyFlags::INFERRED));
        assert!(set.contains_type_with_flags(TypeMatch::AnyOf(&[PART_OF]), TaxonomyFlags::EMPTY));

        let stamps = set.stamps_of_type_with_flags(TypeMatch::Any, TaxonomyFlags::EMPTY);
        assert_eq!(stamps.as_slice(), &[StampSeq(10), StampSeq(11)]);
        assert!(set
            .stamps_of_type_with_flags(TypeMatch::One(PART_OF), TaxonomyFlags::STATED)
            .is_empty());
    }

    #[test]
    fn exact_flags_differ_from_containment() {
        let mut set = TypeStampFlagSet::new();
        set.add(ISA, StampSeq(3), TaxonomyFlags::STATED | TaxonomyFlags::PARENT);
        assert!(!set.contains_type_with_flags(TypeMatch::One(ISA), TaxonomyFlags::STATED));
        assert_eq!(
            set.stamps_of_type_containing(TypeMatch::One(ISA), TaxonomyFlags::STATED)
                .as_slice(),
            &[StampSeq(3)]
        );
    }

    #[test]
    fn runs_split_at_header_capacity() {
        let mut set = TypeStampFlagSet::new();
        for stamp in 0..(MAX_TUPLES_PER_RUN as u32 + 1) {
            set.add(ISA, StampSeq(stamp), TaxonomyFlags::STATED);
        }
        let mut out = Vec::new();
        set.write_runs(ConceptSeq(9), &mut out).unwrap();
        assert_eq!(out.len(), set.packed_len());
        assert_eq!(out[0] >> 24, (1 + 3 * MAX_TUPLES_PER_RUN) as u32);
        assert_eq!(out[0] & PACKED_VALUE_MASK, 9);

        let mut back = TypeStampFlagSet::new();
        let (dest, first) = TypeStampFlagSet::read_run(&out, 0, &mut back).unwrap();
        assert_eq!(dest, ConceptSeq(9));
        let (_, second) = TypeStampFlagSet::read_run(&out, first, &mut back).unwrap();
        assert_eq!(second, 4);
        assert_eq!(back, set);
    }

    #[test]
    fn oversized_values_are_rejected() {
        let mut set = TypeStampFlagSet::new();
        set.add(ISA, StampSeq(PACKED_VALUE_MASK + 1), TaxonomyFlags::STATED);
        let mut out = Vec::new();
        let err = set.write_runs(ConceptSeq(1), &mut out).unwrap_err();
        assert_eq!(
            err,
            RecordError::ValueOutOfRange {
                field: "stamp",
                value: PACKED_VALUE_MASK + 1
            }
        );
        let err = TypeStampFlagSet::new()
            .write_runs(ConceptSeq(PACKED_VALUE_MASK + 1), &mut out)
            .unwrap_err();
        assert!(matches!(err, RecordError::ValueOutOfRange { field: "destination", .. }));
    }

    #[test]
    fn flags_keep_all_bits() {
        let mut set = TypeStampFlagSet::new();
        set.add(ISA, StampSeq(1), TaxonomyFlags(0xFFFF_FFFF));
        let mut out = Vec::new();
        set.write_runs(ConceptSeq(0), &mut out).unwrap();
        let mut back = TypeStampFlagSet::new();
        TypeStampFlagSet::read_run(&out, 0, &mut back).unwrap();
        assert_eq!(back.iter().next().unwrap().flags, TaxonomyFlags(0xFFFF_FFFF));
    }
}
