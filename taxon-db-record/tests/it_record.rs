//! Integration tests: record algebra, visibility against the in-memory
//! stamp calculator and concurrent accumulation in the spine store.

use rayon::prelude::*;
use std::sync::Arc;

use taxon_db_core::{
    ActivePolicy, ConceptSeq, MemoryPositionCalculator, MemoryStampService, StampCoordinate,
    StampSeq, StampService, TaxonomyFlags,
};
use taxon_db_record::{PackedRecord, RecordError, TaxonomyRecordBuilder, TypeMatch};
use taxon_db_spine::SpinedArrayMap;

const ISA: ConceptSeq = ConceptSeq(1);
const PART_OF: ConceptSeq = ConceptSeq(2);
const PATH: ConceptSeq = ConceptSeq(30);
const MODULE: ConceptSeq = ConceptSeq(31);

fn record_over(destinations: &[u32], stamp_base: u32) -> TaxonomyRecordBuilder {
    let mut b = TaxonomyRecordBuilder::new();
    for (i, d) in destinations.iter().enumerate() {
        b.add_stamp_record(ConceptSeq(*d), ISA, StampSeq(stamp_base + i as u32), TaxonomyFlags::STATED);
        b.add_stamp_record(ConceptSeq(*d), PART_OF, StampSeq(stamp_base), TaxonomyFlags::INFERRED);
    }
    b
}

#[test]
fn pack_unpack_preserves_structure() {
    let original = record_over(&[1, 5, 900, 0x00FF_FFFF], 40);
    let packed = original.pack().unwrap();
    let back = PackedRecord::from_ints(packed.as_slice().to_vec())
        .unwrap()
        .unpack_builder()
        .unwrap();
    assert_eq!(back, original);
}

#[test]
fn merge_of_disjoint_records_commutes() {
    let a = record_over(&[1, 2], 10);
    let b = record_over(&[3, 4], 20);

    let mut ab = a.clone();
    ab.merge(&b);
    let mut ba = b.clone();
    ba.merge(&a);

    assert_eq!(ab, ba);
    assert_eq!(
        ab.destinations().collect::<Vec<_>>(),
        vec![ConceptSeq(1), ConceptSeq(2), ConceptSeq(3), ConceptSeq(4)]
    );
}

#[test]
fn later_active_stamp_wins_over_retired_one() {
    let stamps = Arc::new(MemoryStampService::new());
    let first = stamps.active(10, PATH, MODULE);
    let retired = stamps.retired_stamp_for(first).unwrap();
    let later = stamps.active(20, PATH, MODULE);

    let mut b = TaxonomyRecordBuilder::new();
    b.add_stamp_record(ConceptSeq(7), ISA, retired, TaxonomyFlags::STATED);
    b.add_stamp_record(ConceptSeq(7), ISA, later, TaxonomyFlags::STATED);
    let record = b.freeze();

    let calc = MemoryPositionCalculator::new(stamps.clone(), StampCoordinate::latest(PATH));
    assert_eq!(
        record.destinations_of_type(
            TypeMatch::One(ISA),
            TaxonomyFlags::STATED,
            &calc,
            ActivePolicy::MatchingPremise
        ),
        vec![ConceptSeq(7)]
    );
}

#[test]
fn cancelled_only_stamp_hides_destination() {
    let stamps = Arc::new(MemoryStampService::new());
    let only = stamps.active(10, PATH, MODULE);

    let mut b = TaxonomyRecordBuilder::new();
    b.add_stamp_record(ConceptSeq(7), ISA, only, TaxonomyFlags::STATED);
    let record = b.freeze();
    let calc = MemoryPositionCalculator::new(stamps.clone(), StampCoordinate::latest(PATH));
    assert!(record.is_active_destination(
        ConceptSeq(7),
        TypeMatch::One(ISA),
        TaxonomyFlags::STATED,
        &calc,
        ActivePolicy::MatchingPremise
    ));

    stamps.cancel(only).unwrap();
    assert!(record
        .destinations_of_type(
            TypeMatch::One(ISA),
            TaxonomyFlags::STATED,
            &calc,
            ActivePolicy::MatchingPremise
        )
        .is_empty());
    // History still shows the relationship.
    assert_eq!(
        record.destinations_with_any_history(TypeMatch::One(ISA)),
        vec![ConceptSeq(7)]
    );
}

#[test]
fn pack_refuses_values_that_would_corrupt_headers() {
    let mut b = TaxonomyRecordBuilder::new();
    b.add_stamp_record(ConceptSeq(7), ConceptSeq(0x0100_0000), StampSeq(1), TaxonomyFlags::STATED);
    assert_eq!(
        b.pack().unwrap_err(),
        RecordError::ValueOutOfRange {
            field: "type",
            value: 0x0100_0000
        }
    );
}

#[test]
fn concurrent_accumulate_loses_no_version() {
    let map: SpinedArrayMap<PackedRecord> = SpinedArrayMap::new(16, 1);
    (0..400u32).into_par_iter().for_each(|i| {
        let mut delta = TaxonomyRecordBuilder::new();
        delta.add_stamp_record(ConceptSeq(i % 3), ISA, StampSeq(i), TaxonomyFlags::STATED);
        map.accumulate_and_get(100, delta, |current, delta| PackedRecord::merged(current, delta))
            .unwrap();
    });
    let record = map.get(100).unwrap().unpack().unwrap();
    let total: usize = record.iter().map(|(_, set)| set.len()).sum();
    assert_eq!(total, 400);
    assert_eq!(record.len(), 3);
}
