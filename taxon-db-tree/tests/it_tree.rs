//! Integration tests: records written by the update engine, collected and
//! finalized into trees.

mod tracing_capture;

use std::sync::Arc;
use tracing::Level;

use taxon_db_core::{
    ConceptSeq, MemoryPositionCalculator, MemoryStampService, PremiseType, StampCoordinate,
    TaxonomyCoordinate, TaxonomyVocabulary,
};
use taxon_db_record::{DestinationOriginIndex, PackedRecord, RecordError, TaxonomyRecord, TypeMatch};
use taxon_db_spine::SpinedArrayMap;
use taxon_db_tree::{kind_of_walk, CancellationFlag, GraphCollector, RecordSource, TreeError};
use taxon_db_update::{ExpressionBuilder, LogicGraphChange, TaxonomyUpdateEngine};

const PATH: ConceptSeq = ConceptSeq(30);
const MODULE: ConceptSeq = ConceptSeq(31);

fn vocab() -> TaxonomyVocabulary {
    TaxonomyVocabulary::new(ConceptSeq(1), ConceptSeq(2), ConceptSeq(3))
}

fn seqs(raw: &[u32]) -> Vec<ConceptSeq> {
    raw.iter().map(|c| ConceptSeq(*c)).collect()
}

struct Fixture {
    stamps: Arc<MemoryStampService>,
    engine: TaxonomyUpdateEngine,
    records: SpinedArrayMap<PackedRecord>,
    index: DestinationOriginIndex,
}

impl Fixture {
    fn new() -> Self {
        let stamps = Arc::new(MemoryStampService::new());
        Self {
            engine: TaxonomyUpdateEngine::new(vocab(), stamps.clone()),
            stamps,
            records: SpinedArrayMap::new(64, 2),
            index: DestinationOriginIndex::new(),
        }
    }

    /// Active concept with stated parents, committed at `time`.
    fn concept(&self, concept: u32, parents: &[u32], time: i64) {
        let stamp = self.stamps.active(time, PATH, MODULE);
        let status = self.engine.concept_status_delta(ConceptSeq(concept), stamp);
        self.engine.apply(&status, &self.records, &self.index).unwrap();
        if !parents.is_empty() {
            self.is_a(concept, parents, time);
        }
    }

    /// Parents only, no concept status record.
    fn is_a(&self, concept: u32, parents: &[u32], time: i64) {
        let stamp = self.stamps.active(time, PATH, MODULE);
        let expression = ExpressionBuilder::new(ConceptSeq(concept))
            .parents(&seqs(parents))
            .build()
            .unwrap();
        self.engine
            .update(
                &LogicGraphChange::new(PremiseType::Stated, stamp, expression),
                &self.records,
                &self.index,
            )
            .unwrap();
    }

    fn collector(&self, stamp: StampCoordinate) -> GraphCollector {
        let calc = Arc::new(MemoryPositionCalculator::new(self.stamps.clone(), stamp.clone()));
        GraphCollector::new(TaxonomyCoordinate::stated(stamp, vocab()), calc)
    }

    fn origins(&self) -> Vec<ConceptSeq> {
        self.records.keys().into_iter().map(|k| ConceptSeq(k as u32)).collect()
    }
}

#[test]
fn hierarchy_from_stored_records() {
    let fx = Fixture::new();
    fx.concept(10, &[], 10);
    fx.concept(11, &[10], 10);
    fx.concept(12, &[10], 10);
    fx.concept(13, &[11, 12], 10);

    let tree = fx
        .collector(StampCoordinate::latest(PATH))
        .build_tree(&fx.records, &fx.origins())
        .unwrap();

    assert_eq!(tree.node_count(), 4);
    assert_eq!(tree.roots(), &[ConceptSeq(10)]);
    assert_eq!(tree.children_of(ConceptSeq(10)), seqs(&[11, 12]).as_slice());
    assert_eq!(tree.parents_of(ConceptSeq(13)), seqs(&[11, 12]).as_slice());
    assert!(tree.is_descendant_of(ConceptSeq(13), ConceptSeq(10)));
    assert!(!tree.is_descendant_of(ConceptSeq(10), ConceptSeq(13)));
    assert!(!tree.has_cycles());
}

#[test]
fn coordinate_time_limits_the_tree() {
    let fx = Fixture::new();
    fx.concept(10, &[], 10);
    fx.concept(11, &[10], 10);
    fx.concept(12, &[11], 30);

    let then = fx
        .collector(StampCoordinate::at(PATH, 20))
        .build_tree(&fx.records, &fx.origins())
        .unwrap();
    assert!(!then.contains(ConceptSeq(12)));
    assert_eq!(then.leaves(), vec![ConceptSeq(11)]);

    let now = fx
        .collector(StampCoordinate::latest(PATH))
        .build_tree(&fx.records, &fx.origins())
        .unwrap();
    assert_eq!(now.leaves(), vec![ConceptSeq(12)]);
    assert_eq!(now.depth(ConceptSeq(12)), Some(2));
}

#[test]
fn concept_without_active_status_is_not_collected() {
    let fx = Fixture::new();
    fx.concept(10, &[], 10);
    fx.is_a(20, &[10], 10);

    let tree = fx
        .collector(StampCoordinate::latest(PATH))
        .build_tree(&fx.records, &fx.origins())
        .unwrap();
    assert!(tree.contains(ConceptSeq(10)));
    assert!(!tree.contains(ConceptSeq(20)));
    assert!(tree.children_of(ConceptSeq(10)).is_empty());
}

#[test]
fn parent_without_active_status_is_not_a_node() {
    let fx = Fixture::new();
    fx.concept(100, &[7], 10);

    let tree = fx
        .collector(StampCoordinate::latest(PATH))
        .build_tree(&fx.records, &fx.origins())
        .unwrap();
    assert!(!tree.contains(ConceptSeq(7)));
    assert_eq!(tree.roots(), &[ConceptSeq(100)]);
    assert!(tree.parents_of(ConceptSeq(100)).is_empty());
    assert!(!tree.is_descendant_of(ConceptSeq(100), ConceptSeq(7)));
}

#[test]
fn parentless_cycle_terminates_with_times_for_every_node() {
    let fx = Fixture::new();
    fx.concept(1, &[3], 10);
    fx.concept(2, &[1], 10);
    fx.concept(3, &[2], 10);

    let tree = fx
        .collector(StampCoordinate::latest(PATH))
        .build_tree(&fx.records, &fx.origins())
        .unwrap();

    assert!(tree.has_cycles());
    assert_eq!(tree.cycles(), &[(ConceptSeq(3), ConceptSeq(1))]);
    assert_eq!(tree.roots(), &[ConceptSeq(1)]);

    let mut times = Vec::new();
    for node in seqs(&[1, 2, 3]) {
        let discovery = tree.discovery_time(node).unwrap();
        let finish = tree.finish_time(node).unwrap();
        assert!(discovery < finish);
        times.push(discovery);
        times.push(finish);
    }
    times.sort_unstable();
    times.dedup();
    assert_eq!(times.len(), 6);

    // The back edge is not navigable, so ancestry stays acyclic.
    assert!(tree.is_descendant_of(ConceptSeq(3), ConceptSeq(1)));
    assert!(!tree.is_descendant_of(ConceptSeq(1), ConceptSeq(3)));
}

#[test]
fn cancelled_collection_returns_no_tree() {
    let fx = Fixture::new();
    for c in 10..60 {
        fx.concept(c, &[10], 10);
    }
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let result = fx
        .collector(StampCoordinate::latest(PATH))
        .with_cancellation(cancel)
        .build_tree(&fx.records, &fx.origins());
    assert_eq!(result.unwrap_err(), TreeError::Cancelled);
}

struct Broken;

impl RecordSource for Broken {
    fn record(&self, origin: ConceptSeq) -> Result<Option<TaxonomyRecord>, RecordError> {
        if origin == ConceptSeq(7) {
            Err(RecordError::ZeroLength { offset: 0 })
        } else {
            Ok(None)
        }
    }
}

#[test]
fn undecodable_record_fails_the_whole_build() {
    let fx = Fixture::new();
    let result = fx
        .collector(StampCoordinate::latest(PATH))
        .build_tree(&Broken, &seqs(&[5, 6, 7, 8]));
    match result {
        Err(TreeError::Record { origin, source }) => {
            assert_eq!(origin, ConceptSeq(7));
            assert!(source.is_decode());
        }
        other => panic!("expected a record error, got {:?}", other),
    }
}

#[test]
fn build_span_and_cycle_warning_are_emitted() {
    let (captured, _guard) = tracing_capture::init_test_tracing();
    let fx = Fixture::new();
    fx.concept(1, &[2], 10);
    fx.concept(2, &[1], 10);

    fx.collector(StampCoordinate::latest(PATH))
        .build_tree(&fx.records, &fx.origins())
        .unwrap();

    let span = captured
        .find_span("taxonomy_tree_build")
        .expect("taxonomy_tree_build span");
    assert_eq!(span.fields.get("origins").map(String::as_str), Some("2"));
    assert!(span.fields.contains_key("rayon_threads"));
    assert_eq!(span.fields.get("premise").map(String::as_str), Some("Stated"));

    let warnings = captured.events_at(Level::WARN);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message().contains("cycle"));
}

#[test]
fn kind_of_walk_over_stored_records() {
    let fx = Fixture::new();
    fx.concept(10, &[], 10);
    fx.concept(11, &[10], 10);
    fx.concept(12, &[11], 10);
    let stamp = StampCoordinate::latest(PATH);
    let coordinate = TaxonomyCoordinate::stated(stamp.clone(), vocab());
    let calc = MemoryPositionCalculator::new(fx.stamps.clone(), stamp);

    let parents = |c: ConceptSeq| -> Result<Vec<ConceptSeq>, RecordError> {
        Ok(RecordSource::record(&fx.records, c)?
            .map(|r| {
                r.destinations_of_type(
                    TypeMatch::One(vocab().is_a),
                    coordinate.flags(),
                    &calc,
                    coordinate.policy,
                )
            })
            .unwrap_or_default())
    };
    assert!(kind_of_walk(ConceptSeq(12), ConceptSeq(10), parents, 50).unwrap());
    assert!(!kind_of_walk(ConceptSeq(10), ConceptSeq(12), parents, 50).unwrap());
}

#[test]
fn deep_kind_of_walk_reports_one_presumed_cycle() {
    let (captured, _guard) = tracing_capture::init_test_tracing();
    // 0 -> 1 -> ... -> 10, each concept's parent is the next one.
    let parents = |c: ConceptSeq| -> Result<Vec<ConceptSeq>, RecordError> {
        Ok(if c.0 < 10 { vec![ConceptSeq(c.0 + 1)] } else { Vec::new() })
    };

    assert!(kind_of_walk(ConceptSeq(0), ConceptSeq(10), parents, 3).unwrap());
    let errors = captured.events_at(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message().contains("suspicious depth"));

    assert!(!kind_of_walk(ConceptSeq(0), ConceptSeq(42), parents, 3).unwrap());
    assert_eq!(captured.events_at(Level::ERROR).len(), 2);
}
