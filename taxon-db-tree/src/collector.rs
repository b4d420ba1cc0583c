//! Parallel graph collection.
//!
//! Origins are split across the rayon pool. Each worker folds the origins it
//! receives into its own [`GraphBuilder`] (no shared state), then the partial
//! builders are combined on the calling thread and finalized.
//!
//! Any failure (undecodable record, cancellation) fails the whole build; no
//! partial tree is ever returned.

use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

use taxon_db_core::{ConceptSeq, PositionCalculator, TaxonomyCoordinate};
use taxon_db_record::{PackedRecord, RecordError, TaxonomyRecord, TypeMatch};
use taxon_db_spine::SpinedArrayMap;

use crate::cancel::CancellationFlag;
use crate::error::{Result, TreeError};
use crate::graph::GraphBuilder;
use crate::tree::Tree;

/// Read access to per-origin records.
pub trait RecordSource: Sync {
    fn record(&self, origin: ConceptSeq) -> std::result::Result<Option<TaxonomyRecord>, RecordError>;
}

impl RecordSource for SpinedArrayMap<PackedRecord> {
    fn record(&self, origin: ConceptSeq) -> std::result::Result<Option<TaxonomyRecord>, RecordError> {
        self.get(origin.as_usize()).map(|packed| packed.unpack()).transpose()
    }
}

/// Collects the is-a graph visible at one coordinate.
#[derive(Debug, Clone)]
pub struct GraphCollector {
    coordinate: TaxonomyCoordinate,
    calc: Arc<dyn PositionCalculator>,
    cancel: CancellationFlag,
}

impl GraphCollector {
    pub fn new(coordinate: TaxonomyCoordinate, calc: Arc<dyn PositionCalculator>) -> Self {
        Self {
            coordinate,
            calc,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn coordinate(&self) -> &TaxonomyCoordinate {
        &self.coordinate
    }

    /// Fold one origin into `builder`: the origin becomes a node if the
    /// concept is active, and each active parent adds a parent → origin edge.
    /// The edge survives finalization only if the parent is a node as well.
    pub fn accept(&self, builder: &mut GraphBuilder, source: &dyn RecordSource, origin: ConceptSeq) -> Result<()> {
        self.cancel.check()?;
        let record = source
            .record(origin)
            .map_err(|source| TreeError::Record { origin, source })?;
        let Some(record) = record else {
            return Ok(());
        };
        let calc = self.calc.as_ref();
        if !record.concept_satisfies_stamp(origin, calc, &self.coordinate.vocabulary) {
            return Ok(());
        }
        builder.add_node(origin);
        for parent in record.destinations_of_type(
            TypeMatch::One(self.coordinate.vocabulary.is_a),
            self.coordinate.flags(),
            calc,
            self.coordinate.policy,
        ) {
            builder.add_edge(parent, origin);
        }
        Ok(())
    }

    /// Parallel collection over `origins`, combined single-threaded.
    pub fn collect(&self, source: &dyn RecordSource, origins: &[ConceptSeq]) -> Result<GraphBuilder> {
        let partials: Vec<GraphBuilder> = origins
            .par_iter()
            .try_fold(GraphBuilder::new, |mut builder, origin| {
                self.accept(&mut builder, source, *origin)?;
                Ok::<_, TreeError>(builder)
            })
            .collect::<Result<Vec<_>>>()?;

        let parts = partials.len();
        let mut merged = GraphBuilder::new();
        for partial in partials {
            merged.combine(partial);
        }
        self.cancel.check()?;
        debug!(
            parts,
            nodes = merged.node_count(),
            edges = merged.edge_count(),
            "taxonomy graph collected"
        );
        Ok(merged)
    }

    /// Collect and finalize under a `taxonomy_tree_build` span.
    pub fn build_tree(&self, source: &dyn RecordSource, origins: &[ConceptSeq]) -> Result<Tree> {
        let span = tracing::debug_span!(
            "taxonomy_tree_build",
            origins = origins.len(),
            premise = ?self.coordinate.premise,
            rayon_threads = rayon::current_num_threads()
        );
        let _guard = span.enter();

        let graph = self.collect(source, origins)?;
        let tree = graph.finalize();
        debug!(
            nodes = tree.node_count(),
            roots = tree.roots().len(),
            cycles = tree.cycles().len(),
            "taxonomy tree built"
        );
        Ok(tree)
    }
}
