//! Taxonomy service facade.
//!
//! Ties the store, update engine, snapshot cache and collaborators together:
//!
//! - point queries (`is_concept_active`, `taxonomy_parents`,
//!   `taxonomy_children`, `is_kind_of`) read records directly
//! - [`snapshot`](TaxonomyService::snapshot) returns a tree-backed or
//!   record-backed view; tree builds are shared through the cache
//! - [`handle_commit`](TaxonomyService::handle_commit) applies every change
//!   of a commit on the blocking pool, bounded by a semaphore, and returns
//!   only once all of them finished

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, Instrument};

use taxon_db_core::{
    ConceptSeq, IdentifierService, Nid, PositionCalculatorFactory, PremiseType, StampCoordinate, StampService,
    TaxonomyCoordinate, TaxonomyVocabulary,
};
use taxon_db_record::TypeMatch;
use taxon_db_tree::{kind_of_walk, GraphCollector};
use taxon_db_update::{TaxonomyUpdateEngine, UpdateStats};

use crate::cache::{SnapshotCache, TreeTask};
use crate::commit::{CommitListener, CommitRecord, LogicGraphSource, SemanticChange};
use crate::config::TaxonomyConfig;
use crate::error::{Result, TaxonomyError};
use crate::snapshot::{RecordSnapshot, SnapshotMode, TaxonomySnapshot, TreeSnapshot};
use crate::store::TaxonomyStore;

/// External services the taxonomy depends on.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub identifiers: Arc<dyn IdentifierService>,
    pub stamps: Arc<dyn StampService>,
    pub calculators: Arc<dyn PositionCalculatorFactory>,
    pub changes: Arc<dyn LogicGraphSource>,
}

#[derive(Debug)]
struct ServiceInner {
    config: TaxonomyConfig,
    store: Arc<TaxonomyStore>,
    engine: TaxonomyUpdateEngine,
    identifiers: Arc<dyn IdentifierService>,
    calculators: Arc<dyn PositionCalculatorFactory>,
    changes: Arc<dyn LogicGraphSource>,
    cache: Arc<SnapshotCache>,
    permits: Arc<Semaphore>,
}

/// Cheap to clone; clones share all state.
#[derive(Debug, Clone)]
pub struct TaxonomyService {
    inner: Arc<ServiceInner>,
}

impl TaxonomyService {
    pub fn new(
        config: TaxonomyConfig,
        vocabulary: TaxonomyVocabulary,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let config = config.validate()?;
        let store = Arc::new(TaxonomyStore::from_config(vocabulary, &config));
        let engine = TaxonomyUpdateEngine::new(vocabulary, collaborators.stamps);
        let cache = Arc::new(SnapshotCache::new(config.snapshot_cache_capacity));
        let permits = Arc::new(Semaphore::new(config.max_concurrent_updates));
        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                store,
                engine,
                identifiers: collaborators.identifiers,
                calculators: collaborators.calculators,
                changes: collaborators.changes,
                cache,
                permits,
            }),
        })
    }

    pub fn config(&self) -> &TaxonomyConfig {
        &self.inner.config
    }

    pub fn vocabulary(&self) -> &TaxonomyVocabulary {
        self.inner.store.vocabulary()
    }

    pub fn store(&self) -> &Arc<TaxonomyStore> {
        &self.inner.store
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.inner.cache
    }

    /// Coordinate on this service's vocabulary with the configured policy.
    pub fn coordinate(&self, premise: PremiseType, stamp: StampCoordinate) -> TaxonomyCoordinate {
        TaxonomyCoordinate::new(premise, stamp, *self.vocabulary())
            .with_policy(self.inner.config.active_policy)
    }

    // ------------------------------------------------------------------
    // Point queries
    // ------------------------------------------------------------------

    pub fn record_snapshot(&self, coordinate: &TaxonomyCoordinate) -> RecordSnapshot {
        RecordSnapshot::new(
            coordinate.clone(),
            self.inner.calculators.calculator_for(&coordinate.stamp),
            Arc::clone(&self.inner.store),
            self.inner.config.suspicious_depth,
        )
    }

    pub fn is_concept_active(&self, concept: ConceptSeq, coordinate: &TaxonomyCoordinate) -> Result<bool> {
        self.record_snapshot(coordinate).is_concept_active(concept)
    }

    /// Active parents, ascending.
    pub fn taxonomy_parents(&self, concept: ConceptSeq, coordinate: &TaxonomyCoordinate) -> Result<Vec<ConceptSeq>> {
        self.record_snapshot(coordinate).parents(concept)
    }

    /// Active children, ascending.
    pub fn taxonomy_children(&self, concept: ConceptSeq, coordinate: &TaxonomyCoordinate) -> Result<Vec<ConceptSeq>> {
        self.record_snapshot(coordinate).children(concept)
    }

    pub fn is_kind_of(
        &self,
        child: ConceptSeq,
        parent: ConceptSeq,
        coordinate: &TaxonomyCoordinate,
    ) -> Result<bool> {
        self.record_snapshot(coordinate).is_kind_of(child, parent)
    }

    /// True if `parent` was an is-a ancestor of `child` under any version,
    /// stated or inferred, active or retired.
    pub fn was_ever_kind_of(&self, child: ConceptSeq, parent: ConceptSeq) -> Result<bool> {
        let is_a = TypeMatch::One(self.vocabulary().is_a);
        let store = &self.inner.store;
        kind_of_walk(
            child,
            parent,
            |c| -> Result<Vec<ConceptSeq>> {
                Ok(store
                    .record(c)?
                    .map(|r| r.destinations_with_any_history(is_a))
                    .unwrap_or_default())
            },
            self.inner.config.suspicious_depth,
        )
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Concept sequences a tree build walks: the configured assemblage, or
    /// every stored origin when none is configured.
    pub fn tree_origins(&self) -> Vec<ConceptSeq> {
        match self.inner.config.concept_assemblage {
            Some(assemblage) => self.inner.identifiers.concept_sequences(assemblage),
            None => self.inner.store.origins(),
        }
    }

    /// Shared tree build for `coordinate`, started if not cached.
    pub fn tree_task(&self, coordinate: &TaxonomyCoordinate) -> Result<Arc<TreeTask>> {
        let service = self.clone();
        let calc = self.inner.calculators.calculator_for(&coordinate.stamp);
        let collector = GraphCollector::new(coordinate.clone(), calc);
        self.inner
            .cache
            .get_or_spawn(coordinate.cache_key(), move |cancel| {
                let origins = service.tree_origins();
                let store = &service.inner.store;
                collector
                    .with_cancellation(cancel)
                    .build_tree(&**store, &origins)
            })
    }

    pub async fn snapshot(
        &self,
        coordinate: &TaxonomyCoordinate,
        mode: SnapshotMode,
    ) -> Result<Arc<dyn TaxonomySnapshot>> {
        let records = self.record_snapshot(coordinate);
        match mode {
            SnapshotMode::NoTree => Ok(Arc::new(records)),
            SnapshotMode::Tree => {
                let tree = self.tree_task(coordinate)?.get().await?;
                Ok(Arc::new(TreeSnapshot::new(tree, records)))
            }
        }
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    /// Apply one change synchronously. Does not touch the snapshot cache.
    pub fn update_taxonomy(&self, change: &SemanticChange) -> Result<UpdateStats> {
        let inner = &self.inner;
        match change {
            SemanticChange::LogicGraph(change) => inner.store.update(&inner.engine, change),
            SemanticChange::ConceptVersion { concept, stamp } => {
                let delta = inner.engine.concept_status_delta(*concept, *stamp);
                inner.store.apply(&inner.engine, &delta)
            }
        }
    }

    /// `Some(stats)` if `nid` carried a taxonomy change.
    fn update_for_nid(&self, nid: Nid) -> Result<Option<UpdateStats>> {
        match self.inner.changes.change_for(nid)? {
            Some(change) => self.update_taxonomy(&change).map(Some),
            None => Ok(None),
        }
    }

    /// Apply every change of `commit` and wait for all of them.
    ///
    /// Any failure fails the whole batch (after the other updates finished).
    /// The snapshot cache is cleared whenever something may have changed.
    pub async fn handle_commit(&self, commit: &CommitRecord) -> Result<UpdateStats> {
        let span = tracing::debug_span!("taxonomy_commit", semantics = commit.semantic_nids.len());
        async move {
            let mut handles = Vec::with_capacity(commit.semantic_nids.len());
            for nid in &commit.semantic_nids {
                let permit = Arc::clone(&self.inner.permits)
                    .acquire_owned()
                    .await
                    .map_err(|e| TaxonomyError::TaskAborted(e.to_string()))?;
                let service = self.clone();
                let nid = *nid;
                handles.push(tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    service.update_for_nid(nid)
                }));
            }

            let total = handles.len();
            let mut stats = UpdateStats::default();
            let mut applied = 0usize;
            let mut failed = 0usize;
            let mut first: Option<TaxonomyError> = None;
            for joined in futures::future::join_all(handles).await {
                let result = joined
                    .map_err(|e| TaxonomyError::TaskAborted(e.to_string()))
                    .and_then(|r| r);
                match result {
                    Ok(Some(s)) => {
                        stats.absorb(&s);
                        applied += 1;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        failed += 1;
                        first.get_or_insert(e);
                    }
                }
            }

            if applied > 0 || failed > 0 {
                self.inner.cache.invalidate();
            }
            debug!(
                total,
                applied,
                failed,
                added = stats.added,
                retired = stats.retired,
                "commit applied to taxonomy"
            );
            match first {
                Some(first) => Err(TaxonomyError::Batch {
                    failed,
                    total,
                    first: Box::new(first),
                }),
                None => Ok(stats),
            }
        }
        .instrument(span)
        .await
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Replace the records with those persisted under `dir`.
    pub fn load(&self, dir: &Path) -> Result<usize> {
        let loaded = self.inner.store.load(dir)?;
        self.inner.cache.invalidate();
        Ok(loaded)
    }

    /// Persist changed record spines under `dir`.
    pub fn sync(&self, dir: &Path) -> Result<usize> {
        self.inner.store.sync(dir)
    }

    /// [`load`](Self::load) from the configured data directory.
    pub fn load_default(&self) -> Result<usize> {
        let dir = self.inner.config.data_dir.as_deref().ok_or(TaxonomyError::NoDataDir)?;
        self.load(dir)
    }

    /// [`sync`](Self::sync) to the configured data directory.
    pub fn sync_default(&self) -> Result<usize> {
        let dir = self.inner.config.data_dir.as_deref().ok_or(TaxonomyError::NoDataDir)?;
        self.sync(dir)
    }
}

#[async_trait]
impl CommitListener for TaxonomyService {
    async fn on_commit(&self, commit: &CommitRecord) -> Result<UpdateStats> {
        self.handle_commit(commit).await
    }
}
