//! Destination → origin reverse index.
//!
//! Derived from the forward records and used only to accelerate "who points
//! at me" lookups. It may be rebuilt from the forward records at any time.

use parking_lot::RwLock;
use std::collections::BTreeSet;
use tracing::debug;

use taxon_db_core::ConceptSeq;

/// Ordered `(destination, origin)` pairs.
#[derive(Debug, Default)]
pub struct DestinationOriginIndex {
    pairs: RwLock<BTreeSet<(ConceptSeq, ConceptSeq)>>,
}

impl DestinationOriginIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, destination: ConceptSeq, origin: ConceptSeq) -> bool {
        self.pairs.write().insert((destination, origin))
    }

    /// Record that `origin` points at each of `destinations`.
    pub fn insert_all(&self, origin: ConceptSeq, destinations: impl IntoIterator<Item = ConceptSeq>) {
        let mut pairs = self.pairs.write();
        for destination in destinations {
            pairs.insert((destination, origin));
        }
    }

    /// Origins pointing at `destination`, ascending.
    pub fn origins_of(&self, destination: ConceptSeq) -> Vec<ConceptSeq> {
        self.pairs
            .read()
            .range((destination, ConceptSeq(0))..=(destination, ConceptSeq(u32::MAX)))
            .map(|(_, origin)| *origin)
            .collect()
    }

    /// True if every destination of `origin` is indexed.
    pub fn verify(&self, origin: ConceptSeq, destinations: &[ConceptSeq]) -> bool {
        let pairs = self.pairs.read();
        destinations.iter().all(|d| pairs.contains(&(*d, origin)))
    }

    /// Replace the index with pairs derived from `(origin, destinations)`.
    pub fn rebuild<I, D>(&self, records: I)
    where
        I: IntoIterator<Item = (ConceptSeq, D)>,
        D: IntoIterator<Item = ConceptSeq>,
    {
        let mut fresh = BTreeSet::new();
        for (origin, destinations) in records {
            for destination in destinations {
                fresh.insert((destination, origin));
            }
        }
        debug!(pairs = fresh.len(), "destination index rebuilt");
        *self.pairs.write() = fresh;
    }

    pub fn clear(&self) {
        self.pairs.write().clear();
    }

    pub fn len(&self) -> usize {
        self.pairs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.read().is_empty()
    }
}
