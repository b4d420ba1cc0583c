//! In-memory collaborator implementations.
//!
//! These back the unit and integration tests and are usable for embedding
//! when no external chronology service exists. They follow the collaborator
//! contracts in [`provider`](crate::provider) exactly; nothing in the engine
//! depends on them.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::coordinate::StampCoordinate;
use crate::error::{CoreError, Result};
use crate::ids::{ConceptSeq, Nid, StampSeq};
use crate::provider::{IdentifierService, PositionCalculator, PositionCalculatorFactory, StampService};

// ============================================================================
// Identifiers
// ============================================================================

#[derive(Debug, Default)]
struct IdentifierInner {
    nid_to_seq: FxHashMap<Nid, ConceptSeq>,
    seq_to_nid: FxHashMap<ConceptSeq, Nid>,
    assemblages: BTreeMap<ConceptSeq, ConceptSeq>,
    next_seq: u32,
}

/// Nid ⇄ sequence table with per-sequence assemblage.
#[derive(Debug, Default)]
pub struct MemoryIdentifierService {
    inner: RwLock<IdentifierInner>,
}

impl MemoryIdentifierService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next free sequence to `nid` (idempotent per nid).
    pub fn register(&self, nid: Nid, assemblage: ConceptSeq) -> ConceptSeq {
        let mut inner = self.inner.write();
        if let Some(seq) = inner.nid_to_seq.get(&nid) {
            return *seq;
        }
        while inner.seq_to_nid.contains_key(&ConceptSeq(inner.next_seq)) {
            inner.next_seq += 1;
        }
        let seq = ConceptSeq(inner.next_seq);
        inner.next_seq += 1;
        inner.nid_to_seq.insert(nid, seq);
        inner.seq_to_nid.insert(seq, nid);
        inner.assemblages.insert(seq, assemblage);
        seq
    }

    /// Record an explicit `seq` ⇄ `nid` pair.
    pub fn insert(&self, seq: ConceptSeq, nid: Nid, assemblage: ConceptSeq) {
        let mut inner = self.inner.write();
        inner.nid_to_seq.insert(nid, seq);
        inner.seq_to_nid.insert(seq, nid);
        inner.assemblages.insert(seq, assemblage);
    }

    pub fn len(&self) -> usize {
        self.inner.read().assemblages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdentifierService for MemoryIdentifierService {
    fn sequence_for_nid(&self, nid: Nid) -> Option<ConceptSeq> {
        self.inner.read().nid_to_seq.get(&nid).copied()
    }

    fn nid_for_sequence(&self, seq: ConceptSeq) -> Option<Nid> {
        self.inner.read().seq_to_nid.get(&seq).copied()
    }

    fn assemblage_for_sequence(&self, seq: ConceptSeq) -> Option<ConceptSeq> {
        self.inner.read().assemblages.get(&seq).copied()
    }

    fn concept_sequences(&self, assemblage: ConceptSeq) -> Vec<ConceptSeq> {
        self.inner
            .read()
            .assemblages
            .iter()
            .filter(|(_, a)| **a == assemblage)
            .map(|(seq, _)| *seq)
            .collect()
    }
}

// ============================================================================
// Stamps
// ============================================================================

/// Status of a stamp.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StampStatus {
    Active,
    Inactive,
    /// Cancelled/destroyed versions are never on any route.
    Canceled,
}

/// Everything a stamp stands for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StampInfo {
    pub status: StampStatus,
    pub time: i64,
    pub path: ConceptSeq,
    pub module: ConceptSeq,
}

#[derive(Debug, Default)]
struct StampInner {
    /// Index 0 is reserved; stamp `n` lives at `stamps[n]`.
    stamps: Vec<Option<StampInfo>>,
    by_info: FxHashMap<StampInfo, StampSeq>,
}

/// Stamp table. Stamps are deduplicated by their full info.
#[derive(Debug)]
pub struct MemoryStampService {
    inner: RwLock<StampInner>,
}

impl Default for MemoryStampService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStampService {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StampInner {
                stamps: vec![None],
                by_info: FxHashMap::default(),
            }),
        }
    }

    /// Issue (or reuse) a stamp for `info`.
    pub fn stamp(&self, info: StampInfo) -> StampSeq {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_info.get(&info) {
            return *existing;
        }
        let seq = StampSeq(inner.stamps.len() as u32);
        inner.stamps.push(Some(info));
        inner.by_info.insert(info, seq);
        seq
    }

    /// Shorthand for an active stamp.
    pub fn active(&self, time: i64, path: ConceptSeq, module: ConceptSeq) -> StampSeq {
        self.stamp(StampInfo {
            status: StampStatus::Active,
            time,
            path,
            module,
        })
    }

    /// Look up a stamp.
    pub fn info(&self, stamp: StampSeq) -> Option<StampInfo> {
        self.inner
            .read()
            .stamps
            .get(stamp.0 as usize)
            .copied()
            .flatten()
    }

    /// Mark an already-issued stamp as cancelled (destroyed).
    pub fn cancel(&self, stamp: StampSeq) -> Result<()> {
        let mut inner = self.inner.write();
        let slot = inner
            .stamps
            .get_mut(stamp.0 as usize)
            .and_then(|s| s.as_mut())
            .ok_or(CoreError::UnknownStamp(stamp))?;
        let old = *slot;
        slot.status = StampStatus::Canceled;
        let new = *slot;
        if inner.by_info.get(&old) == Some(&stamp) {
            inner.by_info.remove(&old);
        }
        // An earlier stamp with the same cancelled info keeps the mapping.
        inner.by_info.entry(new).or_insert(stamp);
        Ok(())
    }
}

impl StampService for MemoryStampService {
    fn retired_stamp_for(&self, active: StampSeq) -> Result<StampSeq> {
        let info = self.info(active).ok_or(CoreError::UnknownStamp(active))?;
        Ok(self.stamp(StampInfo {
            status: StampStatus::Inactive,
            ..info
        }))
    }

    fn is_known(&self, stamp: StampSeq) -> bool {
        self.info(stamp).is_some()
    }
}

// ============================================================================
// Relative position
// ============================================================================

/// Latest-by-time calculator over a [`MemoryStampService`].
///
/// A stamp is on route when it is not cancelled, its path equals the
/// coordinate path, its time is at or before the coordinate time and its
/// module is admitted. Among on-route stamps the latest time wins; ties are
/// active if any tied stamp is active.
#[derive(Debug)]
pub struct MemoryPositionCalculator {
    stamps: Arc<MemoryStampService>,
    coordinate: StampCoordinate,
}

impl MemoryPositionCalculator {
    pub fn new(stamps: Arc<MemoryStampService>, coordinate: StampCoordinate) -> Self {
        Self { stamps, coordinate }
    }

    fn route_info(&self, stamp: StampSeq) -> Option<StampInfo> {
        let info = self.stamps.info(stamp)?;
        let on_route = info.status != StampStatus::Canceled
            && info.path == self.coordinate.path
            && info.time <= self.coordinate.time
            && (self.coordinate.modules.is_empty() || self.coordinate.modules.contains(&info.module));
        on_route.then_some(info)
    }
}

impl PositionCalculator for MemoryPositionCalculator {
    fn on_route(&self, stamp: StampSeq) -> bool {
        self.route_info(stamp).is_some()
    }

    fn is_latest_active(&self, stamps: &[StampSeq]) -> bool {
        let mut latest_time = i64::MIN;
        let mut latest_active = false;
        let mut seen = false;
        for info in stamps.iter().filter_map(|s| self.route_info(*s)) {
            let active = info.status == StampStatus::Active;
            if !seen || info.time > latest_time {
                latest_time = info.time;
                latest_active = active;
                seen = true;
            } else if info.time == latest_time {
                latest_active |= active;
            }
        }
        seen && latest_active
    }
}

/// Factory handing out [`MemoryPositionCalculator`]s.
#[derive(Debug, Clone)]
pub struct MemoryPositionCalculatorFactory {
    stamps: Arc<MemoryStampService>,
}

impl MemoryPositionCalculatorFactory {
    pub fn new(stamps: Arc<MemoryStampService>) -> Self {
        Self { stamps }
    }
}

impl PositionCalculatorFactory for MemoryPositionCalculatorFactory {
    fn calculator_for(&self, coordinate: &StampCoordinate) -> Arc<dyn PositionCalculator> {
        Arc::new(MemoryPositionCalculator::new(
            Arc::clone(&self.stamps),
            coordinate.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: ConceptSeq = ConceptSeq(1);
    const MODULE: ConceptSeq = ConceptSeq(2);

    #[test]
    fn register_is_idempotent_and_skips_explicit_sequences() {
        let ids = MemoryIdentifierService::new();
        ids.insert(ConceptSeq(0), Nid(-500), ConceptSeq(7));
        let a = ids.register(Nid(-1), ConceptSeq(7));
        let again = ids.register(Nid(-1), ConceptSeq(7));
        assert_eq!(a, again);
        assert_eq!(a, ConceptSeq(1));
        assert_eq!(ids.sequence_for_nid(Nid(-500)), Some(ConceptSeq(0)));
        assert_eq!(ids.nid_for_sequence(a), Some(Nid(-1)));
        assert_eq!(ids.concept_sequences(ConceptSeq(7)), vec![ConceptSeq(0), ConceptSeq(1)]);
        assert!(ids.concept_sequences(ConceptSeq(8)).is_empty());
    }

    #[test]
    fn retired_stamp_keeps_position() {
        let stamps = MemoryStampService::new();
        let active = stamps.active(10, PATH, MODULE);
        let retired = stamps.retired_stamp_for(active).unwrap();
        assert_ne!(active, retired);
        let info = stamps.info(retired).unwrap();
        assert_eq!(info.status, StampStatus::Inactive);
        assert_eq!(info.time, 10);
        // Same request yields the same retired stamp.
        assert_eq!(stamps.retired_stamp_for(active).unwrap(), retired);
        assert!(stamps.retired_stamp_for(StampSeq(999)).is_err());
    }

    #[test]
    fn latest_version_decides_activity() {
        let stamps = Arc::new(MemoryStampService::new());
        let s1 = stamps.active(10, PATH, MODULE);
        let later = stamps.active(20, PATH, MODULE);
        let retired_later = stamps.retired_stamp_for(later).unwrap();

        let now = MemoryPositionCalculator::new(stamps.clone(), StampCoordinate::latest(PATH));
        assert!(now.is_latest_active(&[s1]));
        assert!(!now.is_latest_active(&[s1, retired_later]));
        assert!(now.is_latest_active(&[s1, later]));

        let before = MemoryPositionCalculator::new(stamps.clone(), StampCoordinate::at(PATH, 15));
        assert!(before.is_latest_active(&[s1, retired_later]));
        assert!(!before.on_route(later));
        assert!(!before.is_latest_active(&[]));
    }

    #[test]
    fn cancelled_and_foreign_stamps_are_off_route() {
        let stamps = Arc::new(MemoryStampService::new());
        let s1 = stamps.active(10, PATH, MODULE);
        let other_path = stamps.active(10, ConceptSeq(99), MODULE);
        let calc = MemoryPositionCalculator::new(stamps.clone(), StampCoordinate::latest(PATH));
        assert!(!calc.on_route(other_path));
        stamps.cancel(s1).unwrap();
        assert!(!calc.on_route(s1));
        assert!(!calc.is_latest_active(&[s1]));

        let modules_only = MemoryPositionCalculator::new(
            stamps.clone(),
            StampCoordinate::latest(PATH).with_modules(vec![ConceptSeq(50)]),
        );
        let s2 = stamps.active(11, PATH, MODULE);
        assert!(!modules_only.on_route(s2));
    }

    #[test]
    fn cancelling_keeps_the_first_stamp_for_an_info() {
        let stamps = MemoryStampService::new();
        let cancelled = StampInfo {
            status: StampStatus::Canceled,
            time: 10,
            path: PATH,
            module: MODULE,
        };
        let active = stamps.active(10, PATH, MODULE);
        let issued_cancelled = stamps.stamp(cancelled);
        assert_ne!(active, issued_cancelled);

        stamps.cancel(active).unwrap();
        assert_eq!(stamps.info(active).map(|i| i.status), Some(StampStatus::Canceled));
        assert_eq!(stamps.stamp(cancelled), issued_cancelled);
    }
}
