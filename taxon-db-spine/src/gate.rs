//! Stamped read gate.
//!
//! Multi-step reads ("load record, then check it is still consistent") run
//! optimistically: take a version stamp, do the work, validate that no
//! structural event (spine growth, clear) happened meanwhile. When validation
//! fails the work is redone under the shared side of a lock, which
//! structural events hold exclusively.
//!
//! The version is even while the store is quiescent and odd while a writer
//! holds the gate.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{fence, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct StampedGate {
    version: AtomicU64,
    lock: RwLock<()>,
}

/// Exclusive hold on a [`StampedGate`]. Publishes a new even version on drop.
pub struct GateWriteGuard<'a> {
    gate: &'a StampedGate,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl Drop for GateWriteGuard<'_> {
    fn drop(&mut self) {
        self.gate.version.fetch_add(1, Ordering::Release);
    }
}

impl StampedGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp for an optimistic read, or `None` while a writer holds the gate.
    #[inline]
    pub fn try_optimistic(&self) -> Option<u64> {
        let v = self.version.load(Ordering::Acquire);
        (v % 2 == 0).then_some(v)
    }

    /// True if nothing structural happened since `stamp` was taken.
    #[inline]
    pub fn validate(&self, stamp: u64) -> bool {
        fence(Ordering::Acquire);
        self.version.load(Ordering::Acquire) == stamp
    }

    /// Shared hold. Recursive so that nested readers never deadlock behind a
    /// queued writer.
    pub fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read_recursive()
    }

    /// Exclusive hold for structural changes.
    pub fn write(&self) -> GateWriteGuard<'_> {
        let guard = self.lock.write();
        self.version.fetch_add(1, Ordering::AcqRel);
        GateWriteGuard {
            gate: self,
            _guard: guard,
        }
    }

    /// Run `f` optimistically; rerun it under the shared lock if a structural
    /// change raced with it.
    pub fn optimistic_read<R>(&self, f: impl Fn() -> R) -> R {
        if let Some(stamp) = self.try_optimistic() {
            let result = f();
            if self.validate(stamp) {
                return result;
            }
        }
        let _shared = self.read();
        f()
    }

    /// Current version (even when quiescent).
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn write_invalidates_outstanding_stamp() {
        let gate = StampedGate::new();
        let stamp = gate.try_optimistic().unwrap();
        assert!(gate.validate(stamp));
        {
            let _w = gate.write();
            assert!(gate.try_optimistic().is_none());
        }
        assert!(!gate.validate(stamp));
        assert_eq!(gate.version(), 2);
    }

    #[test]
    fn optimistic_read_reruns_after_race() {
        let gate = StampedGate::new();
        let calls = AtomicUsize::new(0);
        let result = gate.optimistic_read(|| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                // Simulate a structural change landing mid-read.
                drop(gate.write());
            }
            7
        });
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn nested_shared_holds_do_not_block() {
        let gate = StampedGate::new();
        let _a = gate.read();
        let _b = gate.read();
        assert!(gate.try_optimistic().is_some());
    }
}
