//! Growable list of lazily created spines.
//!
//! The top-level list is an `ArcSwap<Vec<ArcSwapOption<S>>>`. Readers load it
//! without locking; a stale list is still a valid (possibly shorter) view.
//!
//! Two kinds of writes touch the list itself:
//!
//! - **Publication** of a spine into an empty cell (compare-and-swap, first
//!   writer wins) or a direct `set_spine`. These run under the shared side of
//!   the [`StampedGate`] so that no growth can copy the list in between.
//! - **Growth** and **clear** replace the whole list. They run under the
//!   exclusive side of the gate, which also invalidates outstanding optimistic
//!   reads.
//!
//! Callers must not hold the gate while calling a method that may grow.

use arc_swap::{ArcSwap, ArcSwapOption};
use dashmap::DashSet;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::error::{Result, SpineError};
use crate::gate::StampedGate;
use crate::segment::SpineDirectory;
use crate::spine::Spine;

type SpineList<S> = Vec<ArcSwapOption<S>>;

/// Builds an empty spine with the given slot count.
pub type SpineFactory<S> = Arc<dyn Fn(usize) -> S + Send + Sync>;

pub struct SpineStore<S: Spine> {
    spine_size: usize,
    increment: usize,
    spines: ArcSwap<SpineList<S>>,
    factory: SpineFactory<S>,
    gate: StampedGate,
    dirty: DashSet<usize>,
}

impl<S: Spine> std::fmt::Debug for SpineStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpineStore")
            .field("spine_size", &self.spine_size)
            .field("increment", &self.increment)
            .field("capacity", &self.spine_count())
            .field("dirty", &self.dirty.len())
            .finish()
    }
}

fn empty_list<S>(len: usize) -> SpineList<S> {
    (0..len).map(|_| ArcSwapOption::empty()).collect()
}

impl<S: Spine> SpineStore<S> {
    /// New store with `increment` empty spine cells.
    ///
    /// Both sizes are clamped to at least 1.
    pub fn new(spine_size: usize, increment: usize, factory: SpineFactory<S>) -> Self {
        let increment = increment.max(1);
        Self {
            spine_size: spine_size.max(1),
            increment,
            spines: ArcSwap::from_pointee(empty_list(increment)),
            factory,
            gate: StampedGate::new(),
            dirty: DashSet::new(),
        }
    }

    #[inline]
    pub fn spine_size(&self) -> usize {
        self.spine_size
    }

    /// Spine index and slot for a dense key.
    #[inline]
    pub fn locate(&self, key: usize) -> (usize, usize) {
        (key / self.spine_size, key % self.spine_size)
    }

    pub fn gate(&self) -> &StampedGate {
        &self.gate
    }

    /// Current capacity of the spine list (published or not).
    pub fn spine_count(&self) -> usize {
        self.spines.load().len()
    }

    /// Spine at `index`, if one has been published. Never grows.
    pub fn existing_spine(&self, index: usize) -> Option<Arc<S>> {
        self.spines.load().get(index).and_then(|cell| cell.load_full())
    }

    /// Spine at `index`, creating and publishing it if absent.
    ///
    /// When two threads race to create the same spine, exactly one
    /// construction is published and both receive it.
    pub fn spine(&self, index: usize) -> Arc<S> {
        loop {
            if let Some(existing) = self.existing_spine(index) {
                return existing;
            }
            if let Some(published) = self.publish(index) {
                return published;
            }
            self.grow(index);
        }
    }

    /// Slow path of [`spine`](Self::spine). `None` when the list is too short.
    fn publish(&self, index: usize) -> Option<Arc<S>> {
        let _shared = self.gate.read();
        let list = self.spines.load();
        let cell = list.get(index)?;
        let fresh = Arc::new((self.factory)(self.spine_size));
        let previous = cell.compare_and_swap(&None::<Arc<S>>, Some(Arc::clone(&fresh)));
        match &*previous {
            Some(winner) => {
                trace!(index, "spine publication lost race");
                Some(Arc::clone(winner))
            }
            None => Some(fresh),
        }
    }

    /// Replace the spine at `index`, growing first if needed.
    pub fn set_spine(&self, index: usize, spine: Arc<S>) {
        loop {
            {
                let _shared = self.gate.read();
                let list = self.spines.load();
                if let Some(cell) = list.get(index) {
                    cell.store(Some(spine));
                    return;
                }
            }
            self.grow(index);
        }
    }

    fn grow(&self, index: usize) {
        let _exclusive = self.gate.write();
        let current = self.spines.load_full();
        if index < current.len() {
            return;
        }
        let new_len = (index + 1).max(current.len() + self.increment);
        let mut next: SpineList<S> = Vec::with_capacity(new_len);
        next.extend(current.iter().map(|cell| ArcSwapOption::new(cell.load_full())));
        next.resize_with(new_len, ArcSwapOption::empty);
        let previous = self.spines.compare_and_swap(&current, Arc::new(next));
        if Arc::ptr_eq(&*previous, &current) {
            debug!(from = current.len(), to = new_len, "spine list grown");
        } else {
            debug!(index, "spine list growth lost race");
        }
    }

    /// Make sure the list has at least `count` cells.
    pub fn ensure_capacity(&self, count: usize) {
        if count > self.spine_count() {
            self.grow(count - 1);
        }
    }

    /// Detach every spine. Handles held elsewhere stay valid.
    pub fn clear(&self) {
        let _exclusive = self.gate.write();
        self.spines.store(Arc::new(empty_list(self.increment)));
        self.dirty.clear();
    }

    /// Visit every published spine in index order.
    pub fn for_each_spine(&self, mut f: impl FnMut(usize, &Arc<S>)) {
        let list = self.spines.load();
        for (index, cell) in list.iter().enumerate() {
            if let Some(spine) = cell.load_full() {
                f(index, &spine);
            }
        }
    }

    // ------------------------------------------------------------------
    // Dirty tracking
    // ------------------------------------------------------------------

    #[inline]
    pub fn mark_dirty(&self, index: usize) {
        self.dirty.insert(index);
    }

    /// Dirty indices, ascending.
    pub fn dirty_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.dirty.iter().map(|i| *i).collect();
        indices.sort_unstable();
        indices
    }

    /// Remove and return the dirty indices, ascending.
    pub fn take_dirty(&self) -> Vec<usize> {
        let indices = self.dirty_indices();
        for index in &indices {
            self.dirty.remove(index);
        }
        indices
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Replace the contents of this store with the spines in `dir`.
    ///
    /// Returns the number of spines read.
    pub fn load(&self, dir: &SpineDirectory) -> Result<usize> {
        let count = dir.spine_count()?;
        let indices = dir.spine_indices()?;
        if let Some(last) = indices.last() {
            if *last >= count {
                return Err(SpineError::Inconsistent(format!(
                    "spine-{} present but marker records {} spines",
                    last, count
                )));
            }
        }
        self.clear();
        self.ensure_capacity(count);
        let mut loaded = 0;
        for index in indices {
            let Some(bytes) = dir.read_spine(index)? else {
                continue;
            };
            let spine = S::decode(index, &bytes)?;
            if spine.slot_count() != self.spine_size {
                return Err(SpineError::corrupt(
                    index,
                    format!(
                        "{} slots, store spine size is {}",
                        spine.slot_count(),
                        self.spine_size
                    ),
                ));
            }
            self.set_spine(index, Arc::new(spine));
            loaded += 1;
        }
        info!(dir = %dir.path().display(), spines = loaded, capacity = count, "loaded spines");
        Ok(loaded)
    }

    /// Write every dirty spine to `dir`, then the spine count marker.
    ///
    /// An index leaves the dirty set before its spine is encoded, so a write
    /// racing with the sync marks it dirty again. On failure the unwritten
    /// indices are marked dirty again.
    pub fn sync(&self, dir: &SpineDirectory) -> Result<usize> {
        let pending = self.take_dirty();
        let mut written = 0;
        let mut buf = Vec::new();
        for (pos, index) in pending.iter().enumerate() {
            let Some(spine) = self.existing_spine(*index) else {
                continue;
            };
            buf.clear();
            spine.encode(&mut buf);
            if let Err(e) = dir.write_spine(*index, &buf) {
                for rest in &pending[pos..] {
                    self.mark_dirty(*rest);
                }
                return Err(e);
            }
            written += 1;
        }
        dir.write_spine_count(self.spine_count())?;
        info!(dir = %dir.path().display(), spines = written, "synced spines");
        Ok(written)
    }
}
