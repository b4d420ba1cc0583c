//! Spine kinds.
//!
//! A spine is a fixed-capacity slot array. Once published in a
//! [`SpineStore`](crate::store::SpineStore) a spine is never replaced
//! structurally; only its slots change, each through its own atomic cell.
//!
//! ## Wire layout (big-endian)
//!
//! ```text
//! IntSpine:    len: i32, value: i32 × len
//! ArraySpine:  slot_count: i32, then per slot: len: i32, value: i32 × len
//!              (len 0 = empty slot)
//! ```

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::error::{Result, SpineError};

/// Behaviour shared by every spine kind.
pub trait Spine: Send + Sync + Sized + 'static {
    /// Number of slots.
    fn slot_count(&self) -> usize;

    /// Append the wire form to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Parse the wire form. `index` is only used for error reporting.
    fn decode(index: usize, bytes: &[u8]) -> Result<Self>;
}

/// Values storable in an [`ArraySpine`]: anything with an int-array form.
pub trait PackedInts: Send + Sync + Sized + 'static {
    fn ints(&self) -> &[u32];

    fn from_ints(ints: Vec<u32>) -> std::result::Result<Self, String>;
}

struct Reader<'a> {
    index: usize,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(index: usize, bytes: &'a [u8]) -> Self {
        Self {
            index,
            bytes,
            pos: 0,
        }
    }

    fn i32(&mut self) -> Result<i32> {
        let end = self.pos + 4;
        let chunk = self.bytes.get(self.pos..end).ok_or_else(|| {
            SpineError::corrupt(self.index, format!("truncated at byte {}", self.pos))
        })?;
        self.pos = end;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(chunk);
        Ok(i32::from_be_bytes(raw))
    }

    fn len(&mut self) -> Result<usize> {
        let len = self.i32()?;
        usize::try_from(len)
            .map_err(|_| SpineError::corrupt(self.index, format!("negative length {}", len)))
    }

    fn finish(self) -> Result<()> {
        if self.pos != self.bytes.len() {
            return Err(SpineError::corrupt(
                self.index,
                format!("{} trailing bytes", self.bytes.len() - self.pos),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// IntSpine
// ============================================================================

/// Spine of `i32` slots.
#[derive(Debug)]
pub struct IntSpine {
    slots: Box<[AtomicI32]>,
}

impl IntSpine {
    pub fn new(slots: usize, default: i32) -> Self {
        Self {
            slots: (0..slots).map(|_| AtomicI32::new(default)).collect(),
        }
    }

    #[inline]
    pub fn get(&self, slot: usize) -> i32 {
        self.slots[slot].load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, slot: usize, value: i32) {
        self.slots[slot].store(value, Ordering::Release);
    }

    /// Returns true if the slot held `expected` and now holds `new`.
    pub fn compare_and_set(&self, slot: usize, expected: i32, new: i32) -> bool {
        self.slots[slot]
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Read-modify-write with retry. Returns the stored result.
    pub fn accumulate_and_get(&self, slot: usize, x: i32, f: impl Fn(i32, i32) -> i32) -> i32 {
        let cell = &self.slots[slot];
        let mut current = cell.load(Ordering::Acquire);
        loop {
            let next = f(current, x);
            match cell.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Spine for IntSpine {
    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.reserve(4 + self.slots.len() * 4);
        out.extend_from_slice(&(self.slots.len() as i32).to_be_bytes());
        for slot in self.slots.iter() {
            out.extend_from_slice(&slot.load(Ordering::Acquire).to_be_bytes());
        }
    }

    fn decode(index: usize, bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(index, bytes);
        let len = reader.len()?;
        let mut slots = Vec::with_capacity(len);
        for _ in 0..len {
            slots.push(AtomicI32::new(reader.i32()?));
        }
        reader.finish()?;
        Ok(Self {
            slots: slots.into_boxed_slice(),
        })
    }
}

// ============================================================================
// ArraySpine
// ============================================================================

/// Spine of optional shared values, each slot swapped atomically.
pub struct ArraySpine<T> {
    slots: Box<[ArcSwapOption<T>]>,
}

impl<T> std::fmt::Debug for ArraySpine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArraySpine")
            .field("slots", &self.slots.len())
            .finish()
    }
}

fn same_value<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

impl<T: PackedInts> ArraySpine<T> {
    pub fn new(slots: usize) -> Self {
        Self {
            slots: (0..slots).map(|_| ArcSwapOption::empty()).collect(),
        }
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<Arc<T>> {
        self.slots[slot].load_full()
    }

    #[inline]
    pub fn set(&self, slot: usize, value: Option<Arc<T>>) {
        self.slots[slot].store(value);
    }

    /// Install `new` only if the slot still holds `current` (pointer identity).
    pub fn compare_and_swap(&self, slot: usize, current: &Option<Arc<T>>, new: Option<Arc<T>>) -> bool {
        let previous = self.slots[slot].compare_and_swap(current, new);
        same_value(&*previous, current)
    }

    /// Read-modify-write with retry. `merge` sees the current value and must
    /// be free of side effects, since it may run more than once.
    pub fn accumulate_and_get<E>(
        &self,
        slot: usize,
        merge: impl Fn(Option<&T>) -> std::result::Result<T, E>,
    ) -> std::result::Result<Arc<T>, E> {
        loop {
            let current = self.get(slot);
            let next = Arc::new(merge(current.as_deref())?);
            if self.compare_and_swap(slot, &current, Some(Arc::clone(&next))) {
                return Ok(next);
            }
            tracing::trace!(slot, "accumulate contention, retrying");
        }
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.load().is_some()).count()
    }

    /// Occupied slots with their values, ascending by slot.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Arc<T>)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, cell)| cell.load_full().map(|value| (slot, value)))
    }
}

impl<T: PackedInts> Spine for ArraySpine<T> {
    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.slots.len() as i32).to_be_bytes());
        for slot in self.slots.iter() {
            match slot.load_full() {
                Some(value) => {
                    let ints = value.ints();
                    out.reserve(4 + ints.len() * 4);
                    out.extend_from_slice(&(ints.len() as i32).to_be_bytes());
                    for v in ints {
                        out.extend_from_slice(&v.to_be_bytes());
                    }
                }
                None => out.extend_from_slice(&0i32.to_be_bytes()),
            }
        }
    }

    fn decode(index: usize, bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(index, bytes);
        let slot_count = reader.len()?;
        let mut slots = Vec::with_capacity(slot_count);
        for slot in 0..slot_count {
            let len = reader.len()?;
            if len == 0 {
                slots.push(ArcSwapOption::empty());
                continue;
            }
            let mut ints = Vec::with_capacity(len);
            for _ in 0..len {
                ints.push(reader.i32()? as u32);
            }
            let value = T::from_ints(ints)
                .map_err(|reason| SpineError::corrupt(index, format!("slot {}: {}", slot, reason)))?;
            slots.push(ArcSwapOption::from_pointee(value));
        }
        reader.finish()?;
        Ok(Self {
            slots: slots.into_boxed_slice(),
        })
    }
}
