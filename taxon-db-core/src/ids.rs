//! Typed ID newtypes for taxonomy storage.
//!
//! Each type is `#[repr(transparent)]` + `Copy`; wrapping a raw primitive
//! costs nothing at runtime.
//!
//! All internal storage is indexed by dense, non-negative sequences. The
//! externally visible (usually negative) [`Nid`] is only ever translated through
//! an [`IdentifierService`](crate::provider::IdentifierService).

use std::fmt;

/// Largest value that fits in the low 24 bits of a packed run header.
pub const PACKED_VALUE_MASK: u32 = 0x00FF_FFFF;

// ---------------------------------------------------------------------------
// ConceptSeq
// ---------------------------------------------------------------------------

/// Dense concept sequence (u32). Also used for relationship type ids, paths
/// and modules, which are concepts themselves.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
#[repr(transparent)]
pub struct ConceptSeq(pub u32);

impl ConceptSeq {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
    #[inline]
    pub fn from_u32(v: u32) -> Self {
        Self(v)
    }
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
    /// True when the sequence can be stored in a 24-bit packed field.
    #[inline]
    pub fn fits_packed(self) -> bool {
        self.0 <= PACKED_VALUE_MASK
    }
}

impl fmt::Display for ConceptSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConceptSeq({})", self.0)
    }
}

impl From<u32> for ConceptSeq {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

// ---------------------------------------------------------------------------
// StampSeq
// ---------------------------------------------------------------------------

/// Opaque stamp sequence (u32). Status, time, path, author and module of a
/// stamp are only known to the stamp service.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
#[repr(transparent)]
pub struct StampSeq(pub u32);

impl StampSeq {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
    #[inline]
    pub fn from_u32(v: u32) -> Self {
        Self(v)
    }
    #[inline]
    pub fn fits_packed(self) -> bool {
        self.0 <= PACKED_VALUE_MASK
    }
}

impl fmt::Display for StampSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StampSeq({})", self.0)
    }
}

impl From<u32> for StampSeq {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

// ---------------------------------------------------------------------------
// Nid
// ---------------------------------------------------------------------------

/// External component identifier (i32, typically negative).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct Nid(pub i32);

impl Nid {
    #[inline]
    pub fn as_i32(self) -> i32 {
        self.0
    }
    #[inline]
    pub fn from_i32(v: i32) -> Self {
        Self(v)
    }
}

impl fmt::Display for Nid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nid({})", self.0)
    }
}
