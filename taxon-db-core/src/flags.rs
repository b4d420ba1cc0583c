//! Taxonomy flags carried alongside every stamp of an edge.
//!
//! Flags are a plain `u32` bit set. In the packed record layout they occupy
//! their own int, so any bit may be used; the named constants below are the
//! ones this store understands.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bit set of taxonomy flags.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
#[repr(transparent)]
pub struct TaxonomyFlags(pub u32);

impl TaxonomyFlags {
    /// No bits set. Used as the flags wildcard in lookups.
    pub const EMPTY: TaxonomyFlags = TaxonomyFlags(0);
    /// Edge asserted by a stated logic graph.
    pub const STATED: TaxonomyFlags = TaxonomyFlags(0x01);
    /// Edge produced by the classifier (inferred logic graph).
    pub const INFERRED: TaxonomyFlags = TaxonomyFlags(0x02);
    /// Self record marking a concept version (concept-active state).
    pub const CONCEPT_STATUS: TaxonomyFlags = TaxonomyFlags(0x04);
    /// Destination is a parent of the origin.
    pub const PARENT: TaxonomyFlags = TaxonomyFlags(0x08);
    /// Destination is related through a non-taxonomic role.
    pub const OTHER_CONCEPT: TaxonomyFlags = TaxonomyFlags(0x10);

    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is also set in `self`.
    #[inline]
    pub fn contains(self, other: TaxonomyFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    /// True when `self` and `other` share at least one bit.
    #[inline]
    pub fn intersects(self, other: TaxonomyFlags) -> bool {
        (self.0 & other.0) != 0
    }

    /// Lookup semantics: empty `wanted` matches anything, otherwise the
    /// flags must be exactly equal.
    #[inline]
    pub fn matches(self, wanted: TaxonomyFlags) -> bool {
        wanted.is_empty() || self == wanted
    }
}

impl BitOr for TaxonomyFlags {
    type Output = TaxonomyFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        TaxonomyFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for TaxonomyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for TaxonomyFlags {
    type Output = TaxonomyFlags;

    fn bitand(self, rhs: Self) -> Self::Output {
        TaxonomyFlags(self.0 & rhs.0)
    }
}

impl fmt::Debug for TaxonomyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(TaxonomyFlags, &str); 5] = [
            (TaxonomyFlags::STATED, "STATED"),
            (TaxonomyFlags::INFERRED, "INFERRED"),
            (TaxonomyFlags::CONCEPT_STATUS, "CONCEPT_STATUS"),
            (TaxonomyFlags::PARENT, "PARENT"),
            (TaxonomyFlags::OTHER_CONCEPT, "OTHER_CONCEPT"),
        ];
        if self.is_empty() {
            return f.write_str("TaxonomyFlags(EMPTY)");
        }
        let mut rest = self.0;
        let mut parts = Vec::new();
        for (flag, name) in NAMES {
            if self.contains(flag) {
                parts.push(name.to_string());
                rest &= !flag.0;
            }
        }
        if rest != 0 {
            parts.push(format!("{:#x}", rest));
        }
        write!(f, "TaxonomyFlags({})", parts.join("|"))
    }
}
