//! Query coordinates.
//!
//! A [`TaxonomyCoordinate`] pins a taxonomy view to a premise (stated or
//! inferred), a [`StampCoordinate`] (time, path, modules, allowed states) and
//! the [`TaxonomyVocabulary`] that names the reserved relationship types.
//!
//! Coordinates are plain data. Whether a stamp is visible at a coordinate is
//! decided by an external [`PositionCalculator`](crate::provider::PositionCalculator).

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::flags::TaxonomyFlags;
use crate::ids::ConceptSeq;

/// Which logic graph assemblage a view is derived from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PremiseType {
    Stated,
    Inferred,
}

impl PremiseType {
    /// Taxonomy flag stamped on edges produced by this premise.
    pub fn flags(self) -> TaxonomyFlags {
        match self {
            PremiseType::Stated => TaxonomyFlags::STATED,
            PremiseType::Inferred => TaxonomyFlags::INFERRED,
        }
    }
}

/// Which stamp states a coordinate admits.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum AllowedStates {
    #[default]
    Active,
    ActiveAndInactive,
}

/// Temporal/provenance position of a query.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StampCoordinate {
    /// Latest commit time visible (inclusive). `i64::MAX` = latest.
    pub time: i64,
    /// Development path the view follows.
    pub path: ConceptSeq,
    /// Modules admitted. Empty admits every module.
    pub modules: Vec<ConceptSeq>,
    pub allowed: AllowedStates,
}

impl StampCoordinate {
    /// Latest position on `path`, all modules, active only.
    pub fn latest(path: ConceptSeq) -> Self {
        Self {
            time: i64::MAX,
            path,
            modules: Vec::new(),
            allowed: AllowedStates::Active,
        }
    }

    /// Position on `path` as of `time`.
    pub fn at(path: ConceptSeq, time: i64) -> Self {
        Self {
            time,
            ..Self::latest(path)
        }
    }

    pub fn with_modules(mut self, modules: Vec<ConceptSeq>) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_allowed(mut self, allowed: AllowedStates) -> Self {
        self.allowed = allowed;
        self
    }
}

/// Reserved concept sequences the taxonomy engine needs to know about.
///
/// Passed explicitly rather than looked up from a global registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaxonomyVocabulary {
    /// The is-a relationship type.
    pub is_a: ConceptSeq,
    /// Role type of role-group nodes (never an edge by itself).
    pub role_group: ConceptSeq,
    /// Type stamped on concept-status self records.
    pub concept_status: ConceptSeq,
}

impl TaxonomyVocabulary {
    pub fn new(is_a: ConceptSeq, role_group: ConceptSeq, concept_status: ConceptSeq) -> Self {
        Self {
            is_a,
            role_group,
            concept_status,
        }
    }
}

/// How stamps of one destination compete for "latest active".
///
/// A destination may carry both stated and inferred history. Which stamps
/// participate in the latest-active computation is a policy decision.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivePolicy {
    /// Only stamps whose flags contain the coordinate's premise flag take part.
    #[default]
    MatchingPremise,
    /// Every stamp of the selected type takes part; at least one of them must
    /// still carry the premise flag for the destination to be reported.
    AcrossPremises,
}

/// Full coordinate of a taxonomy view.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaxonomyCoordinate {
    pub premise: PremiseType,
    pub stamp: StampCoordinate,
    pub vocabulary: TaxonomyVocabulary,
    pub policy: ActivePolicy,
}

/// Stable 64-bit key derived from every field of a [`TaxonomyCoordinate`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordinateKey(pub u64);

impl TaxonomyCoordinate {
    pub fn new(premise: PremiseType, stamp: StampCoordinate, vocabulary: TaxonomyVocabulary) -> Self {
        Self {
            premise,
            stamp,
            vocabulary,
            policy: ActivePolicy::default(),
        }
    }

    pub fn stated(stamp: StampCoordinate, vocabulary: TaxonomyVocabulary) -> Self {
        Self::new(PremiseType::Stated, stamp, vocabulary)
    }

    pub fn inferred(stamp: StampCoordinate, vocabulary: TaxonomyVocabulary) -> Self {
        Self::new(PremiseType::Inferred, stamp, vocabulary)
    }

    pub fn with_policy(mut self, policy: ActivePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Flags an edge must carry to be visible under this coordinate.
    pub fn flags(&self) -> TaxonomyFlags {
        self.premise.flags()
    }

    /// Cache key. Hashes a canonical little-endian encoding so the key is
    /// stable across processes (unlike `DefaultHasher`).
    pub fn cache_key(&self) -> CoordinateKey {
        let mut buf: Vec<u8> = Vec::with_capacity(64 + self.stamp.modules.len() * 4);
        buf.push(match self.premise {
            PremiseType::Stated => 0,
            PremiseType::Inferred => 1,
        });
        buf.push(match self.policy {
            ActivePolicy::MatchingPremise => 0,
            ActivePolicy::AcrossPremises => 1,
        });
        buf.push(match self.stamp.allowed {
            AllowedStates::Active => 0,
            AllowedStates::ActiveAndInactive => 1,
        });
        buf.extend_from_slice(&self.stamp.time.to_le_bytes());
        buf.extend_from_slice(&self.stamp.path.0.to_le_bytes());
        let mut modules = self.stamp.modules.clone();
        modules.sort_unstable();
        modules.dedup();
        buf.extend_from_slice(&(modules.len() as u32).to_le_bytes());
        for m in modules {
            buf.extend_from_slice(&m.0.to_le_bytes());
        }
        buf.extend_from_slice(&self.vocabulary.is_a.0.to_le_bytes());
        buf.extend_from_slice(&self.vocabulary.role_group.0.to_le_bytes());
        buf.extend_from_slice(&self.vocabulary.concept_status.0.to_le_bytes());
        CoordinateKey(xxh3_64(&buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> TaxonomyVocabulary {
        TaxonomyVocabulary::new(ConceptSeq(1), ConceptSeq(2), ConceptSeq(3))
    }

    #[test]
    fn premise_flags() {
        assert_eq!(PremiseType::Stated.flags(), TaxonomyFlags::STATED);
        assert_eq!(PremiseType::Inferred.flags(), TaxonomyFlags::INFERRED);
    }

    #[test]
    fn cache_key_ignores_module_order() {
        let a = TaxonomyCoordinate::stated(
            StampCoordinate::latest(ConceptSeq(9)).with_modules(vec![ConceptSeq(5), ConceptSeq(4)]),
            vocab(),
        );
        let b = TaxonomyCoordinate::stated(
            StampCoordinate::latest(ConceptSeq(9)).with_modules(vec![ConceptSeq(4), ConceptSeq(5)]),
            vocab(),
        );
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_distinguishes_premise_and_time() {
        let stated = TaxonomyCoordinate::stated(StampCoordinate::latest(ConceptSeq(9)), vocab());
        let inferred = TaxonomyCoordinate::inferred(StampCoordinate::latest(ConceptSeq(9)), vocab());
        let earlier = TaxonomyCoordinate::stated(StampCoordinate::at(ConceptSeq(9), 10), vocab());
        assert_ne!(stated.cache_key(), inferred.cache_key());
        assert_ne!(stated.cache_key(), earlier.cache_key());
        assert_ne!(
            stated.cache_key(),
            stated.clone().with_policy(ActivePolicy::AcrossPremises).cache_key()
        );
    }
}
