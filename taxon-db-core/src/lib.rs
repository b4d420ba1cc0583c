//! # Taxon DB Core
//!
//! Shared vocabulary of the taxonomy store.
//!
//! This crate provides:
//! - Identifier newtypes: [`ConceptSeq`], [`StampSeq`], [`Nid`]
//! - [`TaxonomyFlags`] stamped on every edge version
//! - Query coordinates ([`TaxonomyCoordinate`], [`StampCoordinate`]) and the
//!   [`ActivePolicy`] used to resolve competing premise histories
//! - Collaborator traits for identifier translation, stamps and relative
//!   position, plus in-memory implementations
//!
//! ## Design Principles
//!
//! 1. **Explicit collaborators**: services are injected, never looked up from
//!    process-wide registries
//! 2. **Dense sequences inside**: nids are translated at the boundary only
//! 3. **No I/O**: storage lives in `taxon-db-spine`

pub mod coordinate;
pub mod error;
pub mod flags;
pub mod ids;
pub mod memory;
pub mod provider;

pub use coordinate::{
    ActivePolicy, AllowedStates, CoordinateKey, PremiseType, StampCoordinate, TaxonomyCoordinate,
    TaxonomyVocabulary,
};
pub use error::{CoreError, Result};
pub use flags::TaxonomyFlags;
pub use ids::{ConceptSeq, Nid, StampSeq, PACKED_VALUE_MASK};
pub use memory::{
    MemoryIdentifierService, MemoryPositionCalculator, MemoryPositionCalculatorFactory,
    MemoryStampService, StampInfo, StampStatus,
};
pub use provider::{IdentifierService, PositionCalculator, PositionCalculatorFactory, StampService};
