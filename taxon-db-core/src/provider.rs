//! Collaborator traits consumed by the taxonomy engine.
//!
//! Identifier translation, stamp bookkeeping and relative-position
//! computation live outside this workspace. Callers inject implementations as
//! `Arc<dyn …>`; [`memory`](crate::memory) provides in-memory versions for
//! tests and embedding.

use std::fmt::Debug;
use std::sync::Arc;

use crate::coordinate::StampCoordinate;
use crate::error::Result;
use crate::ids::{ConceptSeq, Nid, StampSeq};

/// Translates external nids to dense sequences and enumerates assemblages.
pub trait IdentifierService: Debug + Send + Sync {
    /// Dense sequence for a nid, if one was assigned.
    fn sequence_for_nid(&self, nid: Nid) -> Option<ConceptSeq>;

    /// Nid for a dense sequence.
    fn nid_for_sequence(&self, seq: ConceptSeq) -> Option<Nid>;

    /// Assemblage (concept kind / semantic type) a sequence belongs to.
    fn assemblage_for_sequence(&self, seq: ConceptSeq) -> Option<ConceptSeq>;

    /// Every sequence in `assemblage`, ascending.
    fn concept_sequences(&self, assemblage: ConceptSeq) -> Vec<ConceptSeq>;
}

/// Stamp bookkeeping needed by the update engine.
pub trait StampService: Debug + Send + Sync {
    /// Stamp identical to `active` except that its status is retired.
    fn retired_stamp_for(&self, active: StampSeq) -> Result<StampSeq>;

    /// True if the service issued this stamp.
    fn is_known(&self, stamp: StampSeq) -> bool;
}

/// Decides stamp visibility for one [`StampCoordinate`].
pub trait PositionCalculator: Debug + Send + Sync {
    /// The stamp lies on the coordinate's route (path, time, module).
    fn on_route(&self, stamp: StampSeq) -> bool;

    /// Among `stamps` (the versions of one fact), the latest on-route
    /// version is active at the coordinate.
    fn is_latest_active(&self, stamps: &[StampSeq]) -> bool;
}

/// Produces a calculator bound to a coordinate.
pub trait PositionCalculatorFactory: Debug + Send + Sync {
    fn calculator_for(&self, coordinate: &StampCoordinate) -> Arc<dyn PositionCalculator>;
}
