//! # Taxon DB Spine
//!
//! Spine-segmented concurrent array storage.
//!
//! A logical array indexed by dense keys is split into fixed-size spines that
//! are created lazily and published with compare-and-swap. The spine list
//! grows without blocking readers; multi-step reads that must not observe a
//! growth event go through the [`StampedGate`].
//!
//! Modules:
//! - [`spine`]: the [`Spine`] trait, [`IntSpine`] and [`ArraySpine`]
//! - [`store`]: [`SpineStore`], lazy publication, growth, dirty tracking
//! - [`map`]: [`SpinedIntMap`] and [`SpinedArrayMap`]
//! - [`segment`]: the on-disk directory layout
//! - [`gate`]: optimistic read / validate with lock fallback

pub mod error;
pub mod gate;
pub mod map;
pub mod segment;
pub mod spine;
pub mod store;

pub use error::{Result, SpineError};
pub use gate::{GateWriteGuard, StampedGate};
pub use map::{SpinedArrayMap, SpinedIntMap};
pub use segment::SpineDirectory;
pub use spine::{ArraySpine, IntSpine, PackedInts, Spine};
pub use store::{SpineFactory, SpineStore};
