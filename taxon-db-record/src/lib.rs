//! # Taxon DB Record
//!
//! Storage unit of the taxonomy: one record per origin concept mapping each
//! destination concept to every (type, stamp, flags) version ever asserted
//! for that relationship.
//!
//! - [`TypeStampFlagSet`]: grow-only ordered set of versions for one destination
//! - [`TaxonomyRecordBuilder`] / [`TaxonomyRecord`]: mutable and frozen records
//! - [`PackedRecord`]: the `u32` run encoding kept in the spine store
//! - [`DestinationOriginIndex`]: derived reverse index
//!
//! Visibility at a coordinate is never decided here; queries take a
//! [`PositionCalculator`](taxon_db_core::PositionCalculator).

pub mod error;
pub mod index;
pub mod packed;
pub mod record;
pub mod tsf;

pub use error::{RecordError, Result};
pub use index::DestinationOriginIndex;
pub use packed::PackedRecord;
pub use record::{TaxonomyRecord, TaxonomyRecordBuilder};
pub use tsf::{StampList, TypeMatch, TypeStampFlag, TypeStampFlagSet, MAX_TUPLES_PER_RUN};
