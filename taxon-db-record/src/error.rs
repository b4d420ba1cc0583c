//! Error types for taxonomy records

use taxon_db_core::PACKED_VALUE_MASK;
use thiserror::Error;

/// Record packing / unpacking errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// A destination, type or stamp does not fit the 24-bit packed field
    #[error("{field} {value} exceeds packed maximum {max:#x}", max = PACKED_VALUE_MASK)]
    ValueOutOfRange { field: &'static str, value: u32 },

    /// Run header with a zero length at `offset`
    #[error("Zero-length run header at offset {offset}")]
    ZeroLength { offset: usize },

    /// Run length is not 1 + 3 × tuple count
    #[error("Run at offset {offset} has length {len}, not 1 + 3n")]
    Misaligned { offset: usize, len: usize },

    /// Run extends past the end of the array
    #[error("Run at offset {offset} with length {len} overruns array of {available}")]
    Overrun {
        offset: usize,
        len: usize,
        available: usize,
    },
}

impl RecordError {
    /// True for the decode-side variants.
    pub fn is_decode(&self) -> bool {
        !matches!(self, RecordError::ValueOutOfRange { .. })
    }
}

/// Result type for record operations
pub type Result<T> = std::result::Result<T, RecordError>;
