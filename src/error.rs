//! Error types for the block-tree terms dictionary

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Library error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from one of the output or input streams
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid min/max block size settings
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A term was not strictly greater than its predecessor
    #[error("Term out of order in field '{field}': {term:?} after {previous:?}")]
    TermOutOfOrder {
        field: String,
        previous: String,
        term: String,
    },

    /// A field was opened with a number not greater than the last one
    #[error("Field out of order: field {current} after field {previous}")]
    FieldOutOfOrder { previous: u32, current: u32 },

    /// Postings statistics that violate the postings contract
    #[error("Invalid term state: {0}")]
    InvalidTermState(String),

    /// The writer has already been closed
    #[error("Writer is closed")]
    Closed,

    /// An earlier write failed; the partially written streams must be discarded
    #[error("Writer failed earlier; its output is incomplete")]
    Failed,

    /// Malformed input while reading a segment
    #[error("Corrupt index: {0}")]
    Corrupt(String),

    /// Footer checksum does not match the stream content
    #[error("Checksum mismatch in {stream}: expected {expected:#018x}, got {actual:#018x}")]
    ChecksumMismatch {
        stream: String,
        expected: u64,
        actual: u64,
    },

    /// FST construction or decoding error
    #[error("FST error: {0}")]
    Fst(String),

    /// A monotonic array received a decreasing value
    #[error("Values are not monotonic: {value} after {previous}")]
    NotMonotonic { previous: u64, value: u64 },

    /// The requested field does not exist in the segment
    #[error("Unknown field: {0}")]
    UnknownField(String),
}

impl Error {
    /// Create a corrupt index error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }

    /// Create an FST error
    pub fn fst(msg: impl Into<String>) -> Self {
        Error::Fst(msg.into())
    }

    /// Create a configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }
}
