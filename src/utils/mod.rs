//! Low-level encoding shared by the writer and reader.
//!
//! - [`encoding`] - Variable-length integers, `DataOutput` sink trait, `ByteReader` cursor
//! - [`packed`] - Fixed-width bit packing and block-monotonic arrays
//! - [`compress`] - Block suffix compression (lowercase ASCII, LZ4)
//! - [`progress`] - CLI progress bars

pub mod compress;
pub mod encoding;
pub mod packed;
pub mod progress;

pub use encoding::*;
