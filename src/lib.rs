//! # blocktree - Block-Tree Term Dictionary
//!
//! A writer (and paired reader) for a Lucene-style block-tree terms
//! dictionary. Sorted terms of each field are grouped into nested blocks by
//! shared prefix, and every block prefix is indexed by a finite-state
//! transducer that maps it to the block's location.
//!
//! ## Architecture
//!
//! - [`index`] - Segment writer, per-field terms writer, block serializer,
//!   field directory and reader
//! - [`fst`] - Byte-output FST used as the prefix index
//! - [`utils`] - Variable-length and bit-packed integers, suffix compression
//! - [`output`] - Terminal formatting for the CLI
//! - [`error`] - Error type shared by the library
//!
//! ## Quick Start
//!
//! ```no_run
//! use blocktree::index::{
//!     BlockTermState, BlockTreeConfig, BlockTreeReader, BlockTreeTermsWriter, DeltaPostingsCodec,
//!     FieldInfo, IndexOptions, SegmentInfo, SegmentStreams,
//! };
//!
//! let segment = SegmentInfo::new("_0");
//! let body = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
//! let mut writer = BlockTreeTermsWriter::new(
//!     SegmentStreams::default(),
//!     segment.clone(),
//!     BlockTreeConfig::default(),
//!     DeltaPostingsCodec::new(),
//! )?;
//! writer.write_field(&body, [("apple", BlockTermState::new(1, 1, vec![0]))])?;
//! let streams = writer.into_streams()?;
//!
//! let reader = BlockTreeReader::from_streams(streams, segment, vec![body])?;
//! let state = reader.field("body")?.seek_exact(b"apple", &mut DeltaPostingsCodec::new())?;
//! assert!(state.is_some());
//! # Ok::<(), blocktree::Error>(())
//! ```
//!
//! ## Files
//!
//! A segment consists of `<segment>.tim` (blocks), `<segment>.tip` (one FST
//! per field plus the table of index start offsets) and `<segment>.tmd` (the
//! field directory). Each stream carries a codec header and a checksummed
//! footer.

pub mod error;
pub mod fst;
pub mod index;
pub mod output;
pub mod utils;

pub use error::{Error, Result};
