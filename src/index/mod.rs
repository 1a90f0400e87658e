pub mod block;
pub mod build;
pub mod output;
pub mod pending;
pub mod postings;
pub mod reader;
pub mod stats;
pub mod summary;
pub mod terms_writer;
pub mod types;
pub mod writer;

pub use postings::{DeltaPostingsCodec, PostingsReader, PostingsWriter};
pub use reader::{BlockStats, BlockTreeReader, FieldReader};
pub use summary::FieldSummary;
pub use terms_writer::TermsWriter;
pub use types::*;
pub use writer::{BlockTreeTermsWriter, SegmentStreams};
