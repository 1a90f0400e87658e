#![no_main]

use blocktree::index::{BlockTreeReader, DeltaPostingsCodec, FieldInfo, IndexOptions, SegmentInfo, SegmentStreams};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary stream contents must be rejected with an error, never a panic
    let third = data.len() / 3;
    let streams = SegmentStreams {
        terms: data[..third].to_vec(),
        index: data[third..2 * third].to_vec(),
        meta: data[2 * third..].to_vec(),
    };
    let fields = vec![FieldInfo::new("f", 0, IndexOptions::DocsAndFreqs)];
    if let Ok(reader) = BlockTreeReader::from_streams(streams, SegmentInfo::with_id("_f", [1; 16]), fields) {
        for field in reader.fields() {
            let _ = field.terms(&mut DeltaPostingsCodec::new());
            let _ = field.seek_exact(b"abc", &mut DeltaPostingsCodec::new());
        }
    }
});
