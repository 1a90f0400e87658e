#![no_main]

use arbitrary::Arbitrary;
use blocktree::index::{
    BlockTermState, BlockTreeConfig, BlockTreeReader, BlockTreeTermsWriter, DeltaPostingsCodec, FieldInfo,
    IndexOptions, SegmentInfo, SegmentStreams,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    min_block: u8,
    extra_block: u8,
    with_freqs: bool,
    terms: Vec<(Vec<u8>, u8, u8)>,
}

fuzz_target!(|input: Input| {
    // Any sorted, deduplicated term set must read back unchanged
    let min = 2 + (input.min_block % 30) as usize;
    let max = 2 * (min - 1) + (input.extra_block % 40) as usize;
    let Ok(config) = BlockTreeConfig::new(min, max) else {
        return;
    };

    let mut terms = input.terms;
    terms.sort_by(|a, b| a.0.cmp(&b.0));
    terms.dedup_by(|a, b| a.0 == b.0);

    let options = if input.with_freqs { IndexOptions::DocsAndFreqs } else { IndexOptions::Docs };
    let field = FieldInfo::new("f", 0, options);
    let states: Vec<BlockTermState> = terms
        .iter()
        .enumerate()
        .map(|(i, (_, df, extra))| {
            let df = 1 + *df as u32;
            let ttf = if input.with_freqs { df as u64 + *extra as u64 } else { df as u64 };
            BlockTermState::new(df, ttf, vec![i as u64, *extra as u64])
        })
        .collect();

    let segment = SegmentInfo::with_id("_f", [1; 16]);
    let mut writer =
        BlockTreeTermsWriter::new(SegmentStreams::default(), segment.clone(), config, DeltaPostingsCodec::new())
            .unwrap();
    writer
        .write_field(&field, terms.iter().map(|(t, _, _)| t).zip(states.iter().cloned()))
        .unwrap();
    let streams = writer.into_streams().unwrap();

    let reader = BlockTreeReader::from_streams(streams, segment, vec![field]).unwrap();
    let field = reader.field("f").unwrap();
    let mut postings = DeltaPostingsCodec::new();
    let read = field.terms(&mut postings).unwrap();
    assert_eq!(read.len(), terms.len());
    for ((term, state), ((expected, _, _), expected_state)) in read.iter().zip(terms.iter().zip(&states)) {
        assert_eq!(term, expected);
        assert_eq!(state, expected_state);
        assert_eq!(field.seek_exact(term, &mut postings).unwrap().as_ref(), Some(expected_state));
    }
});
