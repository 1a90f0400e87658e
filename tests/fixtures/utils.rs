// Shared helpers for integration tests
#![allow(dead_code)]

use blocktree::index::{
    BlockTermState, BlockTreeConfig, BlockTreeReader, BlockTreeTermsWriter, DeltaPostingsCodec, FieldInfo,
    SegmentInfo, SegmentStreams,
};

pub fn segment() -> SegmentInfo {
    SegmentInfo::with_id("_t", *b"blocktree-tests!")
}

/// Deterministic postings state for the `i`-th term: mostly singletons,
/// every fifth term a heavier one
pub fn state_for(i: usize, has_freqs: bool) -> BlockTermState {
    let (doc_freq, total_term_freq) = if i % 5 == 4 {
        (3 + (i % 7) as u32, 10 + i as u64)
    } else {
        (1, 1)
    };
    let total_term_freq = if has_freqs { total_term_freq } else { doc_freq as u64 };
    BlockTermState::new(doc_freq, total_term_freq, vec![1000 + 17 * i as u64, (i % 3) as u64])
}

/// All two-letter lowercase terms, in order
pub fn two_letter_terms() -> Vec<Vec<u8>> {
    let mut terms = Vec::with_capacity(26 * 26);
    for a in b'a'..=b'z' {
        for b in b'a'..=b'z' {
            terms.push(vec![a, b]);
        }
    }
    terms
}

/// Small xorshift generator so tests stay reproducible without extra crates
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        XorShift(seed.max(1))
    }

    pub fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }

    pub fn lowercase(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| b'a' + self.below(26) as u8).collect()
    }
}

/// Sorted, deduplicated random terms over a small alphabet
pub fn random_terms(seed: u64, count: usize, max_len: usize) -> Vec<Vec<u8>> {
    let mut rng = XorShift::new(seed);
    let mut terms: Vec<Vec<u8>> = (0..count)
        .map(|_| {
            let len = 1 + rng.below(max_len as u64) as usize;
            (0..len).map(|_| b"abcdxyz\xc3\x00"[rng.below(9) as usize]).collect()
        })
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

/// Write `fields` to an in-memory segment and open it again
pub fn write_and_open(fields: &[(FieldInfo, Vec<Vec<u8>>)], config: BlockTreeConfig) -> BlockTreeReader {
    let mut writer =
        BlockTreeTermsWriter::new(SegmentStreams::default(), segment(), config, DeltaPostingsCodec::new()).unwrap();
    for (info, terms) in fields {
        let has_freqs = info.index_options.has_freqs();
        let mut field = writer.field(info).unwrap();
        for (i, term) in terms.iter().enumerate() {
            field.write(term, state_for(i, has_freqs)).unwrap();
            field.record_docs([i as u32 % 97]);
        }
        field.finish().unwrap();
    }
    let streams = writer.into_streams().unwrap();
    let infos = fields.iter().map(|(info, _)| info.clone()).collect();
    BlockTreeReader::from_streams(streams, segment(), infos).unwrap()
}
