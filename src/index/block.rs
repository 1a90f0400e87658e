//! Block serialization for the dictionary stream.
//!
//! Layout of one block:
//!
//! ```text
//! vint((num_entries << 1) | is_last)
//! vlong((suffix_bytes_len << 3) | is_leaf << 2 | compression_code)
//! suffix bytes (raw), or vint(compressed_len) + compressed bytes
//! vint((lengths_len << 1) | all_equal), then one byte or lengths_len bytes
//! vint(stats_len) stats
//! vint(meta_len) meta
//! ```
//!
//! Leaf blocks record bare suffix lengths. Internal blocks record
//! `(suffix_len << 1) | is_block` and follow sub-block entries with
//! `vlong(block_fp - child_fp)`.

use crate::error::{Error, Result};
use crate::index::output::IndexOutput;
use crate::index::pending::{PendingEntry, WrittenBlock};
use crate::index::postings::PostingsWriter;
use crate::index::types::FieldInfo;
use crate::utils::compress::{CompressionAlgorithm, compress_suffixes};
use crate::utils::encoding::{ByteReader, DataOutput};
use std::io::Write;
use tracing::debug;

/// One physical block carved out of a sealed prefix run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPlan {
    /// Range within the run, end exclusive
    pub start: usize,
    pub end: usize,
    /// Lead byte of the first entry; `None` for the first block of a run
    pub floor_lead_byte: Option<u8>,
    pub is_floor: bool,
    pub has_terms: bool,
    pub has_sub_blocks: bool,
}

impl BlockPlan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Split a run of entries sharing `prefix_len` bytes into physical blocks.
///
/// Greedy single pass: whenever the lead byte after the prefix changes, cut a
/// block if the current one already holds `min_items` entries and everything
/// not yet assigned would not fit in `max_items`.
pub fn plan_blocks(prefix_len: usize, entries: &[PendingEntry], min_items: usize, max_items: usize) -> Vec<BlockPlan> {
    let count = entries.len();
    let end = count;
    let mut plans = Vec::new();

    let mut last_lead: Option<u8> = None;
    let mut has_terms = false;
    let mut has_sub_blocks = false;
    let mut next_start = 0;
    let mut next_lead: Option<u8> = None;

    for (i, entry) in entries.iter().enumerate() {
        let lead = entry.lead_label(prefix_len);
        if lead != last_lead {
            let items_in_block = i - next_start;
            if items_in_block >= min_items && end - next_start > max_items {
                plans.push(BlockPlan {
                    start: next_start,
                    end: i,
                    floor_lead_byte: next_lead,
                    is_floor: items_in_block < count,
                    has_terms,
                    has_sub_blocks,
                });
                has_terms = false;
                has_sub_blocks = false;
                next_lead = lead;
                next_start = i;
            }
            last_lead = lead;
        }

        if entry.is_term() {
            has_terms = true;
        } else {
            has_sub_blocks = true;
        }
    }

    if next_start < end {
        let items_in_block = end - next_start;
        plans.push(BlockPlan {
            start: next_start,
            end,
            floor_lead_byte: next_lead,
            is_floor: items_in_block < count,
            has_terms,
            has_sub_blocks,
        });
    }

    plans
}

/// Run-length encodes term statistics: consecutive terms with `df == 1`
/// (and `ttf == 1` when frequencies are tracked) collapse into one record
pub struct StatsWriter {
    out: Vec<u8>,
    has_freqs: bool,
    singleton_count: u32,
}

impl StatsWriter {
    pub fn new(has_freqs: bool) -> Self {
        Self {
            out: Vec::new(),
            has_freqs,
            singleton_count: 0,
        }
    }

    pub fn add(&mut self, doc_freq: u32, total_term_freq: u64) {
        if doc_freq == 1 && (!self.has_freqs || total_term_freq == 1) {
            self.singleton_count += 1;
            return;
        }
        self.flush_singletons();
        let _ = self.out.write_vint(doc_freq << 1);
        if self.has_freqs {
            debug_assert!(total_term_freq >= doc_freq as u64);
            let _ = self.out.write_vlong(total_term_freq - doc_freq as u64);
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.flush_singletons();
        self.out
    }

    fn flush_singletons(&mut self) {
        if self.singleton_count > 0 {
            let _ = self.out.write_vint(((self.singleton_count - 1) << 1) | 1);
            self.singleton_count = 0;
        }
    }
}

/// Decodes what [`StatsWriter`] produced, one term at a time
pub struct StatsReader<'a> {
    input: ByteReader<'a>,
    has_freqs: bool,
    singletons_left: u32,
}

impl<'a> StatsReader<'a> {
    pub fn new(bytes: &'a [u8], has_freqs: bool) -> Self {
        Self {
            input: ByteReader::new(bytes),
            has_freqs,
            singletons_left: 0,
        }
    }

    /// `(doc_freq, total_term_freq)` of the next term
    pub fn next_stats(&mut self) -> Result<(u32, u64)> {
        if self.singletons_left > 0 {
            self.singletons_left -= 1;
            return Ok((1, 1));
        }
        let token = self.input.read_vint()?;
        if token & 1 != 0 {
            self.singletons_left = token >> 1;
            return Ok((1, 1));
        }
        let doc_freq = token >> 1;
        let total_term_freq = if self.has_freqs {
            doc_freq as u64 + self.input.read_vlong()?
        } else {
            doc_freq as u64
        };
        Ok((doc_freq, total_term_freq))
    }

    pub fn is_exhausted(&self) -> bool {
        self.singletons_left == 0 && self.input.is_at_end()
    }
}

/// Write one planned block of entries to the dictionary stream.
///
/// `prefix` is the run's nominal prefix; every entry starts with it.
/// Sub-block entries give up their index to the returned [`WrittenBlock`].
pub fn write_block<W: Write, P: PostingsWriter>(
    out: &mut IndexOutput<W>,
    postings: &mut P,
    field: &FieldInfo,
    prefix: &[u8],
    plan: &BlockPlan,
    entries: Vec<PendingEntry>,
    is_last: bool,
) -> Result<WrittenBlock> {
    debug_assert_eq!(entries.len(), plan.len());
    let start_fp = out.file_pointer();
    let prefix_len = prefix.len();
    let num_entries = entries.len();
    let is_leaf = !plan.has_sub_blocks;

    out.write_vint(((num_entries as u32) << 1) | is_last as u32)?;

    let mut suffixes = Vec::new();
    let mut suffix_lengths = Vec::new();
    let mut stats = StatsWriter::new(field.index_options.has_freqs());
    let mut meta = Vec::new();
    let mut sub_indices = Vec::new();
    let mut absolute = true;

    for entry in entries {
        if let Some(lead) = plan.floor_lead_byte {
            debug_assert!(entry.lead_label(prefix_len).is_some_and(|l| l >= lead));
        }
        match entry {
            PendingEntry::Term(term) => {
                assert!(
                    term.term.starts_with(prefix),
                    "term {:?} does not start with block prefix {:?}",
                    String::from_utf8_lossy(&term.term),
                    String::from_utf8_lossy(prefix)
                );
                let suffix = &term.term[prefix_len..];
                if is_leaf {
                    suffix_lengths.write_vint(suffix.len() as u32)?;
                } else {
                    suffix_lengths.write_vint((suffix.len() as u32) << 1)?;
                }
                suffixes.extend_from_slice(suffix);
                stats.add(term.state.doc_freq, term.state.total_term_freq);
                postings.encode_term(&mut meta, field, &term.state, absolute)?;
                absolute = false;
            }
            PendingEntry::Block(block) => {
                assert!(!is_leaf);
                assert!(
                    block.prefix.len() > prefix_len && block.prefix.starts_with(prefix),
                    "sub-block prefix {:?} does not extend block prefix {:?}",
                    String::from_utf8_lossy(&block.prefix),
                    String::from_utf8_lossy(prefix)
                );
                assert!(block.fp < start_fp, "sub-blocks are written before their parent");
                let suffix = &block.prefix[prefix_len..];
                suffix_lengths.write_vint(((suffix.len() as u32) << 1) | 1)?;
                suffixes.extend_from_slice(suffix);
                suffix_lengths.write_vlong(start_fp - block.fp)?;
                sub_indices.push(block.index);
            }
        }
    }
    let stats = stats.finish();

    let compressed = compress_suffixes(&suffixes, num_entries, prefix_len);
    let compression = compressed
        .as_ref()
        .map_or(CompressionAlgorithm::None, |(algorithm, _)| *algorithm);
    let token = ((suffixes.len() as u64) << 3) | (is_leaf as u64) << 2 | compression.code() as u64;
    out.write_vlong(token)?;
    match &compressed {
        Some((_, bytes)) => out.write_len_prefixed(bytes)?,
        None => out.write_bytes(&suffixes)?,
    }

    let all_equal = suffix_lengths.iter().all(|&b| b == suffix_lengths[0]);
    if all_equal {
        out.write_vint(((suffix_lengths.len() as u32) << 1) | 1)?;
        out.write_byte(suffix_lengths[0])?;
    } else {
        out.write_vint((suffix_lengths.len() as u32) << 1)?;
        out.write_bytes(&suffix_lengths)?;
    }

    out.write_len_prefixed(&stats)?;
    out.write_len_prefixed(&meta)?;

    let mut block_prefix = prefix.to_vec();
    if plan.is_floor {
        if let Some(lead) = plan.floor_lead_byte {
            block_prefix.push(lead);
        }
    }

    debug!(
        field = %field.name,
        prefix = %String::from_utf8_lossy(&block_prefix),
        fp = start_fp,
        entries = num_entries,
        leaf = is_leaf,
        floor = plan.is_floor,
        last = is_last,
        compression = compression.name(),
        "wrote block"
    );

    Ok(WrittenBlock {
        prefix: block_prefix,
        fp: start_fp,
        has_terms: plan.has_terms,
        is_floor: plan.is_floor,
        floor_lead_byte: plan.floor_lead_byte,
        sub_indices,
    })
}

/// Decode a suffix-lengths section written by [`write_block`]
pub fn read_suffix_lengths<'a>(input: &mut ByteReader<'a>) -> Result<Vec<u8>> {
    let code = input.read_vint()?;
    let len = (code >> 1) as usize;
    if code & 1 != 0 {
        let byte = input.read_u8()?;
        if len == 0 {
            return Err(Error::corrupt("empty suffix-lengths run"));
        }
        Ok(vec![byte; len])
    } else {
        Ok(input.read_bytes(len)?.to_vec())
    }
}
