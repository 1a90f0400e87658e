//! Entries on the terms writer's pending stack and the per-block index
//! compilation that merges child indices into their parent.

use crate::error::{Error, Result};
use crate::fst::{Fst, FstBuilder};
use crate::index::types::{BlockTermState, OUTPUT_FLAG_HAS_TERMS, OUTPUT_FLAG_IS_FLOOR, OUTPUT_FLAGS_NUM_BITS};
use crate::utils::encoding::{ByteReader, DataOutput};

/// A term waiting to be written into a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTerm {
    pub term: Vec<u8>,
    pub state: BlockTermState,
}

/// A sealed prefix run, standing in for every entry it replaced.
///
/// `index` maps `prefix` (and every descendant block prefix) to the encoded
/// location of its block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBlock {
    pub prefix: Vec<u8>,
    pub fp: u64,
    pub has_terms: bool,
    pub is_floor: bool,
    pub floor_lead_byte: Option<u8>,
    pub index: Fst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingEntry {
    Term(PendingTerm),
    Block(PendingBlock),
}

impl PendingEntry {
    pub fn is_term(&self) -> bool {
        matches!(self, PendingEntry::Term(_))
    }

    /// Term bytes or block prefix
    pub fn key(&self) -> &[u8] {
        match self {
            PendingEntry::Term(term) => &term.term,
            PendingEntry::Block(block) => &block.prefix,
        }
    }

    /// First byte after `prefix_len`, or `None` for a term equal to the prefix
    pub fn lead_label(&self, prefix_len: usize) -> Option<u8> {
        match self {
            PendingEntry::Term(term) => term.term.get(prefix_len).copied(),
            PendingEntry::Block(block) => {
                debug_assert!(block.prefix.len() > prefix_len);
                block.prefix.get(prefix_len).copied()
            }
        }
    }
}

/// One physical block just written to the dictionary stream, still holding
/// the indices of the sub-blocks it references
#[derive(Debug)]
pub struct WrittenBlock {
    /// Nominal prefix, plus the floor lead byte for non-first floor siblings
    pub prefix: Vec<u8>,
    pub fp: u64,
    pub has_terms: bool,
    pub is_floor: bool,
    pub floor_lead_byte: Option<u8>,
    pub sub_indices: Vec<Fst>,
}

/// Location of a non-first floor sibling, relative to the first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloorSibling {
    pub lead_byte: u8,
    pub fp: u64,
    pub has_terms: bool,
}

/// Decoded index output for a block prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOutput {
    pub fp: u64,
    pub has_terms: bool,
    pub is_floor: bool,
    pub floor: Vec<FloorSibling>,
}

/// Pack a block location with its flag bits
#[inline]
pub fn encode_output(fp: u64, has_terms: bool, is_floor: bool) -> u64 {
    debug_assert!(fp < 1 << (64 - OUTPUT_FLAGS_NUM_BITS));
    (fp << OUTPUT_FLAGS_NUM_BITS)
        | if has_terms { OUTPUT_FLAG_HAS_TERMS } else { 0 }
        | if is_floor { OUTPUT_FLAG_IS_FLOOR } else { 0 }
}

impl BlockOutput {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writes into a Vec cannot fail.
        let _ = out.write_vlong(encode_output(self.fp, self.has_terms, self.is_floor));
        if self.is_floor {
            let _ = out.write_vint(self.floor.len() as u32);
            for sibling in &self.floor {
                debug_assert!(sibling.fp > self.fp);
                out.push(sibling.lead_byte);
                let _ = out.write_vlong(((sibling.fp - self.fp) << 1) | sibling.has_terms as u64);
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut input = ByteReader::new(bytes);
        let code = input.read_vlong()?;
        let fp = code >> OUTPUT_FLAGS_NUM_BITS;
        let has_terms = code & OUTPUT_FLAG_HAS_TERMS != 0;
        let is_floor = code & OUTPUT_FLAG_IS_FLOOR != 0;

        let mut floor = Vec::new();
        if is_floor {
            let count = input.read_vint()? as usize;
            if count > input.remaining() {
                return Err(Error::corrupt(format!("floor output claims {} siblings", count)));
            }
            for _ in 0..count {
                let lead_byte = input.read_u8()?;
                let code = input.read_vlong()?;
                floor.push(FloorSibling {
                    lead_byte,
                    fp: fp + (code >> 1),
                    has_terms: code & 1 != 0,
                });
            }
        }
        if !input.is_at_end() {
            return Err(Error::corrupt("trailing bytes after block output"));
        }
        Ok(Self {
            fp,
            has_terms,
            is_floor,
            floor,
        })
    }

    /// Block to scan for a term whose byte after the indexed prefix is `label`
    /// (`None` when the term ends at the prefix). Returns `(fp, has_terms)`.
    pub fn select(&self, label: Option<u8>) -> (u64, bool) {
        let mut selected = (self.fp, self.has_terms);
        if let Some(label) = label {
            for sibling in &self.floor {
                if sibling.lead_byte > label {
                    break;
                }
                selected = (sibling.fp, sibling.has_terms);
            }
        }
        selected
    }
}

/// Build the index for the blocks written by one seal and fold in the
/// indices of every sub-block they reference.
///
/// The first block becomes the representative [`PendingBlock`]; its prefix
/// maps to the location of all siblings. Child indices are consumed.
pub fn compile_index(blocks: Vec<WrittenBlock>) -> Result<PendingBlock> {
    assert!(!blocks.is_empty(), "a seal always writes at least one block");
    let first = &blocks[0];
    assert!(
        first.is_floor || blocks.len() == 1,
        "multiple blocks from one seal must be floor blocks"
    );

    let mut floor = Vec::with_capacity(blocks.len() - 1);
    for sibling in &blocks[1..] {
        let Some(lead_byte) = sibling.floor_lead_byte else {
            return Err(Error::fst("floor sibling without a lead byte"));
        };
        assert!(sibling.fp > first.fp);
        floor.push(FloorSibling {
            lead_byte,
            fp: sibling.fp,
            has_terms: sibling.has_terms,
        });
    }
    let output = BlockOutput {
        fp: first.fp,
        has_terms: first.has_terms,
        is_floor: first.is_floor,
        floor,
    };

    let mut builder = FstBuilder::new();
    builder.add(&first.prefix, &output.encode())?;

    let (prefix, fp, has_terms, is_floor, floor_lead_byte) = (
        first.prefix.clone(),
        first.fp,
        first.has_terms,
        first.is_floor,
        first.floor_lead_byte,
    );

    for block in blocks {
        for sub_index in block.sub_indices {
            for entry in sub_index.iter() {
                let (key, value) = entry?;
                builder.add(&key, &value)?;
            }
        }
    }

    Ok(PendingBlock {
        prefix,
        fp,
        has_terms,
        is_floor,
        floor_lead_byte,
        index: builder.finish(),
    })
}
