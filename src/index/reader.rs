//! Reader for segments written by [`BlockTreeTermsWriter`].
//!
//! On open every stream's footer checksum and codec header is verified, the
//! field directory is decoded and each field's FST index is loaded into
//! memory. Blocks in the dictionary stream are decoded on demand.
//!
//! [`BlockTreeTermsWriter`]: crate::index::writer::BlockTreeTermsWriter

use crate::error::{Error, Result};
use crate::fst::Fst;
use crate::index::block::{StatsReader, read_suffix_lengths};
use crate::index::output::{check_footer, check_header};
use crate::index::pending::BlockOutput;
use crate::index::postings::PostingsReader;
use crate::index::summary::{FieldDirectory, FieldSummary};
use crate::index::types::*;
use crate::index::writer::SegmentStreams;
use crate::utils::compress::CompressionAlgorithm;
use crate::utils::encoding::ByteReader;
use crate::utils::packed::read_monotonic;
use memmap2::Mmap;
use serde::Serialize;
use std::fs::{self, File};
use std::ops::Deref;
use std::path::Path;

/// Bytes of one stream, either mapped from disk or held in memory
enum Source {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Source {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Source::Mapped(mmap) => mmap,
            Source::Owned(bytes) => bytes,
        }
    }
}

fn map_file(path: &Path) -> Result<Source> {
    let file = File::open(path)?;
    // Segment files are immutable once the writer has closed them
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(Source::Mapped(mmap))
}

struct FieldEntry {
    info: FieldInfo,
    summary: FieldSummary,
    index: Option<Fst>,
}

/// Shape of one physical block, as reported by [`FieldReader::block_stats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockStats {
    pub fp: u64,
    /// Full prefix of the block's entries (the nominal prefix of its run)
    pub prefix: String,
    pub entries: usize,
    pub terms: usize,
    pub sub_blocks: usize,
    pub is_leaf: bool,
    pub is_floor: bool,
    pub is_last: bool,
    pub compression: &'static str,
    pub suffix_bytes: usize,
}

/// Open segment: the dictionary stream plus every field's loaded index
pub struct BlockTreeReader {
    segment: SegmentInfo,
    terms: Source,
    fields: Vec<FieldEntry>,
}

impl BlockTreeReader {
    /// Memory-map `<segment>.tim`, `.tip` and `.tmd` under `dir`
    pub fn open(dir: &Path, segment: SegmentInfo, fields: Vec<FieldInfo>) -> Result<Self> {
        let streams = SegmentStreams {
            terms: map_file(&dir.join(segment.file_name(TERMS_EXTENSION)))?,
            index: map_file(&dir.join(segment.file_name(TERMS_INDEX_EXTENSION)))?,
            meta: map_file(&dir.join(segment.file_name(TERMS_META_EXTENSION)))?,
        };
        Self::load(streams, segment, fields)
    }

    /// Open a segment using the field descriptors saved next to it
    pub fn open_segment(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(format!("{}.{}", name, FIELD_INFOS_EXTENSION));
        let json = fs::read_to_string(&path)?;
        let meta: SegmentMeta =
            serde_json::from_str(&json).map_err(|e| Error::corrupt(format!("{}: {}", path.display(), e)))?;
        Self::open(dir, meta.segment, meta.fields)
    }

    /// Read a segment held in memory, e.g. from [`BlockTreeTermsWriter::into_streams`]
    ///
    /// [`BlockTreeTermsWriter::into_streams`]: crate::index::writer::BlockTreeTermsWriter::into_streams
    pub fn from_streams(streams: SegmentStreams<Vec<u8>>, segment: SegmentInfo, fields: Vec<FieldInfo>) -> Result<Self> {
        let streams = SegmentStreams {
            terms: Source::Owned(streams.terms),
            index: Source::Owned(streams.index),
            meta: Source::Owned(streams.meta),
        };
        Self::load(streams, segment, fields)
    }

    fn load(streams: SegmentStreams<Source>, segment: SegmentInfo, infos: Vec<FieldInfo>) -> Result<Self> {
        let terms_name = segment.file_name(TERMS_EXTENSION);
        let index_name = segment.file_name(TERMS_INDEX_EXTENSION);
        let meta_name = segment.file_name(TERMS_META_EXTENSION);

        let meta_footer = check_footer(&streams.meta, &meta_name)?;
        let index_footer = check_footer(&streams.index, &index_name)?;
        check_footer(&streams.terms, &terms_name)?;

        let mut meta = ByteReader::new(&streams.meta[..meta_footer]);
        check_header(
            &mut meta,
            TERMS_META_CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
            &segment.id,
            &segment.suffix,
        )?;
        let directory = FieldDirectory::read(&mut meta, &infos)?;
        if !meta.is_at_end() {
            return Err(Error::corrupt(format!("{} has trailing bytes before its footer", meta_name)));
        }
        if directory.index_end != streams.index.len() as u64 {
            return Err(Error::corrupt(format!(
                "{} is {} bytes but the directory expects {}",
                index_name,
                streams.index.len(),
                directory.index_end
            )));
        }
        if directory.terms_end != streams.terms.len() as u64 {
            return Err(Error::corrupt(format!(
                "{} is {} bytes but the directory expects {}",
                terms_name,
                streams.terms.len(),
                directory.terms_end
            )));
        }

        check_header(
            &mut ByteReader::new(&streams.terms),
            TERMS_CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
            &segment.id,
            &segment.suffix,
        )?;
        check_header(
            &mut ByteReader::new(&streams.index),
            TERMS_INDEX_CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
            &segment.id,
            &segment.suffix,
        )?;

        // Index start table, located by the offset just before the footer
        let index = &streams.index[..index_footer];
        let table_start = ByteReader::at(index, index.len().saturating_sub(8))?.read_u64()?;
        let mut table = ByteReader::at(index, table_start as usize)?;
        let starts = read_monotonic(&mut table, directory.fields.len(), INDEX_START_BLOCK_SHIFT)?;
        for (summary, &start) in directory.fields.iter().zip(&starts) {
            if summary.index_start_fp != start {
                return Err(Error::corrupt(format!(
                    "index start of field {} is {} in the directory but {} in the index",
                    summary.field_number, summary.index_start_fp, start
                )));
            }
        }

        let mut fields = Vec::with_capacity(directory.fields.len());
        for summary in directory.fields {
            let Some(info) = infos.iter().find(|f| f.number == summary.field_number).cloned() else {
                return Err(Error::corrupt(format!("no descriptor for field {}", summary.field_number)));
            };
            let index = if summary.has_terms() {
                let mut input = ByteReader::at(index, summary.index_start_fp as usize)?;
                let fst = Fst::load(&mut input)?;
                if fst.empty_output() != Some(summary.root_code.as_slice()) {
                    return Err(Error::corrupt(format!("root code of field '{}' does not match its index", info.name)));
                }
                Some(fst)
            } else {
                None
            };
            fields.push(FieldEntry { info, summary, index });
        }

        Ok(Self {
            segment,
            terms: streams.terms,
            fields,
        })
    }

    pub fn segment(&self) -> &SegmentInfo {
        &self.segment
    }

    /// Readers for every field in the directory, in field number order
    pub fn fields(&self) -> impl Iterator<Item = FieldReader<'_>> {
        self.fields.iter().map(|entry| FieldReader {
            terms: &self.terms,
            entry,
        })
    }

    pub fn field(&self, name: &str) -> Result<FieldReader<'_>> {
        self.fields()
            .find(|f| f.info().name == name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))
    }
}

/// One decoded entry of a block
enum BlockEntry {
    Term { suffix: Vec<u8>, state: BlockTermState },
    Block { suffix: Vec<u8>, child_fp: u64 },
}

struct DecodedBlock {
    is_last: bool,
    is_leaf: bool,
    compression: CompressionAlgorithm,
    suffix_bytes: usize,
    entries: Vec<BlockEntry>,
    /// Offset just past the block, where a following floor sibling starts
    end: u64,
}

/// What a block walk collects
#[derive(Default)]
struct Walk {
    want_blocks: bool,
    terms: Vec<(Vec<u8>, BlockTermState)>,
    blocks: Vec<BlockStats>,
}

/// Read access to one field of an open segment
#[derive(Clone, Copy)]
pub struct FieldReader<'a> {
    terms: &'a [u8],
    entry: &'a FieldEntry,
}

impl<'a> FieldReader<'a> {
    pub fn info(&self) -> &'a FieldInfo {
        &self.entry.info
    }

    pub fn summary(&self) -> &'a FieldSummary {
        &self.entry.summary
    }

    /// The field's prefix index; `None` for a field without terms
    pub fn index(&self) -> Option<&'a Fst> {
        self.entry.index.as_ref()
    }

    /// Every term in order, with its decoded state
    pub fn terms<P: PostingsReader>(&self, postings: &mut P) -> Result<Vec<(Vec<u8>, BlockTermState)>> {
        self.prefix_terms(b"", postings)
    }

    /// Every term starting with `prefix`, in order
    pub fn prefix_terms<P: PostingsReader>(
        &self,
        prefix: &[u8],
        postings: &mut P,
    ) -> Result<Vec<(Vec<u8>, BlockTermState)>> {
        let Some(index) = self.index() else {
            return Ok(Vec::new());
        };
        postings.set_field(self.info());

        // All matching terms live below the deepest block whose prefix is a prefix of ours
        let (match_len, code) = index
            .longest_prefix_output(prefix)?
            .ok_or_else(|| Error::corrupt("index has no root output"))?;
        let output = BlockOutput::decode(&code)?;

        let mut walk = Walk::default();
        self.walk(output.fp, &prefix[..match_len], prefix, postings, &mut walk)?;
        Ok(walk.terms)
    }

    /// Exact lookup through the index: one block is decoded at most
    pub fn seek_exact<P: PostingsReader>(&self, term: &[u8], postings: &mut P) -> Result<Option<BlockTermState>> {
        let Some(index) = self.index() else {
            return Ok(None);
        };
        postings.set_field(self.info());

        let (match_len, code) = index
            .longest_prefix_output(term)?
            .ok_or_else(|| Error::corrupt("index has no root output"))?;
        let output = BlockOutput::decode(&code)?;
        let (fp, has_terms) = output.select(term.get(match_len).copied());
        if !has_terms {
            return Ok(None);
        }

        let target = &term[match_len..];
        let block = self.decode_block(fp, postings)?;
        for entry in block.entries {
            if let BlockEntry::Term { suffix, state } = entry {
                if suffix == target {
                    return Ok(Some(state));
                }
            }
        }
        Ok(None)
    }

    /// Shape of every block reachable from the root, in dictionary order
    pub fn block_stats<P: PostingsReader>(&self, postings: &mut P) -> Result<Vec<BlockStats>> {
        let Some(index) = self.index() else {
            return Ok(Vec::new());
        };
        postings.set_field(self.info());
        let output = BlockOutput::decode(&self.summary().root_code)?;
        debug_assert!(index.empty_output().is_some());

        let mut walk = Walk {
            want_blocks: true,
            ..Default::default()
        };
        self.walk(output.fp, b"", b"", postings, &mut walk)?;
        Ok(walk.blocks)
    }

    /// Visit the floor chain starting at `fp` and recurse into sub-blocks
    /// that can hold terms starting with `wanted`
    fn walk<P: PostingsReader>(
        &self,
        fp: u64,
        prefix: &[u8],
        wanted: &[u8],
        postings: &mut P,
        walk: &mut Walk,
    ) -> Result<()> {
        let mut fp = fp;
        let mut sibling = 0;
        loop {
            let block = self.decode_block(fp, postings)?;
            if walk.want_blocks {
                let terms = block.entries.iter().filter(|e| matches!(e, BlockEntry::Term { .. })).count();
                walk.blocks.push(BlockStats {
                    fp,
                    prefix: String::from_utf8_lossy(prefix).into_owned(),
                    entries: block.entries.len(),
                    terms,
                    sub_blocks: block.entries.len() - terms,
                    is_leaf: block.is_leaf,
                    is_floor: sibling > 0 || !block.is_last,
                    is_last: block.is_last,
                    compression: block.compression.name(),
                    suffix_bytes: block.suffix_bytes,
                });
            }

            for entry in block.entries {
                match entry {
                    BlockEntry::Term { suffix, state } => {
                        let mut term = prefix.to_vec();
                        term.extend_from_slice(&suffix);
                        if term.starts_with(wanted) {
                            walk.terms.push((term, state));
                        }
                    }
                    BlockEntry::Block { suffix, child_fp } => {
                        let mut child_prefix = prefix.to_vec();
                        child_prefix.extend_from_slice(&suffix);
                        if child_prefix.starts_with(wanted) || wanted.starts_with(&child_prefix) {
                            self.walk(child_fp, &child_prefix, wanted, postings, walk)?;
                        }
                    }
                }
            }

            if block.is_last {
                return Ok(());
            }
            fp = block.end;
            sibling += 1;
        }
    }

    fn decode_block<P: PostingsReader>(&self, fp: u64, postings: &mut P) -> Result<DecodedBlock> {
        let field = self.info();
        let mut input = ByteReader::at(self.terms, fp as usize)?;

        let header = input.read_vint()?;
        let num_entries = (header >> 1) as usize;
        let is_last = header & 1 != 0;
        if num_entries == 0 {
            return Err(Error::corrupt(format!("empty block at {}", fp)));
        }

        let token = input.read_vlong()?;
        let suffix_len = (token >> 3) as usize;
        let is_leaf = (token >> 2) & 1 != 0;
        let compression = CompressionAlgorithm::from_code((token & 0x3) as u8)?;
        let suffixes = match compression {
            CompressionAlgorithm::None => input.read_bytes(suffix_len)?.to_vec(),
            algorithm => algorithm.decompress(input.read_len_prefixed()?, suffix_len)?,
        };
        let lengths = read_suffix_lengths(&mut input)?;
        let stats_bytes = input.read_len_prefixed()?;
        let meta_bytes = input.read_len_prefixed()?;
        let end = input.position() as u64;

        let mut suffix_in = ByteReader::new(&suffixes);
        let mut lengths_in = ByteReader::new(&lengths);
        let mut stats = StatsReader::new(stats_bytes, field.index_options.has_freqs());
        let mut meta = ByteReader::new(meta_bytes);
        let mut absolute = true;

        let mut entries = Vec::with_capacity(num_entries);
        for _ in 0..num_entries {
            let code = lengths_in.read_vint()?;
            let (len, is_block) = if is_leaf { (code, false) } else { (code >> 1, code & 1 != 0) };
            let suffix = suffix_in.read_bytes(len as usize)?.to_vec();
            if is_block {
                let delta = lengths_in.read_vlong()?;
                let child_fp = fp
                    .checked_sub(delta)
                    .filter(|_| delta > 0)
                    .ok_or_else(|| Error::corrupt(format!("block at {} points to a child at -{}", fp, delta)))?;
                entries.push(BlockEntry::Block { suffix, child_fp });
            } else {
                let (doc_freq, total_term_freq) = stats.next_stats()?;
                let mut state = BlockTermState::new(doc_freq, total_term_freq, Vec::new());
                postings.decode_term(&mut meta, field, &mut state, absolute)?;
                absolute = false;
                entries.push(BlockEntry::Term { suffix, state });
            }
        }

        if !suffix_in.is_at_end() || !lengths_in.is_at_end() || !stats.is_exhausted() || !meta.is_at_end() {
            return Err(Error::corrupt(format!("block at {} has unread bytes", fp)));
        }

        Ok(DecodedBlock {
            is_last,
            is_leaf,
            compression,
            suffix_bytes: suffix_len,
            entries,
            end,
        })
    }
}
