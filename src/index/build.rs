//! Build a segment from a plain-text term listing.
//!
//! Each non-empty line is `field<TAB>term<TAB>postings`, where postings is a
//! comma-separated list of `doc` or `doc:freq`. Lines starting with `#` are
//! comments. Terms are raw bytes; the same term may appear on several lines
//! and its postings are merged. A field tracks frequencies if any of its
//! postings carries one.
//!
//! Besides the three terms dictionary streams, the build writes
//! `<segment>.doc` holding each term's document list. The single long stored
//! per term in the dictionary is that term's offset in the `.doc` stream.

use crate::index::output::{IndexOutput, check_footer, check_header};
use crate::index::postings::DeltaPostingsCodec;
use crate::index::types::*;
use crate::index::writer::BlockTreeTermsWriter;
use crate::utils::encoding::{ByteReader, DataOutput};
use crate::utils::progress;
use anyhow::{Context, Result, bail};
use memchr::{memchr, memchr_iter};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const POSTINGS_EXTENSION: &str = "doc";
pub const POSTINGS_CODEC_NAME: &str = "BlockTreePostings";

/// Documents of one term: doc id to frequency
type DocFreqs = BTreeMap<DocId, u32>;

#[derive(Debug, Default)]
struct FieldPostings {
    has_freqs: bool,
    terms: BTreeMap<Vec<u8>, DocFreqs>,
}

/// Parsed term listing, fields and terms in byte order
#[derive(Debug, Default)]
pub struct Listing {
    fields: BTreeMap<String, FieldPostings>,
    lines: usize,
}

impl Listing {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("Failed to read listing {}", path.display()))?;
        Self::parse(&bytes).with_context(|| format!("Invalid listing {}", path.display()))
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut listing = Listing::default();
        let mut start = 0;
        let ends = memchr_iter(b'\n', bytes).chain(std::iter::once(bytes.len()));
        for (line_no, end) in ends.enumerate() {
            if start > bytes.len() {
                break;
            }
            let mut line = &bytes[start..end];
            start = end + 1;
            if let Some((&b'\r', rest)) = line.split_last() {
                line = rest;
            }
            if line.is_empty() || line[0] == b'#' {
                continue;
            }
            listing
                .add_line(line)
                .with_context(|| format!("line {}", line_no + 1))?;
        }
        Ok(listing)
    }

    fn add_line(&mut self, line: &[u8]) -> Result<()> {
        let Some(first_tab) = memchr(b'\t', line) else {
            bail!("expected field<TAB>term<TAB>postings");
        };
        let field = std::str::from_utf8(&line[..first_tab]).context("field name is not UTF-8")?;
        if field.is_empty() {
            bail!("empty field name");
        }
        let rest = &line[first_tab + 1..];
        let Some(second_tab) = memchr(b'\t', rest) else {
            bail!("missing postings after term");
        };
        let term = &rest[..second_tab];
        let postings = std::str::from_utf8(&rest[second_tab + 1..]).context("postings are not UTF-8")?;

        let entry = self.fields.entry(field.to_string()).or_default();
        let docs = entry.terms.entry(term.to_vec()).or_default();
        for posting in postings.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (doc, freq) = match posting.split_once(':') {
                Some((doc, freq)) => {
                    entry.has_freqs = true;
                    let freq: u32 = freq.parse().with_context(|| format!("bad frequency in '{}'", posting))?;
                    if freq == 0 {
                        bail!("frequency must be positive in '{}'", posting);
                    }
                    (doc, freq)
                }
                None => (posting, 1),
            };
            let doc: DocId = doc.parse().with_context(|| format!("bad document id in '{}'", posting))?;
            *docs.entry(doc).or_insert(0) += freq;
        }
        if docs.is_empty() {
            bail!("term '{}' has no documents", String::from_utf8_lossy(term));
        }
        self.lines += 1;
        Ok(())
    }

    /// Field descriptors, numbered in name order
    pub fn field_infos(&self) -> Vec<FieldInfo> {
        self.fields
            .iter()
            .enumerate()
            .map(|(number, (name, postings))| {
                let options = if postings.has_freqs {
                    IndexOptions::DocsAndFreqs
                } else {
                    IndexOptions::Docs
                };
                FieldInfo::new(name.clone(), number as u32, options)
            })
            .collect()
    }

    pub fn num_terms(&self) -> usize {
        self.fields.values().map(|f| f.terms.len()).sum()
    }

    pub fn num_lines(&self) -> usize {
        self.lines
    }
}

/// Encoded document lists of one field, offsets relative to `bytes`
struct EncodedField {
    bytes: Vec<u8>,
    terms: Vec<(Vec<u8>, BlockTermState, Vec<DocId>)>,
}

fn encode_field(postings: &FieldPostings) -> EncodedField {
    let mut bytes = Vec::new();
    let mut terms = Vec::with_capacity(postings.terms.len());
    for (term, docs) in &postings.terms {
        let offset = bytes.len() as u64;
        let _ = bytes.write_vint(docs.len() as u32);
        let mut last = 0;
        let mut total_term_freq = 0u64;
        for (&doc, &freq) in docs {
            let delta = doc - last;
            last = doc;
            total_term_freq += freq as u64;
            if postings.has_freqs {
                let _ = bytes.write_vint((delta << 1) | (freq == 1) as u32);
                if freq != 1 {
                    let _ = bytes.write_vint(freq);
                }
            } else {
                let _ = bytes.write_vint(delta);
            }
        }
        let state = BlockTermState::new(docs.len() as u32, total_term_freq, vec![offset]);
        terms.push((term.clone(), state, docs.keys().copied().collect()));
    }
    EncodedField { bytes, terms }
}

/// Read one term's document list from a `.doc` stream
pub fn read_postings(data: &[u8], offset: u64, has_freqs: bool) -> crate::error::Result<Vec<(DocId, u32)>> {
    let mut input = ByteReader::at(data, offset as usize)?;
    let count = input.read_vint()? as usize;
    let mut docs = Vec::with_capacity(count.min(input.remaining()));
    let mut doc = 0;
    for _ in 0..count {
        if has_freqs {
            let code = input.read_vint()?;
            doc += code >> 1;
            let freq = if code & 1 != 0 { 1 } else { input.read_vint()? };
            docs.push((doc, freq));
        } else {
            doc += input.read_vint()?;
            docs.push((doc, 1));
        }
    }
    Ok(docs)
}

/// Open a `.doc` stream and return its verified bytes
pub fn load_postings(dir: &Path, segment: &SegmentInfo) -> Result<Vec<u8>> {
    let path = dir.join(segment.file_name(POSTINGS_EXTENSION));
    let data = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path.display().to_string();
    check_footer(&data, &name)?;
    check_header(
        &mut ByteReader::new(&data),
        POSTINGS_CODEC_NAME,
        VERSION_START,
        VERSION_CURRENT,
        &segment.id,
        &segment.suffix,
    )?;
    Ok(data)
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub segment: String,
    pub config: BlockTreeConfig,
    pub silent: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            segment: "_0".to_string(),
            config: BlockTreeConfig::default(),
            silent: true,
        }
    }
}

/// What a build produced
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub segment: SegmentInfo,
    pub fields: usize,
    pub terms: u64,
    pub docs: u64,
}

/// Write a segment for `listing` into `out_dir`
pub fn build_segment(listing: &Listing, out_dir: &Path, options: &BuildOptions) -> Result<BuildReport> {
    options.config.validate().context("Invalid block configuration")?;
    fs::create_dir_all(out_dir).with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let segment = SegmentInfo::new(options.segment.clone());
    let infos = listing.field_infos();

    // Fields encode independently; offsets are rebased once concatenated
    let spinner = (!options.silent).then(|| progress::spinner("Encoding postings..."));
    let encoded: Vec<EncodedField> = listing
        .fields
        .par_iter()
        .map(|(_, postings)| encode_field(postings))
        .collect();
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let mut postings_out = IndexOutput::new(segment.file_name(POSTINGS_EXTENSION), Vec::new());
    postings_out.write_header(POSTINGS_CODEC_NAME, VERSION_CURRENT, &segment.id, &segment.suffix)?;

    let mut writer = BlockTreeTermsWriter::create(out_dir, segment.clone(), options.config, DeltaPostingsCodec::new())
        .context("Failed to create terms dictionary")?;

    let bar = (!options.silent).then(|| progress::bar(infos.len() as u64, "fields"));
    for (info, field) in infos.iter().zip(&encoded) {
        let base = postings_out.file_pointer();
        let mut terms = writer.field(info)?;
        for (term, state, docs) in &field.terms {
            let mut state = state.clone();
            state.longs[0] += base;
            terms.write(term, state)?;
            terms.record_docs(docs.iter().copied());
        }
        terms.finish()?;
        postings_out.write_bytes(&field.bytes)?;
        if let Some(bar) = &bar {
            bar.inc(1);
        }
    }
    writer.close().context("Failed to close terms dictionary")?;
    if let Some(bar) = bar {
        bar.finish_with_message("fields written");
    }

    postings_out.write_footer()?;
    let path = out_dir.join(segment.file_name(POSTINGS_EXTENSION));
    fs::write(&path, postings_out.into_inner()).with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(BuildReport {
        segment,
        fields: writer.summaries().len(),
        terms: writer.summaries().iter().map(|s| s.num_terms).sum(),
        docs: writer.doc_count(),
    })
}

/// Parse `listing_path` and build a segment from it, reporting like the CLI
pub fn build_from_file(listing_path: &Path, out_dir: &Path, options: &BuildOptions) -> Result<BuildReport> {
    let listing = Listing::read(listing_path)?;
    if !options.silent {
        println!(
            "Read {} lines: {} fields, {} distinct terms",
            listing.num_lines(),
            listing.fields.len(),
            listing.num_terms()
        );
    }
    let report = build_segment(&listing, out_dir, options)?;
    if !options.silent {
        println!(
            "Segment {} written to {} ({} fields, {} terms, {} documents)",
            report.segment.name,
            out_dir.display(),
            report.fields,
            report.terms,
            report.docs
        );
    }
    Ok(report)
}
