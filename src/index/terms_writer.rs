//! Per-field writer that turns a sorted term stream into nested blocks.
//!
//! The writer keeps a stack of pending entries plus, for every prefix length
//! of the previous term, where the run sharing that prefix starts. When a new
//! term leaves a prefix behind, the run is sealed into one or more blocks and
//! replaced on the stack by a single block entry carrying its index.

use crate::error::{Error, Result};
use crate::index::block::{plan_blocks, write_block};
use crate::index::pending::{PendingBlock, PendingEntry, PendingTerm, compile_index};
use crate::index::postings::PostingsWriter;
use crate::index::summary::FieldSummary;
use crate::index::types::{BlockTermState, DocId, FieldInfo};
use crate::index::writer::BlockTreeTermsWriter;
use crate::utils::encoding::shared_prefix_len;
use roaring::RoaringBitmap;
use std::io::Write;
use tracing::{info, trace};

pub struct TermsWriter<'a, W: Write, P: PostingsWriter> {
    writer: &'a mut BlockTreeTermsWriter<W, P>,
    field: FieldInfo,
    pending: Vec<PendingEntry>,
    /// `prefix_starts[i]`: stack position where the run sharing the first
    /// `i + 1` bytes of `last_term` begins
    prefix_starts: Vec<usize>,
    last_term: Vec<u8>,
    min_term: Option<Vec<u8>>,
    num_terms: u64,
    sum_doc_freq: u64,
    sum_total_term_freq: u64,
    docs_seen: RoaringBitmap,
}

impl<'a, W: Write, P: PostingsWriter> TermsWriter<'a, W, P> {
    pub(crate) fn new(writer: &'a mut BlockTreeTermsWriter<W, P>, field: FieldInfo) -> Self {
        Self {
            writer,
            field,
            pending: Vec::new(),
            prefix_starts: Vec::new(),
            last_term: Vec::new(),
            min_term: None,
            num_terms: 0,
            sum_doc_freq: 0,
            sum_total_term_freq: 0,
            docs_seen: RoaringBitmap::new(),
        }
    }

    pub fn field(&self) -> &FieldInfo {
        &self.field
    }

    pub fn num_terms(&self) -> u64 {
        self.num_terms
    }

    /// Accept the next term. Terms must arrive in strictly increasing
    /// byte order.
    pub fn write(&mut self, term: &[u8], mut state: BlockTermState) -> Result<()> {
        if self.writer.failed {
            return Err(Error::Failed);
        }
        if self.num_terms > 0 && term <= self.last_term.as_slice() {
            return Err(Error::TermOutOfOrder {
                field: self.field.name.clone(),
                previous: String::from_utf8_lossy(&self.last_term).into_owned(),
                term: String::from_utf8_lossy(term).into_owned(),
            });
        }

        let has_freqs = self.field.index_options.has_freqs();
        if !has_freqs {
            state.total_term_freq = state.doc_freq as u64;
        }
        state.validate(has_freqs)?;

        if let Err(e) = self.push_term(term) {
            self.writer.failed = true;
            return Err(e);
        }

        trace!(
            field = %self.field.name,
            term = %String::from_utf8_lossy(term),
            doc_freq = state.doc_freq,
            pending = self.pending.len() + 1,
            "push term"
        );

        self.sum_doc_freq += state.doc_freq as u64;
        self.sum_total_term_freq += state.total_term_freq;
        self.num_terms += 1;
        if self.min_term.is_none() {
            self.min_term = Some(term.to_vec());
        }
        self.pending.push(PendingEntry::Term(PendingTerm {
            term: term.to_vec(),
            state,
        }));
        Ok(())
    }

    /// Record documents that contain at least one term of this field
    pub fn record_docs(&mut self, docs: impl IntoIterator<Item = DocId>) {
        self.docs_seen.extend(docs);
    }

    /// Seal every prefix run of the previous term that `term` does not
    /// continue, then start tracking the runs of `term`.
    fn push_term(&mut self, term: &[u8]) -> Result<()> {
        let prefix_len = shared_prefix_len(&self.last_term, term);

        // Close the longest abandoned prefixes first
        for i in (prefix_len..self.last_term.len()).rev() {
            let prefix_top_size = self.pending.len() - self.prefix_starts[i];
            if prefix_top_size >= self.writer.config.min_items_in_block {
                self.write_blocks(i + 1, prefix_top_size)?;
            }
        }

        if self.prefix_starts.len() < term.len() {
            self.prefix_starts.resize(term.len(), 0);
        }
        for start in &mut self.prefix_starts[prefix_len..term.len()] {
            *start = self.pending.len();
        }

        self.last_term.clear();
        self.last_term.extend_from_slice(term);
        Ok(())
    }

    /// Replace the top `count` stack entries, all sharing the first
    /// `prefix_len` bytes of the previous term, with one block entry.
    fn write_blocks(&mut self, prefix_len: usize, count: usize) -> Result<()> {
        assert!(prefix_len > 0 || count == self.pending.len());
        assert!(count > 0 && count <= self.pending.len());

        let prefix = self.last_term[..prefix_len].to_vec();
        let start = self.pending.len() - count;
        let entries: Vec<PendingEntry> = self.pending.drain(start..).collect();
        let plans = plan_blocks(
            prefix_len,
            &entries,
            self.writer.config.min_items_in_block,
            self.writer.config.max_items_in_block,
        );

        let writer = &mut *self.writer;
        let last = plans.len() - 1;
        let mut remaining = entries.into_iter();
        let mut written = Vec::with_capacity(plans.len());
        for (i, plan) in plans.iter().enumerate() {
            let group: Vec<PendingEntry> = remaining.by_ref().take(plan.len()).collect();
            written.push(write_block(
                &mut writer.terms_out,
                &mut writer.postings,
                &self.field,
                &prefix,
                plan,
                group,
                i == last,
            )?);
        }
        debug_assert!(remaining.next().is_none());

        let block: PendingBlock = compile_index(written)?;
        self.pending.push(PendingEntry::Block(block));
        Ok(())
    }

    /// Seal the remaining entries into the root block, save the field's
    /// index and register its summary with the segment writer.
    pub fn finish(mut self) -> Result<FieldSummary> {
        if self.writer.failed {
            return Err(Error::Failed);
        }
        let summary = match self.seal() {
            Ok(summary) => summary,
            Err(e) => {
                self.writer.failed = true;
                return Err(e);
            }
        };

        info!(
            field = %self.field.name,
            terms = summary.num_terms,
            docs = summary.doc_count,
            sum_doc_freq = summary.sum_doc_freq,
            index_start = summary.index_start_fp,
            "finished field"
        );

        self.writer.docs_seen |= &self.docs_seen;
        self.writer.summaries.push(summary.clone());
        Ok(summary)
    }

    fn seal(&mut self) -> Result<FieldSummary> {
        let has_freqs = self.field.index_options.has_freqs();

        Ok(if self.num_terms > 0 {
            let max_term = self.last_term.clone();

            // An empty term closes every open prefix; the second push is a no-op
            self.push_term(&[])?;
            self.push_term(&[])?;
            let count = self.pending.len();
            self.write_blocks(0, count)?;

            let root = match self.pending.pop() {
                Some(PendingEntry::Block(root)) if self.pending.is_empty() => root,
                _ => unreachable!("sealing the root leaves exactly one block entry"),
            };
            assert!(root.prefix.is_empty());
            let Some(root_code) = root.index.empty_output().map(<[u8]>::to_vec) else {
                return Err(Error::fst("root index has no output for the empty prefix"));
            };

            let index_start_fp = self.writer.index_out.file_pointer();
            root.index.save(&mut self.writer.index_out)?;

            FieldSummary {
                field_number: self.field.number,
                num_terms: self.num_terms,
                root_code,
                sum_total_term_freq: has_freqs.then_some(self.sum_total_term_freq),
                sum_doc_freq: self.sum_doc_freq,
                doc_count: self.docs_seen.len() as u32,
                min_term: self.min_term.take().unwrap_or_default(),
                max_term,
                index_start_fp,
            }
        } else {
            debug_assert!(self.docs_seen.is_empty());
            FieldSummary::empty(self.field.number, has_freqs, self.writer.index_out.file_pointer())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fst::Fst;
    use crate::index::postings::DeltaPostingsCodec;
    use crate::index::types::{BlockTreeConfig, IndexOptions, SegmentInfo};
    use crate::index::writer::SegmentStreams;

    fn writer(min: usize, max: usize) -> BlockTreeTermsWriter<Vec<u8>, DeltaPostingsCodec> {
        BlockTreeTermsWriter::new(
            SegmentStreams::default(),
            SegmentInfo::with_id("_t", [9; 16]),
            BlockTreeConfig::new(min, max).unwrap(),
            DeltaPostingsCodec::new(),
        )
        .unwrap()
    }

    fn state(doc_freq: u32, total_term_freq: u64) -> BlockTermState {
        BlockTermState::new(doc_freq, total_term_freq, vec![doc_freq as u64])
    }

    fn keys(index: &Fst) -> Vec<String> {
        index
            .iter()
            .map(|entry| String::from_utf8(entry.unwrap().0).unwrap())
            .collect()
    }

    #[test]
    fn test_out_of_order_term_rejected() {
        let mut segment = writer(2, 4);
        let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
        let mut terms = segment.field(&field).unwrap();
        terms.write(b"b", state(1, 1)).unwrap();
        assert!(matches!(
            terms.write(b"a", state(1, 1)),
            Err(Error::TermOutOfOrder { .. })
        ));
        assert!(matches!(
            terms.write(b"b", state(1, 1)),
            Err(Error::TermOutOfOrder { .. })
        ));
    }

    #[test]
    fn test_invalid_state_rejected() {
        let mut segment = writer(2, 4);
        let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
        let mut terms = segment.field(&field).unwrap();
        assert!(matches!(
            terms.write(b"a", state(3, 2)),
            Err(Error::InvalidTermState(_))
        ));
    }

    #[test]
    fn test_prefix_runs_are_sealed_into_sub_blocks() {
        let mut segment = writer(2, 4);
        let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
        let mut terms = segment.field(&field).unwrap();
        for term in ["abc", "acc", "acea", "aceb", "acee", "adff"] {
            terms.write(term.as_bytes(), state(1, 1)).unwrap();
        }
        terms.record_docs([0, 1, 2]);

        // "adff" leaves "ace" and then "ac" behind; both runs reach the minimum
        assert_eq!(terms.pending.len(), 3);
        assert!(terms.pending[0].is_term() && terms.pending[2].is_term());
        let PendingEntry::Block(ac) = &terms.pending[1] else {
            panic!("expected a sealed block for 'ac'");
        };
        assert_eq!(ac.prefix, b"ac");
        assert!(!ac.is_floor);
        assert_eq!(keys(&ac.index), vec!["ac", "ace"]);

        let summary = terms.finish().unwrap();
        assert_eq!(summary.num_terms, 6);
        assert_eq!(summary.sum_doc_freq, 6);
        assert_eq!(summary.sum_total_term_freq, Some(6));
        assert_eq!(summary.doc_count, 3);
        assert_eq!(summary.min_term, b"abc");
        assert_eq!(summary.max_term, b"adff");
        assert!(!summary.root_code.is_empty());
        assert_eq!(segment.summaries(), &[summary]);
    }

    #[test]
    fn test_docs_only_field_normalizes_total_term_freq() {
        let mut segment = writer(2, 4);
        let field = FieldInfo::new("id", 0, IndexOptions::Docs);
        let summary = segment
            .write_field(&field, [("x", state(2, 0)), ("y", state(1, 0))])
            .unwrap();
        assert_eq!(summary.sum_total_term_freq, None);
        assert_eq!(summary.sum_doc_freq, 3);
    }

    #[test]
    fn test_field_without_terms() {
        let mut segment = writer(2, 4);
        let field = FieldInfo::new("empty", 0, IndexOptions::DocsAndFreqs);
        let summary = segment.field(&field).unwrap().finish().unwrap();
        assert_eq!(summary.num_terms, 0);
        assert!(summary.root_code.is_empty());
        assert_eq!(summary.sum_total_term_freq, Some(0));
    }

    #[test]
    fn test_single_empty_term() {
        let mut segment = writer(2, 4);
        let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
        let summary = segment.write_field(&field, [("", state(1, 1))]).unwrap();
        assert_eq!(summary.num_terms, 1);
        assert!(summary.min_term.is_empty() && summary.max_term.is_empty());
        assert!(!summary.root_code.is_empty());
    }
}
