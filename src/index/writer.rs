use crate::error::{Error, Result};
use crate::index::output::IndexOutput;
use crate::index::postings::PostingsWriter;
use crate::index::summary::{FieldDirectory, FieldSummary};
use crate::index::terms_writer::TermsWriter;
use crate::index::types::*;
use crate::utils::encoding::DataOutput;
use crate::utils::packed::MonotonicWriter;
use roaring::RoaringBitmap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The three streams of a segment's terms dictionary
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentStreams<T> {
    /// Block dictionary (`.tim`)
    pub terms: T,
    /// FST prefix index (`.tip`)
    pub index: T,
    /// Field directory (`.tmd`)
    pub meta: T,
}

/// Removes partially written segment files unless disarmed
struct PendingFiles {
    paths: Vec<PathBuf>,
    armed: bool,
}

impl PendingFiles {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingFiles {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for path in &self.paths {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "failed to remove partial segment file");
                }
            }
        }
        warn!(files = self.paths.len(), "terms writer dropped before close; removed partial segment files");
    }
}

/// Block-tree terms dictionary writer for one segment.
///
/// Fields are written one at a time through [`BlockTreeTermsWriter::field`],
/// in strictly increasing field number. [`BlockTreeTermsWriter::close`]
/// writes the field directory and the footers of all three streams.
pub struct BlockTreeTermsWriter<W: Write, P: PostingsWriter> {
    pub(crate) segment: SegmentInfo,
    pub(crate) config: BlockTreeConfig,
    pub(crate) terms_out: IndexOutput<W>,
    pub(crate) index_out: IndexOutput<W>,
    meta_out: IndexOutput<W>,
    pub(crate) postings: P,
    pub(crate) summaries: Vec<FieldSummary>,
    pub(crate) docs_seen: RoaringBitmap,
    field_infos: Vec<FieldInfo>,
    last_field_number: Option<u32>,
    closed: bool,
    /// Set once any stream write fails; nothing written afterwards is trusted
    pub(crate) failed: bool,
    /// Where to persist field descriptors on close (file-backed writers only)
    segment_meta_path: Option<PathBuf>,
    cleanup: Option<PendingFiles>,
}

impl<W: Write, P: PostingsWriter> BlockTreeTermsWriter<W, P> {
    /// Create a writer over arbitrary sinks and write the stream headers
    pub fn new(streams: SegmentStreams<W>, segment: SegmentInfo, config: BlockTreeConfig, postings: P) -> Result<Self> {
        Self::with_cleanup(streams, segment, config, postings, None, None)
    }

    fn with_cleanup(
        streams: SegmentStreams<W>,
        segment: SegmentInfo,
        config: BlockTreeConfig,
        postings: P,
        segment_meta_path: Option<PathBuf>,
        cleanup: Option<PendingFiles>,
    ) -> Result<Self> {
        config.validate()?;

        let mut terms_out = IndexOutput::new(segment.file_name(TERMS_EXTENSION), streams.terms);
        let mut index_out = IndexOutput::new(segment.file_name(TERMS_INDEX_EXTENSION), streams.index);
        let mut meta_out = IndexOutput::new(segment.file_name(TERMS_META_EXTENSION), streams.meta);
        terms_out.write_header(TERMS_CODEC_NAME, VERSION_CURRENT, &segment.id, &segment.suffix)?;
        index_out.write_header(TERMS_INDEX_CODEC_NAME, VERSION_CURRENT, &segment.id, &segment.suffix)?;
        meta_out.write_header(TERMS_META_CODEC_NAME, VERSION_CURRENT, &segment.id, &segment.suffix)?;

        Ok(Self {
            segment,
            config,
            terms_out,
            index_out,
            meta_out,
            postings,
            summaries: Vec::new(),
            docs_seen: RoaringBitmap::new(),
            field_infos: Vec::new(),
            last_field_number: None,
            closed: false,
            failed: false,
            segment_meta_path,
            cleanup,
        })
    }

    pub fn segment(&self) -> &SegmentInfo {
        &self.segment
    }

    pub fn config(&self) -> &BlockTreeConfig {
        &self.config
    }

    /// Descriptors of every field opened so far
    pub fn field_infos(&self) -> &[FieldInfo] {
        &self.field_infos
    }

    /// Summaries of every finished field
    pub fn summaries(&self) -> &[FieldSummary] {
        &self.summaries
    }

    /// Documents recorded across all finished fields
    pub fn doc_count(&self) -> u64 {
        self.docs_seen.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a write error has left the streams incomplete
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Start writing a field.
    ///
    /// A field whose [`TermsWriter`] is dropped without `finish` is left out
    /// of the directory; blocks it already wrote stay unreferenced.
    pub fn field(&mut self, info: &FieldInfo) -> Result<TermsWriter<'_, W, P>> {
        if self.failed {
            return Err(Error::Failed);
        }
        if self.closed {
            return Err(Error::Closed);
        }
        if let Some(previous) = self.last_field_number {
            if info.number <= previous {
                return Err(Error::FieldOutOfOrder {
                    previous,
                    current: info.number,
                });
            }
        }
        self.last_field_number = Some(info.number);
        self.field_infos.push(info.clone());
        self.postings.set_field(info);
        Ok(TermsWriter::new(self, info.clone()))
    }

    /// Write a whole field from a sorted term source. No documents are
    /// recorded, so the field's `doc_count` stays zero; use
    /// [`write_field_with_docs`](Self::write_field_with_docs) when it matters.
    pub fn write_field<I, T>(&mut self, info: &FieldInfo, terms: I) -> Result<FieldSummary>
    where
        I: IntoIterator<Item = (T, BlockTermState)>,
        T: AsRef<[u8]>,
    {
        let mut writer = self.field(info)?;
        for (term, state) in terms {
            writer.write(term.as_ref(), state)?;
        }
        writer.finish()
    }

    /// Write a whole field where every term also names the documents it
    /// occurs in
    pub fn write_field_with_docs<I, T, D>(&mut self, info: &FieldInfo, terms: I) -> Result<FieldSummary>
    where
        I: IntoIterator<Item = (T, BlockTermState, D)>,
        T: AsRef<[u8]>,
        D: IntoIterator<Item = DocId>,
    {
        let mut writer = self.field(info)?;
        for (term, state, docs) in terms {
            writer.write(term.as_ref(), state)?;
            writer.record_docs(docs);
        }
        writer.finish()
    }

    /// Write the field directory and all footers. Calling it again after a
    /// successful close is a no-op; after a failed one it returns [`Error::Failed`].
    pub fn close(&mut self) -> Result<()> {
        if self.failed {
            return Err(Error::Failed);
        }
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Err(e) = self.write_trailers() {
            self.failed = true;
            return Err(e);
        }

        if let Some(cleanup) = self.cleanup.as_mut() {
            cleanup.disarm();
        }

        info!(
            segment = %self.segment.name,
            fields = self.summaries.len(),
            terms = self.summaries.iter().map(|s| s.num_terms).sum::<u64>(),
            terms_bytes = self.terms_out.file_pointer(),
            index_bytes = self.index_out.file_pointer(),
            meta_bytes = self.meta_out.file_pointer(),
            "closed terms dictionary"
        );
        Ok(())
    }

    fn write_trailers(&mut self) -> Result<()> {
        // Per-field index start offsets, then where that table starts
        let table_start = self.index_out.file_pointer();
        let mut starts = MonotonicWriter::new(INDEX_START_BLOCK_SHIFT)?;
        for summary in &self.summaries {
            starts.add(summary.index_start_fp)?;
        }
        self.index_out.write_bytes(&starts.finish())?;
        self.index_out.write_u64(table_start)?;
        self.index_out.write_footer()?;

        self.terms_out.write_footer()?;

        FieldDirectory::write(
            &mut self.meta_out,
            &self.summaries,
            self.index_out.file_pointer(),
            self.terms_out.file_pointer(),
        )?;
        self.meta_out.write_footer()?;

        self.terms_out.flush()?;
        self.index_out.flush()?;
        self.meta_out.flush()?;

        if let Some(path) = &self.segment_meta_path {
            let meta = SegmentMeta::new(
                self.segment.clone(),
                self.config,
                self.field_infos.clone(),
                self.docs_seen.len() as u32,
            );
            let mut file = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut file, &meta).map_err(io::Error::from)?;
            file.flush()?;
        }
        Ok(())
    }

    /// Close and hand back the underlying sinks
    pub fn into_streams(mut self) -> Result<SegmentStreams<W>> {
        self.close()?;
        let Self {
            terms_out,
            index_out,
            meta_out,
            ..
        } = self;
        Ok(SegmentStreams {
            terms: terms_out.into_inner(),
            index: index_out.into_inner(),
            meta: meta_out.into_inner(),
        })
    }
}

impl<P: PostingsWriter> BlockTreeTermsWriter<BufWriter<File>, P> {
    /// Create `<segment>.tim`, `.tip` and `.tmd` under `dir`.
    ///
    /// The files are removed again if the writer is dropped before a
    /// successful [`close`](Self::close).
    pub fn create(dir: &Path, segment: SegmentInfo, config: BlockTreeConfig, postings: P) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(dir)?;

        let terms_path = dir.join(segment.file_name(TERMS_EXTENSION));
        let index_path = dir.join(segment.file_name(TERMS_INDEX_EXTENSION));
        let meta_path = dir.join(segment.file_name(TERMS_META_EXTENSION));
        let segment_meta_path = dir.join(segment.file_name(FIELD_INFOS_EXTENSION));

        let cleanup = PendingFiles {
            paths: vec![
                terms_path.clone(),
                index_path.clone(),
                meta_path.clone(),
                segment_meta_path.clone(),
            ],
            armed: true,
        };

        let streams = SegmentStreams {
            terms: BufWriter::new(File::create(&terms_path)?),
            index: BufWriter::new(File::create(&index_path)?),
            meta: BufWriter::new(File::create(&meta_path)?),
        };

        Self::with_cleanup(
            streams,
            segment,
            config,
            postings,
            Some(segment_meta_path),
            Some(cleanup),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::postings::DeltaPostingsCodec;
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Sink that starts rejecting writes once its shared switch is flipped
    struct FailingSink {
        buf: Vec<u8>,
        fail: Rc<Cell<bool>>,
    }

    impl Write for FailingSink {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            if self.fail.get() {
                return Err(io::Error::other("disk full"));
            }
            self.buf.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            if self.fail.get() {
                return Err(io::Error::other("disk full"));
            }
            Ok(())
        }
    }

    fn failing_writer(fail: &Rc<Cell<bool>>) -> BlockTreeTermsWriter<FailingSink, DeltaPostingsCodec> {
        let sink = || FailingSink {
            buf: Vec::new(),
            fail: Rc::clone(fail),
        };
        BlockTreeTermsWriter::new(
            SegmentStreams {
                terms: sink(),
                index: sink(),
                meta: sink(),
            },
            SegmentInfo::with_id("_0", [1; 16]),
            BlockTreeConfig::default(),
            DeltaPostingsCodec::new(),
        )
        .unwrap()
    }

    fn memory_writer() -> BlockTreeTermsWriter<Vec<u8>, DeltaPostingsCodec> {
        BlockTreeTermsWriter::new(
            SegmentStreams::default(),
            SegmentInfo::with_id("_0", [1; 16]),
            BlockTreeConfig::default(),
            DeltaPostingsCodec::new(),
        )
        .unwrap()
    }

    fn state(doc_freq: u32) -> BlockTermState {
        BlockTermState::new(doc_freq, doc_freq as u64, vec![doc_freq as u64])
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = BlockTreeTermsWriter::new(
            SegmentStreams::<Vec<u8>>::default(),
            SegmentInfo::with_id("_0", [1; 16]),
            BlockTreeConfig {
                min_items_in_block: 1,
                max_items_in_block: 4,
            },
            DeltaPostingsCodec::new(),
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_fields_must_increase() {
        let mut writer = memory_writer();
        let body = FieldInfo::new("body", 3, IndexOptions::DocsAndFreqs);
        writer.write_field(&body, [("a", state(1))]).unwrap();

        let earlier = FieldInfo::new("id", 2, IndexOptions::Docs);
        assert!(matches!(
            writer.field(&earlier),
            Err(Error::FieldOutOfOrder { previous: 3, current: 2 })
        ));
        assert!(writer.field(&body).is_err());
    }

    #[test]
    fn test_closed_writer_rejects_fields_and_close_is_idempotent() {
        let mut writer = memory_writer();
        writer.close().unwrap();
        assert!(writer.is_closed());
        writer.close().unwrap();

        let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
        assert!(matches!(writer.field(&field), Err(Error::Closed)));

        let streams = writer.into_streams().unwrap();
        assert!(!streams.terms.is_empty());
        assert!(!streams.meta.is_empty());
    }

    #[test]
    fn test_failed_close_is_not_reported_as_success() {
        let fail = Rc::new(Cell::new(false));
        let mut writer = failing_writer(&fail);
        let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
        writer.write_field(&field, [("x", state(1))]).unwrap();

        fail.set(true);
        assert!(matches!(writer.close(), Err(Error::Io(_))));
        assert!(writer.is_failed());

        fail.set(false);
        assert!(matches!(writer.close(), Err(Error::Failed)));
        assert!(matches!(writer.field(&FieldInfo::new("id", 1, IndexOptions::Docs)), Err(Error::Failed)));
        assert!(matches!(writer.into_streams(), Err(Error::Failed)));
    }

    #[test]
    fn test_failed_field_poisons_writer() {
        let fail = Rc::new(Cell::new(false));
        let mut writer = failing_writer(&fail);
        let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);

        fail.set(true);
        let terms = (0..100u32).map(|i| (format!("t{:03}", i), state(1)));
        assert!(writer.write_field(&field, terms).is_err());
        assert!(writer.is_failed());

        fail.set(false);
        assert!(matches!(writer.close(), Err(Error::Failed)));
    }

    #[test]
    fn test_write_field_with_docs_counts_documents() {
        let mut writer = memory_writer();
        let body = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
        let summary = writer
            .write_field_with_docs(
                &body,
                [("a", state(2), vec![0, 4]), ("b", state(2), vec![4, 7])],
            )
            .unwrap();
        assert_eq!(summary.doc_count, 3);

        let id = FieldInfo::new("id", 1, IndexOptions::Docs);
        let summary = writer.write_field(&id, [("a", state(1))]).unwrap();
        assert_eq!(summary.doc_count, 0);
    }

    #[test]
    fn test_dropped_file_writer_removes_partial_files() {
        let dir = TempDir::new().unwrap();
        let segment = SegmentInfo::with_id("_1", [2; 16]);
        {
            let mut writer =
                BlockTreeTermsWriter::create(dir.path(), segment.clone(), BlockTreeConfig::default(), DeltaPostingsCodec::new())
                    .unwrap();
            let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
            writer.write_field(&field, [("x", state(1))]).unwrap();
            assert!(dir.path().join(segment.file_name(TERMS_EXTENSION)).exists());
        }
        assert!(!dir.path().join(segment.file_name(TERMS_EXTENSION)).exists());
        assert!(!dir.path().join(segment.file_name(TERMS_INDEX_EXTENSION)).exists());
        assert!(!dir.path().join(segment.file_name(TERMS_META_EXTENSION)).exists());
    }

    #[test]
    fn test_closed_file_writer_keeps_files_and_field_infos() {
        let dir = TempDir::new().unwrap();
        let segment = SegmentInfo::with_id("_2", [5; 16]);
        let mut writer =
            BlockTreeTermsWriter::create(dir.path(), segment.clone(), BlockTreeConfig::default(), DeltaPostingsCodec::new())
                .unwrap();
        let field = FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs);
        writer.write_field(&field, [("x", state(1))]).unwrap();
        writer.close().unwrap();
        drop(writer);

        assert!(dir.path().join(segment.file_name(TERMS_EXTENSION)).exists());
        let json = fs::read_to_string(dir.path().join(segment.file_name(FIELD_INFOS_EXTENSION))).unwrap();
        let meta: SegmentMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(meta.fields, vec![field]);
        assert_eq!(meta.segment.id, [5; 16]);
    }
}
