//! Stream framing, integrity checks and writer lifecycle.

#[path = "fixtures/utils.rs"]
mod utils;

use blocktree::Error;
use blocktree::index::output::FOOTER_LENGTH;
use blocktree::index::{
    BlockTermState, BlockTreeConfig, BlockTreeReader, BlockTreeTermsWriter, CODEC_MAGIC, DeltaPostingsCodec, FieldInfo,
    IndexOptions, MAX_DOC_FREQ, SegmentStreams, TERMS_EXTENSION, TERMS_INDEX_EXTENSION, TERMS_META_EXTENSION,
};
use tempfile::TempDir;
use utils::*;

fn fields() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs),
        FieldInfo::new("id", 1, IndexOptions::Docs),
    ]
}

fn write_streams() -> SegmentStreams<Vec<u8>> {
    let mut writer = BlockTreeTermsWriter::new(
        SegmentStreams::default(),
        segment(),
        BlockTreeConfig::new(4, 8).unwrap(),
        DeltaPostingsCodec::new(),
    )
    .unwrap();
    for info in fields() {
        let has_freqs = info.index_options.has_freqs();
        writer
            .write_field(
                &info,
                two_letter_terms()
                    .into_iter()
                    .enumerate()
                    .map(|(i, t)| (t, state_for(i, has_freqs))),
            )
            .unwrap();
    }
    writer.into_streams().unwrap()
}

#[test]
fn streams_start_with_codec_magic() {
    let streams = write_streams();
    for stream in [&streams.terms, &streams.index, &streams.meta] {
        assert_eq!(u32::from_le_bytes(stream[..4].try_into().unwrap()), CODEC_MAGIC);
        assert!(stream.len() > FOOTER_LENGTH);
    }
    assert!(BlockTreeReader::from_streams(streams, segment(), fields()).is_ok());
}

#[test]
fn flipped_byte_fails_the_checksum() {
    let clean = write_streams();
    for target in 0..3 {
        let mut streams = clean.clone();
        let stream = match target {
            0 => &mut streams.terms,
            1 => &mut streams.index,
            _ => &mut streams.meta,
        };
        let middle = stream.len() / 2;
        stream[middle] ^= 0x40;
        assert!(
            matches!(
                BlockTreeReader::from_streams(streams, segment(), fields()),
                Err(Error::ChecksumMismatch { .. })
            ),
            "stream {}",
            target
        );
    }
}

#[test]
fn truncated_stream_is_rejected() {
    let mut streams = write_streams();
    streams.terms.truncate(streams.terms.len() - 3);
    assert!(BlockTreeReader::from_streams(streams, segment(), fields()).is_err());
}

#[test]
fn missing_field_descriptor_is_corrupt() {
    let streams = write_streams();
    let only_body = vec![FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs)];
    assert!(matches!(
        BlockTreeReader::from_streams(streams, segment(), only_body),
        Err(Error::Corrupt(_))
    ));
}

#[test]
fn out_of_order_input_is_rejected() {
    let mut writer = BlockTreeTermsWriter::new(
        SegmentStreams::<Vec<u8>>::default(),
        segment(),
        BlockTreeConfig::default(),
        DeltaPostingsCodec::new(),
    )
    .unwrap();
    let result = writer.write_field(
        &fields()[0],
        [(&b"beta"[..], state_for(0, true)), (&b"alpha"[..], state_for(1, true))],
    );
    match result {
        Err(Error::TermOutOfOrder { field, previous, term }) => {
            assert_eq!((field.as_str(), previous.as_str(), term.as_str()), ("body", "beta", "alpha"));
        }
        other => panic!("expected an ordering error, got {:?}", other.map(|s| s.num_terms)),
    }
}

#[test]
fn doc_freq_beyond_i32_is_rejected() {
    let mut writer = BlockTreeTermsWriter::new(
        SegmentStreams::<Vec<u8>>::default(),
        segment(),
        BlockTreeConfig::default(),
        DeltaPostingsCodec::new(),
    )
    .unwrap();
    let huge = BlockTermState::new(2_147_483_653, 2_147_483_653, vec![0]);
    let result = writer.write_field(&fields()[0], [("huge", huge)]);
    assert!(matches!(result, Err(Error::InvalidTermState(_))));

    let mut field = writer.field(&fields()[1]).unwrap();
    field.write(b"max", BlockTermState::new(MAX_DOC_FREQ, MAX_DOC_FREQ as u64, vec![0])).unwrap();
    assert_eq!(field.finish().unwrap().sum_doc_freq, MAX_DOC_FREQ as u64);
}

#[test]
fn lifecycle_rejects_reopened_and_late_fields() {
    let mut writer = BlockTreeTermsWriter::new(
        SegmentStreams::<Vec<u8>>::default(),
        segment(),
        BlockTreeConfig::default(),
        DeltaPostingsCodec::new(),
    )
    .unwrap();
    let [body, id] = <[FieldInfo; 2]>::try_from(fields()).unwrap();
    writer.write_field(&id, [("1", state_for(0, false))]).unwrap();
    assert!(matches!(writer.field(&body), Err(Error::FieldOutOfOrder { previous: 1, current: 0 })));

    writer.close().unwrap();
    writer.close().unwrap();
    assert!(matches!(writer.field(&FieldInfo::new("late", 9, IndexOptions::Docs)), Err(Error::Closed)));
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    for (min, max) in [(1, 4), (5, 4), (10, 17), (usize::MAX, usize::MAX)] {
        assert!(matches!(BlockTreeConfig::new(min, max), Err(Error::InvalidConfig(_))), "{}/{}", min, max);
    }
    assert!(BlockTreeConfig::new(10, 18).is_ok());
}

#[test]
fn file_backed_segment_roundtrips() {
    let dir = TempDir::new().unwrap();
    let mut writer =
        BlockTreeTermsWriter::create(dir.path(), segment(), BlockTreeConfig::default(), DeltaPostingsCodec::new())
            .unwrap();
    for info in fields() {
        let has_freqs = info.index_options.has_freqs();
        let mut field = writer.field(&info).unwrap();
        for (i, term) in two_letter_terms().iter().enumerate() {
            field.write(term, state_for(i, has_freqs)).unwrap();
            field.record_docs([i as u32]);
        }
        field.finish().unwrap();
    }
    writer.close().unwrap();
    drop(writer);

    let reader = BlockTreeReader::open_segment(dir.path(), &segment().name).unwrap();
    let id = reader.field("id").unwrap();
    assert_eq!(id.summary().doc_count, 26 * 26);
    assert_eq!(
        id.seek_exact(b"zz", &mut DeltaPostingsCodec::new()).unwrap(),
        Some(state_for(26 * 26 - 1, false))
    );

    let opened = BlockTreeReader::open(dir.path(), segment(), fields()).unwrap();
    assert_eq!(opened.fields().count(), 2);
}

#[test]
fn abandoned_file_writer_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    {
        let mut writer =
            BlockTreeTermsWriter::create(dir.path(), segment(), BlockTreeConfig::default(), DeltaPostingsCodec::new())
                .unwrap();
        let body = &fields()[0];
        let mut field = writer.field(body).unwrap();
        field.write(b"a", state_for(0, true)).unwrap();
        // an ordering failure aborts the segment
        assert!(field.write(b"a", state_for(1, true)).is_err());
    }
    for extension in [TERMS_EXTENSION, TERMS_INDEX_EXTENSION, TERMS_META_EXTENSION] {
        assert!(!dir.path().join(segment().file_name(extension)).exists(), "{}", extension);
    }
}
