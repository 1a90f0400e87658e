//! Write-then-read tests over whole fields.

#[path = "fixtures/utils.rs"]
mod utils;

use blocktree::index::{BlockTreeConfig, DeltaPostingsCodec, FieldInfo, IndexOptions};
use utils::*;

fn body() -> FieldInfo {
    FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs)
}

fn keys(reader: &blocktree::index::FieldReader<'_>) -> Vec<String> {
    reader
        .index()
        .unwrap()
        .iter()
        .map(|entry| String::from_utf8(entry.unwrap().0).unwrap())
        .collect()
}

#[test]
fn worked_example_tree_shape() {
    let terms: Vec<Vec<u8>> = ["abc", "acc", "acea", "aceb", "acee", "adff"]
        .iter()
        .map(|t| t.as_bytes().to_vec())
        .collect();
    let reader = write_and_open(&[(body(), terms.clone())], BlockTreeConfig::new(2, 4).unwrap());
    let field = reader.field("body").unwrap();

    // Every sealed prefix is an index key; the root maps the empty key
    assert_eq!(keys(&field), vec!["", "a", "ac", "ace"]);

    let blocks = field.block_stats(&mut DeltaPostingsCodec::new()).unwrap();
    let shape: Vec<(&str, usize, usize, bool)> = blocks
        .iter()
        .map(|b| (b.prefix.as_str(), b.terms, b.sub_blocks, b.is_leaf))
        .collect();
    assert_eq!(
        shape,
        vec![
            ("", 0, 1, false),
            ("a", 2, 1, false),
            ("ac", 1, 1, false),
            ("ace", 3, 0, true),
        ]
    );
    assert!(blocks.iter().all(|b| !b.is_floor && b.is_last));

    // Children are written before their parents
    let fps: Vec<u64> = blocks.iter().map(|b| b.fp).collect();
    assert!(fps.windows(2).all(|w| w[0] > w[1]));

    let enumerated: Vec<Vec<u8>> = field
        .terms(&mut DeltaPostingsCodec::new())
        .unwrap()
        .into_iter()
        .map(|(t, _)| t)
        .collect();
    assert_eq!(enumerated, terms);
}

#[test]
fn roundtrip_preserves_terms_stats_and_metadata() {
    let terms = random_terms(7, 3000, 10);
    let config = BlockTreeConfig::new(4, 12).unwrap();
    let reader = write_and_open(&[(body(), terms.clone())], config);
    let field = reader.field("body").unwrap();
    let mut postings = DeltaPostingsCodec::new();

    let read = field.terms(&mut postings).unwrap();
    assert_eq!(read.len(), terms.len());
    for (i, ((term, state), expected)) in read.iter().zip(&terms).enumerate() {
        assert_eq!(term, expected);
        assert_eq!(*state, state_for(i, true), "term #{}", i);
    }

    for (i, term) in terms.iter().enumerate() {
        let state = field.seek_exact(term, &mut postings).unwrap();
        assert_eq!(state, Some(state_for(i, true)), "seek {:?}", term);
    }

    let summary = field.summary();
    assert_eq!(summary.num_terms, terms.len() as u64);
    assert_eq!(summary.min_term, terms[0]);
    assert_eq!(summary.max_term, *terms.last().unwrap());
    let sum_doc_freq: u64 = (0..terms.len()).map(|i| state_for(i, true).doc_freq as u64).sum();
    assert_eq!(summary.sum_doc_freq, sum_doc_freq);
}

#[test]
fn seek_misses_absent_terms() {
    let terms = random_terms(11, 2000, 8);
    let reader = write_and_open(&[(body(), terms.clone())], BlockTreeConfig::new(3, 6).unwrap());
    let field = reader.field("body").unwrap();
    let mut postings = DeltaPostingsCodec::new();

    let mut probes = vec![b"".to_vec(), b"q".to_vec(), vec![0xff; 4]];
    for term in terms.iter().step_by(7) {
        // extending or truncating a present term usually yields an absent one
        let mut longer = term.clone();
        longer.push(b'm');
        probes.push(longer);
        probes.push(term[..term.len() - 1].to_vec());
    }
    for probe in probes {
        let expected = terms.binary_search(&probe).ok().map(|i| state_for(i, true));
        assert_eq!(field.seek_exact(&probe, &mut postings).unwrap(), expected, "{:?}", probe);
    }
}

#[test]
fn prefix_terms_match_filtered_enumeration() {
    let terms = random_terms(23, 2500, 9);
    let reader = write_and_open(&[(body(), terms.clone())], BlockTreeConfig::new(4, 8).unwrap());
    let field = reader.field("body").unwrap();
    let mut postings = DeltaPostingsCodec::new();

    for prefix in [&b"a"[..], b"ab", b"xyz", b"c\xc3", b"\x00", b"dddd", b"q"] {
        let expected: Vec<&Vec<u8>> = terms.iter().filter(|t| t.starts_with(prefix)).collect();
        let found = field.prefix_terms(prefix, &mut postings).unwrap();
        let found: Vec<&Vec<u8>> = found.iter().map(|(t, _)| t).collect();
        assert_eq!(found, expected, "prefix {:?}", prefix);
    }
}

#[test]
fn blocks_respect_the_maximum_size() {
    let config = BlockTreeConfig::new(4, 8).unwrap();
    let reader = write_and_open(&[(body(), two_letter_terms())], config);
    let field = reader.field("body").unwrap();
    let blocks = field.block_stats(&mut DeltaPostingsCodec::new()).unwrap();

    assert!(blocks.iter().all(|b| b.entries <= config.max_items_in_block));
    assert!(blocks.iter().any(|b| b.is_floor));

    // Floor siblings tile each run: every term is enumerated once, in order
    let enumerated: Vec<Vec<u8>> = field
        .terms(&mut DeltaPostingsCodec::new())
        .unwrap()
        .into_iter()
        .map(|(t, _)| t)
        .collect();
    assert_eq!(enumerated, two_letter_terms());
    let total_terms: usize = blocks.iter().map(|b| b.terms).sum();
    assert_eq!(total_terms, 26 * 26);
}

#[test]
fn floor_siblings_are_found_by_lead_byte() {
    // one run of 40 terms under "p" with distinct lead bytes forces floor blocks
    let terms: Vec<Vec<u8>> = (0u8..40).map(|i| vec![b'p', b'0' + i]).collect();
    let reader = write_and_open(&[(body(), terms.clone())], BlockTreeConfig::new(4, 8).unwrap());
    let field = reader.field("body").unwrap();
    let mut postings = DeltaPostingsCodec::new();

    let floor_blocks: Vec<_> = field
        .block_stats(&mut postings)
        .unwrap()
        .into_iter()
        .filter(|b| b.prefix == "p")
        .collect();
    assert!(floor_blocks.len() > 1);
    assert!(floor_blocks.iter().all(|b| b.is_floor));
    assert_eq!(floor_blocks.iter().filter(|b| b.is_last).count(), 1);
    assert_eq!(floor_blocks.iter().map(|b| b.entries).sum::<usize>(), 40);

    for (i, term) in terms.iter().enumerate() {
        assert_eq!(field.seek_exact(term, &mut postings).unwrap(), Some(state_for(i, true)));
    }
    assert_eq!(field.seek_exact(b"p", &mut postings).unwrap(), None);
    assert_eq!(field.seek_exact(&[b'p', b'0' + 41], &mut postings).unwrap(), None);
}

#[test]
fn compressed_suffixes_roundtrip() {
    let mut rng = XorShift::new(99);
    let mut urls: Vec<Vec<u8>> = (0..300)
        .map(|_| {
            let mut url = b"http://example.com/path/".to_vec();
            url.extend(rng.lowercase(8));
            url
        })
        .collect();
    urls.sort();
    urls.dedup();
    let keys: Vec<Vec<u8>> = (0..200)
        .map(|i| format!("key_{:04}_{}", i, "xyz".repeat(10)).into_bytes())
        .collect();

    let url_field = FieldInfo::new("url", 0, IndexOptions::DocsAndFreqs);
    let key_field = FieldInfo::new("key", 1, IndexOptions::Docs);
    let reader = write_and_open(
        &[(url_field, urls.clone()), (key_field, keys.clone())],
        BlockTreeConfig::default(),
    );
    let mut postings = DeltaPostingsCodec::new();

    let url = reader.field("url").unwrap();
    let url_blocks = url.block_stats(&mut postings).unwrap();
    assert!(url_blocks.iter().any(|b| b.compression == "lowercase"));
    let read: Vec<Vec<u8>> = url.terms(&mut postings).unwrap().into_iter().map(|(t, _)| t).collect();
    assert_eq!(read, urls);

    let key = reader.field("key").unwrap();
    let key_blocks = key.block_stats(&mut postings).unwrap();
    assert!(key_blocks.iter().any(|b| b.compression == "lz4"));
    for (i, term) in keys.iter().enumerate() {
        assert_eq!(key.seek_exact(term, &mut postings).unwrap(), Some(state_for(i, false)));
    }
}

#[test]
fn docs_only_field_has_no_total_term_freq() {
    let field = FieldInfo::new("id", 0, IndexOptions::Docs);
    let reader = write_and_open(&[(field, two_letter_terms())], BlockTreeConfig::default());
    let id = reader.field("id").unwrap();
    assert_eq!(id.summary().sum_total_term_freq, None);
    for (term, state) in id.terms(&mut DeltaPostingsCodec::new()).unwrap() {
        assert_eq!(state.total_term_freq, state.doc_freq as u64, "{:?}", term);
    }
}

#[test]
fn several_fields_including_an_empty_one() {
    let fields = vec![
        (FieldInfo::new("a", 0, IndexOptions::DocsAndFreqs), vec![b"x".to_vec(), b"y".to_vec()]),
        (FieldInfo::new("empty", 2, IndexOptions::DocsAndFreqs), Vec::new()),
        (FieldInfo::new("c", 5, IndexOptions::Docs), two_letter_terms()),
    ];
    let reader = write_and_open(&fields, BlockTreeConfig::default());
    let numbers: Vec<u32> = reader.fields().map(|f| f.info().number).collect();
    assert_eq!(numbers, vec![0, 2, 5]);

    let empty = reader.field("empty").unwrap();
    let summary = empty.summary();
    assert_eq!(summary.num_terms, 0);
    assert_eq!((summary.sum_doc_freq, summary.doc_count), (0, 0));
    assert_eq!(summary.sum_total_term_freq, Some(0));
    assert!(summary.root_code.is_empty());
    assert!(empty.index().is_none());
    assert!(empty.terms(&mut DeltaPostingsCodec::new()).unwrap().is_empty());
    assert_eq!(empty.seek_exact(b"x", &mut DeltaPostingsCodec::new()).unwrap(), None);

    let c = reader.field("c").unwrap();
    assert_eq!(c.summary().num_terms, 26 * 26);
    assert_eq!(c.summary().doc_count, 97);
}
