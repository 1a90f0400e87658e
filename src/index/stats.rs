use crate::index::postings::DeltaPostingsCodec;
use crate::index::reader::{BlockStats, BlockTreeReader, FieldReader};
use crate::index::types::*;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct SegmentStats {
    pub segment: String,
    pub id: String,
    pub files: Vec<FileStats>,
    pub fields: Vec<FieldStats>,
}

#[derive(Debug, Serialize)]
pub struct FileStats {
    pub name: String,
    pub bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct FieldStats {
    pub name: String,
    pub number: u32,
    pub index_options: IndexOptions,
    pub num_terms: u64,
    pub doc_count: u32,
    pub sum_doc_freq: u64,
    pub sum_total_term_freq: Option<u64>,
    pub min_term: String,
    pub max_term: String,
    pub index_keys: usize,
    pub index_bytes: usize,
    pub blocks: usize,
    pub leaf_blocks: usize,
    pub floor_blocks: usize,
    pub max_block_entries: usize,
    pub avg_block_entries: f64,
    /// Block count per suffix compression
    pub compression: BTreeMap<&'static str, usize>,
}

impl FieldStats {
    fn collect(field: &FieldReader<'_>) -> Result<Self> {
        let info = field.info();
        let summary = field.summary();
        let blocks: Vec<BlockStats> = field
            .block_stats(&mut DeltaPostingsCodec::new())
            .with_context(|| format!("Failed to walk blocks of field '{}'", info.name))?;

        let mut compression = BTreeMap::new();
        for block in &blocks {
            *compression.entry(block.compression).or_insert(0) += 1;
        }
        let total_entries: usize = blocks.iter().map(|b| b.entries).sum();

        Ok(Self {
            name: info.name.clone(),
            number: info.number,
            index_options: info.index_options,
            num_terms: summary.num_terms,
            doc_count: summary.doc_count,
            sum_doc_freq: summary.sum_doc_freq,
            sum_total_term_freq: summary.sum_total_term_freq,
            min_term: String::from_utf8_lossy(&summary.min_term).into_owned(),
            max_term: String::from_utf8_lossy(&summary.max_term).into_owned(),
            index_keys: field.index().map_or(0, |fst| fst.len()),
            index_bytes: field.index().map_or(0, |fst| fst.size_in_bytes()),
            leaf_blocks: blocks.iter().filter(|b| b.is_leaf).count(),
            floor_blocks: blocks.iter().filter(|b| b.is_floor).count(),
            max_block_entries: blocks.iter().map(|b| b.entries).max().unwrap_or(0),
            avg_block_entries: if blocks.is_empty() {
                0.0
            } else {
                total_entries as f64 / blocks.len() as f64
            },
            blocks: blocks.len(),
            compression,
        })
    }
}

/// Gather statistics for a segment written under `dir`
pub fn collect_stats(dir: &Path, segment: &str) -> Result<SegmentStats> {
    let reader = BlockTreeReader::open_segment(dir, segment)
        .with_context(|| format!("Failed to open segment {} in {}", segment, dir.display()))?;
    let info = reader.segment();

    let mut files = Vec::new();
    for extension in [
        TERMS_EXTENSION,
        TERMS_INDEX_EXTENSION,
        TERMS_META_EXTENSION,
        FIELD_INFOS_EXTENSION,
        crate::index::build::POSTINGS_EXTENSION,
    ] {
        let name = info.file_name(extension);
        if let Ok(metadata) = std::fs::metadata(dir.join(&name)) {
            files.push(FileStats {
                name,
                bytes: metadata.len(),
            });
        }
    }

    let fields = reader
        .fields()
        .map(|field| FieldStats::collect(&field))
        .collect::<Result<Vec<_>>>()?;

    Ok(SegmentStats {
        segment: info.name.clone(),
        id: info.id_hex(),
        files,
        fields,
    })
}

/// Display segment statistics
pub fn show_stats(dir: &Path, segment: &str, json: bool) -> Result<()> {
    let stats = collect_stats(dir, segment)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Segment Statistics");
    println!("==================");
    println!();
    println!("Segment:          {}", stats.segment);
    println!("Segment id:       {}", stats.id);
    println!("Location:         {}", dir.display());
    println!();
    println!("Files:");
    for file in &stats.files {
        println!("  {:20} {}", file.name, format_size(file.bytes));
    }

    for field in &stats.fields {
        println!();
        println!("Field '{}' (#{}, {:?})", field.name, field.number, field.index_options);
        println!("  Terms:          {}", field.num_terms);
        println!("  Documents:      {}", field.doc_count);
        println!("  Sum doc freq:   {}", field.sum_doc_freq);
        if let Some(sum_total_term_freq) = field.sum_total_term_freq {
            println!("  Sum term freq:  {}", sum_total_term_freq);
        }
        if field.num_terms == 0 {
            continue;
        }
        println!("  Term range:     {:?} .. {:?}", field.min_term, field.max_term);
        println!(
            "  Index:          {} prefixes, {}",
            field.index_keys,
            format_size(field.index_bytes as u64)
        );
        println!(
            "  Blocks:         {} ({} leaf, {} floor)",
            field.blocks, field.leaf_blocks, field.floor_blocks
        );
        println!(
            "  Entries/block:  {:.1} avg, {} max",
            field.avg_block_entries, field.max_block_entries
        );
        let compression: Vec<String> = field
            .compression
            .iter()
            .map(|(name, count)| format!("{} {}", count, name))
            .collect();
        println!("  Compression:    {}", compression.join(", "));
    }

    Ok(())
}

/// Format byte size to human readable
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
