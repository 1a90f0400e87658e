use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use xxhash_rust::xxh3::xxh3_128;

/// Document identifier within a segment
pub type DocId = u32;

/// Extension of the block dictionary stream
pub const TERMS_EXTENSION: &str = "tim";
/// Extension of the FST index stream
pub const TERMS_INDEX_EXTENSION: &str = "tip";
/// Extension of the field-summary stream
pub const TERMS_META_EXTENSION: &str = "tmd";
/// Extension of the JSON field descriptors
pub const FIELD_INFOS_EXTENSION: &str = "fnm.json";

pub const TERMS_CODEC_NAME: &str = "BlockTreeTermsDict";
pub const TERMS_INDEX_CODEC_NAME: &str = "BlockTreeTermsIndex";
pub const TERMS_META_CODEC_NAME: &str = "BlockTreeTermsMeta";

pub const VERSION_START: u32 = 1;
pub const VERSION_CURRENT: u32 = VERSION_START;

pub const CODEC_MAGIC: u32 = 0x3fd7_6c17;
pub const FOOTER_MAGIC: u32 = !CODEC_MAGIC;
/// Checksum algorithm id stored in footers (xxh64)
pub const CHECKSUM_XXH64: u32 = 1;

/// Largest document frequency a term may carry; stats store `doc_freq << 1` in a u32
pub const MAX_DOC_FREQ: u32 = i32::MAX as u32;

pub const DEFAULT_MIN_BLOCK_SIZE: usize = 25;
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 48;

/// Low bits of an encoded block location in the index
pub const OUTPUT_FLAGS_NUM_BITS: u32 = 2;
pub const OUTPUT_FLAG_IS_FLOOR: u64 = 0x1;
pub const OUTPUT_FLAG_HAS_TERMS: u64 = 0x2;

/// Block shift of the monotonic per-field index start table
pub const INDEX_START_BLOCK_SHIFT: u32 = 4;

/// What is indexed for each term of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum IndexOptions {
    Docs = 0,
    #[default]
    DocsAndFreqs = 1,
    DocsAndFreqsAndPositions = 2,
    DocsAndFreqsAndPositionsAndOffsets = 3,
}

impl IndexOptions {
    /// Whether total term frequency is tracked
    pub fn has_freqs(self) -> bool {
        self >= IndexOptions::DocsAndFreqs
    }

    pub fn has_positions(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositions
    }
}

/// Descriptor of one indexed field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    #[serde(default)]
    pub index_options: IndexOptions,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, number: u32, index_options: IndexOptions) -> Self {
        Self {
            name: name.into(),
            number,
            index_options,
        }
    }
}

/// Postings statistics and encoder-private longs for one term
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockTermState {
    pub doc_freq: u32,
    /// Equal to `doc_freq` for fields without frequencies
    pub total_term_freq: u64,
    /// Opaque to the terms dictionary; owned by the postings encoder
    pub longs: Vec<u64>,
}

impl BlockTermState {
    pub fn new(doc_freq: u32, total_term_freq: u64, longs: Vec<u64>) -> Self {
        Self {
            doc_freq,
            total_term_freq,
            longs,
        }
    }

    /// Check the postings contract for a field
    pub fn validate(&self, has_freqs: bool) -> Result<()> {
        if self.doc_freq == 0 {
            return Err(Error::InvalidTermState("doc_freq must be positive".to_string()));
        }
        if self.doc_freq > MAX_DOC_FREQ {
            return Err(Error::InvalidTermState(format!(
                "doc_freq {} exceeds the maximum of {}",
                self.doc_freq, MAX_DOC_FREQ
            )));
        }
        if has_freqs && self.total_term_freq < self.doc_freq as u64 {
            return Err(Error::InvalidTermState(format!(
                "total_term_freq {} is below doc_freq {}",
                self.total_term_freq, self.doc_freq
            )));
        }
        Ok(())
    }
}

/// Block sizing for the terms writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockTreeConfig {
    /// Fewest entries a prefix run needs before it is sealed into a block
    pub min_items_in_block: usize,
    /// Most entries in one physical block before floor splitting
    pub max_items_in_block: usize,
}

impl Default for BlockTreeConfig {
    fn default() -> Self {
        Self {
            min_items_in_block: DEFAULT_MIN_BLOCK_SIZE,
            max_items_in_block: DEFAULT_MAX_BLOCK_SIZE,
        }
    }
}

impl BlockTreeConfig {
    pub fn new(min_items_in_block: usize, max_items_in_block: usize) -> Result<Self> {
        let config = Self {
            min_items_in_block,
            max_items_in_block,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let (min, max) = (self.min_items_in_block, self.max_items_in_block);
        if min <= 1 {
            return Err(Error::invalid_config(format!(
                "min_items_in_block must be >= 2; got {}",
                min
            )));
        }
        if min > max {
            return Err(Error::invalid_config(format!(
                "max_items_in_block must be >= min_items_in_block; got max={} min={}",
                max, min
            )));
        }
        if min - 1 > max / 2 {
            return Err(Error::invalid_config(format!(
                "max_items_in_block must be at least 2*(min_items_in_block-1); got max={} min={}",
                max, min
            )));
        }
        Ok(())
    }
}

/// Identity of the segment being written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub name: String,
    pub id: [u8; 16],
    #[serde(default)]
    pub suffix: String,
}

impl SegmentInfo {
    /// New segment with an id derived from the name and the current time
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let mut seed = name.as_bytes().to_vec();
        seed.extend_from_slice(&nanos.to_le_bytes());
        Self::with_id(name, xxh3_128(&seed).to_le_bytes())
    }

    pub fn with_id(name: impl Into<String>, id: [u8; 16]) -> Self {
        Self {
            name: name.into(),
            id,
            suffix: String::new(),
        }
    }

    /// File name for one of this segment's streams
    pub fn file_name(&self, extension: &str) -> String {
        if self.suffix.is_empty() {
            format!("{}.{}", self.name, extension)
        } else {
            format!("{}_{}.{}", self.name, self.suffix, extension)
        }
    }

    pub fn id_hex(&self) -> String {
        self.id.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Segment metadata stored next to the streams as `<segment>.fnm.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub version: u32,
    pub segment: SegmentInfo,
    pub config: BlockTreeConfig,
    pub fields: Vec<FieldInfo>,
    pub doc_count: u32,
    pub created_at: u64,
}

impl SegmentMeta {
    pub fn new(segment: SegmentInfo, config: BlockTreeConfig, fields: Vec<FieldInfo>, doc_count: u32) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            version: VERSION_CURRENT,
            segment,
            config,
            fields,
            doc_count,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_are_valid() {
        let config = BlockTreeConfig::default();
        assert_eq!(config.min_items_in_block, 25);
        assert_eq!(config.max_items_in_block, 48);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_rejects_bad_sizes() {
        assert!(BlockTreeConfig::new(1, 10).is_err());
        assert!(BlockTreeConfig::new(10, 9).is_err());
        assert!(BlockTreeConfig::new(10, 17).is_err());
        assert!(BlockTreeConfig::new(10, 18).is_ok());
        assert!(BlockTreeConfig::new(2, 2).is_ok());
        assert!(BlockTreeConfig::new(usize::MAX, usize::MAX).is_err());
        assert!(BlockTreeConfig::new(usize::MAX / 2 + 2, usize::MAX).is_err());
    }

    #[test]
    fn test_config_json_fills_missing_fields() {
        let config: BlockTreeConfig = serde_json::from_str(r#"{"max_items_in_block": 64}"#).unwrap();
        assert_eq!(config.min_items_in_block, DEFAULT_MIN_BLOCK_SIZE);
        assert_eq!(config.max_items_in_block, 64);
    }

    #[test]
    fn test_index_options() {
        assert!(!IndexOptions::Docs.has_freqs());
        assert!(IndexOptions::DocsAndFreqs.has_freqs());
        assert!(IndexOptions::DocsAndFreqsAndPositions.has_positions());
    }

    #[test]
    fn test_term_state_validation() {
        assert!(BlockTermState::new(0, 0, vec![]).validate(true).is_err());
        assert!(BlockTermState::new(3, 2, vec![]).validate(true).is_err());
        assert!(BlockTermState::new(3, 2, vec![]).validate(false).is_ok());
        assert!(BlockTermState::new(MAX_DOC_FREQ, MAX_DOC_FREQ as u64, vec![]).validate(true).is_ok());
        assert!(matches!(
            BlockTermState::new(MAX_DOC_FREQ + 1, u64::MAX, vec![]).validate(true),
            Err(Error::InvalidTermState(_))
        ));
    }

    #[test]
    fn test_segment_file_names() {
        let mut segment = SegmentInfo::with_id("_0", [7; 16]);
        assert_eq!(segment.file_name(TERMS_EXTENSION), "_0.tim");
        segment.suffix = "bt".to_string();
        assert_eq!(segment.file_name(TERMS_INDEX_EXTENSION), "_0_bt.tip");
        assert_eq!(segment.id_hex().len(), 32);
    }
}
