//! Append-only output streams with codec headers and checksummed footers.
//!
//! Every stream of a segment starts with a header
//!
//! ```text
//! u32 CODEC_MAGIC | vint len + codec name | u32 version | 16-byte segment id | vint len + suffix
//! ```
//!
//! and ends with a fixed 16-byte footer
//!
//! ```text
//! u32 FOOTER_MAGIC | u32 algorithm id | u64 xxh64 of every preceding byte
//! ```

use crate::error::{Error, Result};
use crate::index::types::{CHECKSUM_XXH64, CODEC_MAGIC, FOOTER_MAGIC};
use crate::utils::encoding::{ByteReader, DataOutput};
use std::io::{self, Write};
use xxhash_rust::xxh64::{Xxh64, xxh64};

pub const FOOTER_LENGTH: usize = 16;

/// A sink that tracks its file pointer and a running checksum
pub struct IndexOutput<W: Write> {
    name: String,
    inner: W,
    hasher: Xxh64,
    file_pointer: u64,
}

impl<W: Write> IndexOutput<W> {
    pub fn new(name: impl Into<String>, inner: W) -> Self {
        Self {
            name: name.into(),
            inner,
            hasher: Xxh64::new(0),
            file_pointer: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of bytes written so far
    pub fn file_pointer(&self) -> u64 {
        self.file_pointer
    }

    /// Checksum of every byte written so far
    pub fn checksum(&self) -> u64 {
        self.hasher.digest()
    }

    pub fn write_header(&mut self, codec: &str, version: u32, segment_id: &[u8; 16], suffix: &str) -> io::Result<()> {
        self.write_u32(CODEC_MAGIC)?;
        self.write_len_prefixed(codec.as_bytes())?;
        self.write_u32(version)?;
        self.write_bytes(segment_id)?;
        self.write_len_prefixed(suffix.as_bytes())
    }

    pub fn write_footer(&mut self) -> io::Result<()> {
        self.write_u32(FOOTER_MAGIC)?;
        self.write_u32(CHECKSUM_XXH64)?;
        let checksum = self.checksum();
        self.write_u64(checksum)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> DataOutput for IndexOutput<W> {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.hasher.update(bytes);
        self.file_pointer += bytes.len() as u64;
        Ok(())
    }
}

/// Read and verify a header written by [`IndexOutput::write_header`]; returns the version
pub fn check_header(
    input: &mut ByteReader<'_>,
    codec: &str,
    min_version: u32,
    max_version: u32,
    segment_id: &[u8; 16],
    suffix: &str,
) -> Result<u32> {
    let magic = input.read_u32()?;
    if magic != CODEC_MAGIC {
        return Err(Error::corrupt(format!(
            "codec header mismatch: expected {:#x}, got {:#x}",
            CODEC_MAGIC, magic
        )));
    }
    let actual_codec = input.read_len_prefixed()?;
    if actual_codec != codec.as_bytes() {
        return Err(Error::corrupt(format!(
            "codec mismatch: expected {}, got {}",
            codec,
            String::from_utf8_lossy(actual_codec)
        )));
    }
    let version = input.read_u32()?;
    if version < min_version || version > max_version {
        return Err(Error::corrupt(format!(
            "unsupported {} version {} (supported {}-{})",
            codec, version, min_version, max_version
        )));
    }
    let id = input.read_bytes(16)?;
    if id != segment_id {
        return Err(Error::corrupt(format!("segment id mismatch in {}", codec)));
    }
    let actual_suffix = input.read_len_prefixed()?;
    if actual_suffix != suffix.as_bytes() {
        return Err(Error::corrupt(format!(
            "segment suffix mismatch in {}: expected {:?}, got {:?}",
            codec,
            suffix,
            String::from_utf8_lossy(actual_suffix)
        )));
    }
    Ok(version)
}

/// Verify the footer of a complete stream; returns the offset where the footer starts
pub fn check_footer(data: &[u8], stream: &str) -> Result<usize> {
    if data.len() < FOOTER_LENGTH {
        return Err(Error::corrupt(format!(
            "{} is too short for a footer ({} bytes)",
            stream,
            data.len()
        )));
    }
    let footer_start = data.len() - FOOTER_LENGTH;
    let mut footer = ByteReader::at(data, footer_start)?;
    let magic = footer.read_u32()?;
    if magic != FOOTER_MAGIC {
        return Err(Error::corrupt(format!("{} has an invalid footer magic {:#x}", stream, magic)));
    }
    let algorithm = footer.read_u32()?;
    if algorithm != CHECKSUM_XXH64 {
        return Err(Error::corrupt(format!(
            "{} uses unknown checksum algorithm {}",
            stream, algorithm
        )));
    }
    let expected = footer.read_u64()?;
    let actual = xxh64(&data[..data.len() - 8], 0);
    if expected != actual {
        return Err(Error::ChecksumMismatch {
            stream: stream.to_string(),
            expected,
            actual,
        });
    }
    Ok(footer_start)
}
