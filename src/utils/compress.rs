//! Suffix-byte compression for dictionary blocks.
//!
//! Two compressors are available: general-purpose LZ4 (block format, via
//! `lz4_flex`) and a lowercase-ASCII packer that stores most bytes in 6 bits
//! and records the rest as exceptions. [`compress_suffixes`] decides which one
//! (if any) a block should use.

use crate::error::{Error, Result};
use crate::utils::encoding::{ByteReader, DataOutput};
use crate::utils::packed::{PackedReader, PackedWriter, packed_len};

const LOWERCASE_MIN_LEN: usize = 8;

/// Compression applied to a block's suffix bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CompressionAlgorithm {
    #[default]
    None = 0,
    LowercaseAscii = 1,
    Lz4 = 2,
}

impl CompressionAlgorithm {
    /// Two-bit code stored in the suffix token
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(CompressionAlgorithm::None),
            1 => Ok(CompressionAlgorithm::LowercaseAscii),
            2 => Ok(CompressionAlgorithm::Lz4),
            other => Err(Error::corrupt(format!("unknown compression code {}", other))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::LowercaseAscii => "lowercase",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }

    /// Restore `original_len` bytes from a compressed payload
    pub fn decompress(self, payload: &[u8], original_len: usize) -> Result<Vec<u8>> {
        let bytes = match self {
            CompressionAlgorithm::None => payload.to_vec(),
            CompressionAlgorithm::LowercaseAscii => lowercase_ascii::decompress(payload, original_len)?,
            CompressionAlgorithm::Lz4 => lz4_flex::block::decompress(payload, original_len)
                .map_err(|e| Error::corrupt(format!("failed to decompress LZ4 suffixes: {}", e)))?,
        };
        if bytes.len() != original_len {
            return Err(Error::corrupt(format!(
                "decompressed {} suffix bytes, expected {}",
                bytes.len(),
                original_len
            )));
        }
        Ok(bytes)
    }
}

/// Pick a compressor for a block's suffix bytes.
///
/// Returns `None` when the bytes should be stored raw. Blocks whose suffixes
/// average two bytes or less, or whose prefix is two bytes or shorter, are
/// never compressed. LZ4 is tried when suffixes average more than six bytes
/// and kept only if it saves at least a quarter; otherwise the lowercase-ASCII
/// packer gets a chance.
pub fn compress_suffixes(
    suffixes: &[u8],
    num_entries: usize,
    prefix_len: usize,
) -> Option<(CompressionAlgorithm, Vec<u8>)> {
    let len = suffixes.len();
    if len <= 2 * num_entries || prefix_len <= 2 {
        return None;
    }

    if len > 6 * num_entries {
        let compressed = lz4_flex::block::compress(suffixes);
        if compressed.len() < len - (len >> 2) {
            return Some((CompressionAlgorithm::Lz4, compressed));
        }
    }

    lowercase_ascii::compress(suffixes).map(|bytes| (CompressionAlgorithm::LowercaseAscii, bytes))
}

/// Packs bytes from the two 32-value ranges around lowercase ASCII into 6 bits
pub mod lowercase_ascii {
    use super::*;

    #[inline]
    fn is_compressible(b: u8) -> bool {
        let high = (b as u32 + 1) & !0x1F;
        high == 0x20 || high == 0x60
    }

    #[inline]
    fn encode(b: u8) -> u64 {
        let v = b as u32 + 1;
        ((v & 0x1F) | ((v & 0x40) >> 1)) as u64
    }

    #[inline]
    fn decode(code: u64) -> u8 {
        let c = code as u32;
        (((c & 0x1F) | 0x20 | ((c & 0x20) << 1)) - 1) as u8
    }

    /// Compress `input`, or `None` if it has too many bytes outside the packable ranges
    pub fn compress(input: &[u8]) -> Option<Vec<u8>> {
        let len = input.len();
        if len < LOWERCASE_MIN_LEN {
            return None;
        }

        let max_exceptions = len >> 5;
        let exceptions: Vec<usize> = input
            .iter()
            .enumerate()
            .filter(|(_, b)| !is_compressible(**b))
            .map(|(i, _)| i)
            .collect();
        if exceptions.len() > max_exceptions {
            return None;
        }

        let mut out = Vec::with_capacity(packed_len(len, 6) + 1 + exceptions.len() * 2);
        let mut writer = PackedWriter::new(&mut out);
        for &b in input {
            writer.write(encode(b), 6);
        }
        writer.flush();

        let _ = out.write_vint(exceptions.len() as u32);
        let mut previous = 0;
        for &i in &exceptions {
            let _ = out.write_vint((i - previous) as u32);
            out.push(input[i]);
            previous = i;
        }

        (out.len() < len).then_some(out)
    }

    pub fn decompress(payload: &[u8], len: usize) -> Result<Vec<u8>> {
        let mut input = ByteReader::new(payload);
        let packed = input.read_bytes(packed_len(len, 6))?;
        let mut reader = PackedReader::new(packed);
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(decode(reader.read(6)?));
        }

        let num_exceptions = input.read_vint()? as usize;
        let mut position = 0usize;
        for _ in 0..num_exceptions {
            position += input.read_vint()? as usize;
            let byte = input.read_u8()?;
            let slot = out
                .get_mut(position)
                .ok_or_else(|| Error::corrupt(format!("exception index {} beyond {} bytes", position, len)))?;
            *slot = byte;
        }
        Ok(out)
    }
}
