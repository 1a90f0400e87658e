//! Fixed-width bit packing and block-monotonic integer arrays.
//!
//! Values are packed most-significant-bit first into a byte stream. The
//! monotonic writer stores each block of a non-decreasing sequence as a linear
//! fit (minimum + average increment) plus bit-packed residuals, which keeps
//! file-offset tables small when offsets grow roughly evenly.

use crate::error::{Error, Result};
use crate::utils::encoding::{ByteReader, DataOutput, zigzag_decode, zigzag_encode};

/// Smallest accepted block shift for [`MonotonicWriter`]
pub const MIN_BLOCK_SHIFT: u32 = 2;
/// Largest accepted block shift for [`MonotonicWriter`]
pub const MAX_BLOCK_SHIFT: u32 = 22;

/// Number of bits needed to store `max_value` (at least 1)
#[inline]
pub fn bits_required(max_value: u64) -> u32 {
    (64 - max_value.leading_zeros()).max(1)
}

/// Number of bytes needed to pack `count` values of `bits` bits each
#[inline]
pub fn packed_len(count: usize, bits: u32) -> usize {
    (count * bits as usize).div_ceil(8)
}

/// Writes values of arbitrary bit width into a byte buffer
pub struct PackedWriter<'a> {
    out: &'a mut Vec<u8>,
    current: u64,
    remaining_bits: u32,
}

impl<'a> PackedWriter<'a> {
    pub fn new(out: &'a mut Vec<u8>) -> Self {
        Self {
            out,
            current: 0,
            remaining_bits: 8,
        }
    }

    /// Append the low `bits_per_value` bits of `value`
    pub fn write(&mut self, value: u64, bits_per_value: u32) {
        debug_assert!(bits_per_value <= 64);
        debug_assert!(bits_per_value == 64 || value >> bits_per_value == 0);

        let mut bits = bits_per_value;
        while bits > 0 {
            if self.remaining_bits == 0 {
                self.out.push(self.current as u8);
                self.current = 0;
                self.remaining_bits = 8;
            }
            let take = self.remaining_bits.min(bits);
            let chunk = (value >> (bits - take)) & ((1u64 << take) - 1);
            self.current |= chunk << (self.remaining_bits - take);
            bits -= take;
            self.remaining_bits -= take;
        }
    }

    /// Write out the trailing partial byte, if any
    pub fn flush(mut self) {
        if self.remaining_bits < 8 {
            self.out.push(self.current as u8);
        }
        self.remaining_bits = 8;
        self.current = 0;
    }
}

/// Reads values written by [`PackedWriter`]
pub struct PackedReader<'a> {
    data: &'a [u8],
    pos: usize,
    current: u8,
    remaining_bits: u32,
}

impl<'a> PackedReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            current: 0,
            remaining_bits: 0,
        }
    }

    pub fn read(&mut self, bits_per_value: u32) -> Result<u64> {
        let mut value = 0u64;
        let mut bits = bits_per_value;
        while bits > 0 {
            if self.remaining_bits == 0 {
                self.current = *self
                    .data
                    .get(self.pos)
                    .ok_or_else(|| Error::corrupt("packed values truncated"))?;
                self.pos += 1;
                self.remaining_bits = 8;
            }
            let take = self.remaining_bits.min(bits);
            let chunk = ((self.current as u64) >> (self.remaining_bits - take)) & ((1u64 << take) - 1);
            value = (value << take) | chunk;
            bits -= take;
            self.remaining_bits -= take;
        }
        Ok(value)
    }
}

/// Buffers a non-decreasing sequence and encodes it block by block.
///
/// Per block: `vlong(zigzag(min))`, `u32(avg_increment as f32 bits)`,
/// `byte(bits)`, then the packed residuals (omitted when `bits == 0`).
/// The value count is not stored; readers must know it.
pub struct MonotonicWriter {
    block_size: usize,
    buffer: Vec<u64>,
    previous: Option<u64>,
    count: usize,
    out: Vec<u8>,
}

impl MonotonicWriter {
    pub fn new(block_shift: u32) -> Result<Self> {
        if !(MIN_BLOCK_SHIFT..=MAX_BLOCK_SHIFT).contains(&block_shift) {
            return Err(Error::invalid_config(format!(
                "block_shift must be in [{}-{}], got {}",
                MIN_BLOCK_SHIFT, MAX_BLOCK_SHIFT, block_shift
            )));
        }
        let block_size = 1usize << block_shift;
        Ok(Self {
            block_size,
            buffer: Vec::with_capacity(block_size.min(1024)),
            previous: None,
            count: 0,
            out: Vec::new(),
        })
    }

    pub fn add(&mut self, value: u64) -> Result<()> {
        if let Some(previous) = self.previous {
            if value < previous {
                return Err(Error::NotMonotonic { previous, value });
            }
        }
        if self.buffer.len() == self.block_size {
            self.flush_block();
        }
        self.buffer.push(value);
        self.previous = Some(value);
        self.count += 1;
        Ok(())
    }

    /// Number of values added so far
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Encode any buffered values and return the encoded bytes
    pub fn finish(mut self) -> Vec<u8> {
        if !self.buffer.is_empty() {
            self.flush_block();
        }
        self.out
    }

    fn flush_block(&mut self) {
        let n = self.buffer.len();
        debug_assert!(n > 0);
        let span = (self.buffer[n - 1] - self.buffer[0]) as f64;
        let avg_inc = (span / (n.max(2) - 1) as f64) as f32;

        let residuals: Vec<i64> = self
            .buffer
            .iter()
            .enumerate()
            .map(|(i, &v)| v as i64 - expected(avg_inc, i))
            .collect();
        let min = residuals.iter().copied().min().unwrap_or(0);
        let max_delta = residuals
            .iter()
            .fold(0u64, |acc, &r| acc | (r - min) as u64);

        // Writes into a Vec cannot fail.
        let _ = self.out.write_vlong(zigzag_encode(min));
        let _ = self.out.write_u32(avg_inc.to_bits());
        if max_delta == 0 {
            self.out.push(0);
        } else {
            let bits = bits_required(max_delta);
            self.out.push(bits as u8);
            let mut writer = PackedWriter::new(&mut self.out);
            for &r in &residuals {
                writer.write((r - min) as u64, bits);
            }
            writer.flush();
        }
        self.buffer.clear();
    }
}

#[inline]
fn expected(avg_inc: f32, index: usize) -> i64 {
    (avg_inc * index as f32) as i64
}

/// `min + residual + expected(avg_inc, index)`, rejecting values no writer produces
fn restore(min: i64, residual: i64, avg_inc: f32, index: usize) -> Result<u64> {
    min.checked_add(residual)
        .and_then(|v| v.checked_add(expected(avg_inc, index)))
        .map(|v| v as u64)
        .ok_or_else(|| Error::corrupt(format!("monotonic value {} overflows", index)))
}

/// Decode `count` values written by a [`MonotonicWriter`] with the same block shift
pub fn read_monotonic(input: &mut ByteReader<'_>, count: usize, block_shift: u32) -> Result<Vec<u64>> {
    if !(MIN_BLOCK_SHIFT..=MAX_BLOCK_SHIFT).contains(&block_shift) {
        return Err(Error::corrupt(format!("invalid block shift {}", block_shift)));
    }
    let block_size = 1usize << block_shift;
    let mut values = Vec::with_capacity(count);

    while values.len() < count {
        let n = block_size.min(count - values.len());
        let min = zigzag_decode(input.read_vlong()?);
        let avg_inc = f32::from_bits(input.read_u32()?);
        let bits = input.read_u8()? as u32;
        if bits > 64 {
            return Err(Error::corrupt(format!("invalid packed width {}", bits)));
        }

        if bits == 0 {
            for i in 0..n {
                values.push(restore(min, 0, avg_inc, i)?);
            }
        } else {
            let packed = input.read_bytes(packed_len(n, bits))?;
            let mut reader = PackedReader::new(packed);
            for i in 0..n {
                let residual = reader.read(bits)? as i64;
                values.push(restore(min, residual, avg_inc, i)?);
            }
        }
    }

    Ok(values)
}
