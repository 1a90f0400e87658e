use crate::error::{Error, Result};
use std::io;

/// Encode a u32 as a variable-length integer
pub fn encode_varint(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            break;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Decode a variable-length integer from a slice
/// Returns (value, bytes_consumed)
pub fn decode_varint(buf: &[u8]) -> Option<(u32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 32 {
            return None; // Overflow
        }

        result |= ((byte & 0x7F) as u32) << shift;

        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }

        shift += 7;
    }

    None // Incomplete
}

/// Encode a u64 as a variable-length integer
pub fn encode_varint_u64(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            break;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Decode a u64 variable-length integer
pub fn decode_varint_u64(buf: &[u8]) -> Option<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 64 {
            return None;
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }

        shift += 7;
    }

    None
}

/// Map a signed value onto an unsigned one so small magnitudes stay small
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`]
#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Length of the longest common byte prefix of two slices
#[inline]
pub fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Sink for the primitive encodings shared by every stream and scratch buffer.
///
/// Fixed-width integers are little-endian; variable-length integers use the
/// 7-bits-per-byte encoding above.
pub trait DataOutput {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.write_bytes(&[byte])
    }

    fn write_vint(&mut self, value: u32) -> io::Result<()> {
        let mut buf = Vec::with_capacity(5);
        encode_varint(value, &mut buf);
        self.write_bytes(&buf)
    }

    fn write_vlong(&mut self, value: u64) -> io::Result<()> {
        let mut buf = Vec::with_capacity(10);
        encode_varint_u64(value, &mut buf);
        self.write_bytes(&buf)
    }

    fn write_u32(&mut self, value: u32) -> io::Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_u64(&mut self, value: u64) -> io::Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Write a length-prefixed byte string
    fn write_len_prefixed(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_vint(bytes.len() as u32)?;
        self.write_bytes(bytes)
    }
}

impl DataOutput for Vec<u8> {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.push(byte);
        Ok(())
    }

    fn write_vint(&mut self, value: u32) -> io::Result<()> {
        encode_varint(value, self);
        Ok(())
    }

    fn write_vlong(&mut self, value: u64) -> io::Result<()> {
        encode_varint_u64(value, self);
        Ok(())
    }
}

/// Forward-only cursor over an encoded byte slice
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Start reading at `pos`
    pub fn at(data: &'a [u8], pos: usize) -> Result<Self> {
        if pos > data.len() {
            return Err(Error::corrupt(format!(
                "position {} beyond end of input ({} bytes)",
                pos,
                data.len()
            )));
        }
        Ok(Self { data, pos })
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| self.eof())?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_vint(&mut self) -> Result<u32> {
        let (value, consumed) = decode_varint(&self.data[self.pos..]).ok_or_else(|| {
            Error::corrupt(format!("malformed vint at offset {}", self.pos))
        })?;
        self.pos += consumed;
        Ok(value)
    }

    pub fn read_vlong(&mut self) -> Result<u64> {
        let (value, consumed) = decode_varint_u64(&self.data[self.pos..]).ok_or_else(|| {
            Error::corrupt(format!("malformed vlong at offset {}", self.pos))
        })?;
        self.pos += consumed;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| self.eof())?;
        let bytes = self.data.get(self.pos..end).ok_or_else(|| self.eof())?;
        self.pos = end;
        Ok(bytes)
    }

    /// Read a byte string written by [`DataOutput::write_len_prefixed`]
    pub fn read_len_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_vint()? as usize;
        self.read_bytes(len)
    }

    fn eof(&self) -> Error {
        Error::corrupt(format!(
            "unexpected end of input at offset {} ({} bytes)",
            self.pos,
            self.data.len()
        ))
    }
}
