//! Postings collaborator contracts.
//!
//! The terms dictionary stores per-term metadata blobs without interpreting
//! them. A [`PostingsWriter`] turns a term's [`BlockTermState`] longs into
//! those bytes and a [`PostingsReader`] turns them back. The first term of
//! every block is encoded with `absolute = true` so each block can be decoded
//! on its own; later terms may be written relative to their predecessor.

use crate::error::{Error, Result};
use crate::index::types::{BlockTermState, FieldInfo};
use crate::utils::encoding::{ByteReader, DataOutput, zigzag_decode, zigzag_encode};

pub trait PostingsWriter {
    /// Called before the first term of each field
    fn set_field(&mut self, _field: &FieldInfo) {}

    /// Append the metadata for one term to `out`
    fn encode_term(
        &mut self,
        out: &mut Vec<u8>,
        field: &FieldInfo,
        state: &BlockTermState,
        absolute: bool,
    ) -> Result<()>;
}

pub trait PostingsReader {
    fn set_field(&mut self, _field: &FieldInfo) {}

    /// Fill `state.longs` from the metadata written by the paired writer
    fn decode_term(
        &mut self,
        input: &mut ByteReader<'_>,
        field: &FieldInfo,
        state: &mut BlockTermState,
        absolute: bool,
    ) -> Result<()>;
}

/// Default codec: a count, then each long either as-is or as a zigzag delta
/// from the same slot of the previous term
#[derive(Debug, Default, Clone)]
pub struct DeltaPostingsCodec {
    last: Vec<u64>,
}

impl DeltaPostingsCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PostingsWriter for DeltaPostingsCodec {
    fn set_field(&mut self, _field: &FieldInfo) {
        self.last.clear();
    }

    fn encode_term(
        &mut self,
        out: &mut Vec<u8>,
        _field: &FieldInfo,
        state: &BlockTermState,
        absolute: bool,
    ) -> Result<()> {
        if absolute {
            self.last.clear();
        }
        out.write_vint(state.longs.len() as u32)?;
        for (i, &value) in state.longs.iter().enumerate() {
            match self.last.get(i) {
                Some(&previous) => {
                    out.write_vlong(zigzag_encode(value.wrapping_sub(previous) as i64))?
                }
                None => out.write_vlong(value)?,
            }
        }
        self.last.clone_from(&state.longs);
        Ok(())
    }
}

impl PostingsReader for DeltaPostingsCodec {
    fn set_field(&mut self, _field: &FieldInfo) {
        self.last.clear();
    }

    fn decode_term(
        &mut self,
        input: &mut ByteReader<'_>,
        _field: &FieldInfo,
        state: &mut BlockTermState,
        absolute: bool,
    ) -> Result<()> {
        if absolute {
            self.last.clear();
        }
        let count = input.read_vint()? as usize;
        if count > input.remaining() {
            return Err(Error::corrupt(format!("term metadata claims {} longs", count)));
        }
        state.longs.clear();
        for i in 0..count {
            let raw = input.read_vlong()?;
            let value = match self.last.get(i) {
                Some(&previous) => previous.wrapping_add(zigzag_decode(raw) as u64),
                None => raw,
            };
            state.longs.push(value);
        }
        self.last.clone_from(&state.longs);
        Ok(())
    }
}
