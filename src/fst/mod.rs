//! Finite-state transducer over byte keys with byte-sequence outputs.
//!
//! Used as the prefix index of the term dictionary: each key is a block prefix
//! and each output is the encoded location of that block. An [`Fst`] is
//! immutable once built; see [`FstBuilder`] for construction.
//!
//! ## Node layout
//!
//! ```text
//! node := vint(num_arcs) arc*
//! arc  := label:u8 flags:u8 [vint(len) output] [vint(len) final_output] [vlong(target)]
//! ```
//!
//! Arcs are sorted by label. An arc with `ARC_STOP` set has no target field.

mod builder;

pub use builder::FstBuilder;

use crate::error::{Error, Result};
use crate::utils::encoding::{ByteReader, DataOutput};
use std::io;

pub(crate) const ARC_FINAL: u8 = 1;
pub(crate) const ARC_HAS_OUTPUT: u8 = 1 << 1;
pub(crate) const ARC_HAS_FINAL_OUTPUT: u8 = 1 << 2;
pub(crate) const ARC_STOP: u8 = 1 << 3;

/// Immutable transducer produced by [`FstBuilder::finish`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fst {
    bytes: Vec<u8>,
    root: Option<u64>,
    empty_output: Option<Vec<u8>>,
    len: usize,
}

#[derive(Debug, Clone, Copy)]
struct Arc<'a> {
    label: u8,
    output: &'a [u8],
    is_final: bool,
    final_output: &'a [u8],
    target: Option<u64>,
}

impl Fst {
    pub(crate) fn from_parts(bytes: Vec<u8>, root: Option<u64>, empty_output: Option<Vec<u8>>, len: usize) -> Self {
        Self {
            bytes,
            root,
            empty_output,
            len,
        }
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Output of the empty key, if present
    pub fn empty_output(&self) -> Option<&[u8]> {
        self.empty_output.as_deref()
    }

    /// Size of the serialized node graph
    pub fn size_in_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Exact lookup
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if key.is_empty() {
            return Ok(self.empty_output.clone());
        }

        let mut node = self.root;
        let mut output = Vec::new();
        for (i, &label) in key.iter().enumerate() {
            let Some(address) = node else {
                return Ok(None);
            };
            let Some(arc) = self.find_arc(address, label)? else {
                return Ok(None);
            };
            output.extend_from_slice(arc.output);
            if i + 1 == key.len() {
                if !arc.is_final {
                    return Ok(None);
                }
                output.extend_from_slice(arc.final_output);
                return Ok(Some(output));
            }
            node = arc.target;
        }
        Ok(None)
    }

    /// Longest key that is a prefix of `input`, as `(key_len, output)`
    pub fn longest_prefix_output(&self, input: &[u8]) -> Result<Option<(usize, Vec<u8>)>> {
        let mut best = self.empty_output.as_ref().map(|out| (0, out.clone()));

        let mut node = self.root;
        let mut output = Vec::new();
        for (i, &label) in input.iter().enumerate() {
            let Some(address) = node else {
                break;
            };
            let Some(arc) = self.find_arc(address, label)? else {
                break;
            };
            output.extend_from_slice(arc.output);
            if arc.is_final {
                let mut full = output.clone();
                full.extend_from_slice(arc.final_output);
                best = Some((i + 1, full));
            }
            node = arc.target;
        }
        Ok(best)
    }

    /// All `(key, output)` pairs in key order
    pub fn iter(&self) -> FstIter<'_> {
        FstIter {
            fst: self,
            stack: Vec::new(),
            key: Vec::new(),
            output: Vec::new(),
            started: false,
        }
    }

    /// Serialize to `out`
    pub fn save<O: DataOutput + ?Sized>(&self, out: &mut O) -> io::Result<()> {
        out.write_vlong(self.len as u64)?;
        match &self.empty_output {
            Some(empty) => {
                out.write_byte(1)?;
                out.write_len_prefixed(empty)?;
            }
            None => out.write_byte(0)?,
        }
        match self.root {
            Some(root) => {
                out.write_byte(1)?;
                out.write_vlong(root)?;
            }
            None => out.write_byte(0)?,
        }
        out.write_vlong(self.bytes.len() as u64)?;
        out.write_bytes(&self.bytes)
    }

    /// Read a transducer written by [`Fst::save`]
    pub fn load(input: &mut ByteReader<'_>) -> Result<Self> {
        let len = input.read_vlong()? as usize;
        let empty_output = match input.read_u8()? {
            0 => None,
            1 => Some(input.read_len_prefixed()?.to_vec()),
            other => return Err(Error::fst(format!("invalid empty-output marker {}", other))),
        };
        let root = match input.read_u8()? {
            0 => None,
            1 => Some(input.read_vlong()?),
            other => return Err(Error::fst(format!("invalid root marker {}", other))),
        };
        let num_bytes = input.read_vlong()? as usize;
        let bytes = input.read_bytes(num_bytes)?.to_vec();
        if let Some(root) = root {
            if root as usize >= bytes.len() {
                return Err(Error::fst(format!("root address {} beyond {} bytes", root, bytes.len())));
            }
        }
        Ok(Self {
            bytes,
            root,
            empty_output,
            len,
        })
    }

    fn arcs(&self, address: u64) -> Result<Vec<Arc<'_>>> {
        let mut reader = ByteReader::at(&self.bytes, address as usize)?;
        let num_arcs = reader.read_vint()? as usize;
        if num_arcs == 0 || num_arcs > 256 {
            return Err(Error::fst(format!("node at {} has {} arcs", address, num_arcs)));
        }
        let mut arcs = Vec::with_capacity(num_arcs);
        for _ in 0..num_arcs {
            arcs.push(Self::read_arc(&mut reader)?);
        }
        Ok(arcs)
    }

    fn find_arc(&self, address: u64, label: u8) -> Result<Option<Arc<'_>>> {
        let mut reader = ByteReader::at(&self.bytes, address as usize)?;
        let num_arcs = reader.read_vint()? as usize;
        for _ in 0..num_arcs {
            let arc = Self::read_arc(&mut reader)?;
            if arc.label == label {
                return Ok(Some(arc));
            }
            if arc.label > label {
                break;
            }
        }
        Ok(None)
    }

    fn read_arc<'a>(reader: &mut ByteReader<'a>) -> Result<Arc<'a>> {
        let label = reader.read_u8()?;
        let flags = reader.read_u8()?;
        let output = if flags & ARC_HAS_OUTPUT != 0 {
            reader.read_len_prefixed()?
        } else {
            &[]
        };
        let final_output = if flags & ARC_HAS_FINAL_OUTPUT != 0 {
            reader.read_len_prefixed()?
        } else {
            &[]
        };
        let target = if flags & ARC_STOP != 0 {
            None
        } else {
            Some(reader.read_vlong()?)
        };
        if target.is_none() && flags & ARC_FINAL == 0 {
            return Err(Error::fst("dead-end arc is not final"));
        }
        Ok(Arc {
            label,
            output,
            is_final: flags & ARC_FINAL != 0,
            final_output,
            target,
        })
    }
}

struct Frame<'a> {
    arcs: Vec<Arc<'a>>,
    next: usize,
    key_len: usize,
    output_len: usize,
}

/// Depth-first iterator over an [`Fst`], yielding keys in sorted order
pub struct FstIter<'a> {
    fst: &'a Fst,
    stack: Vec<Frame<'a>>,
    key: Vec<u8>,
    output: Vec<u8>,
    started: bool,
}

impl<'a> FstIter<'a> {
    fn push_node(&mut self, address: u64) -> Result<()> {
        let fst = self.fst;
        let arcs = fst.arcs(address)?;
        self.stack.push(Frame {
            arcs,
            next: 0,
            key_len: self.key.len(),
            output_len: self.output.len(),
        });
        Ok(())
    }
}

impl Iterator for FstIter<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            if let Some(root) = self.fst.root {
                if let Err(e) = self.push_node(root) {
                    self.stack.clear();
                    return Some(Err(e));
                }
            }
            if let Some(empty) = &self.fst.empty_output {
                return Some(Ok((Vec::new(), empty.clone())));
            }
        }

        loop {
            let frame = self.stack.last_mut()?;
            let Some(&arc) = frame.arcs.get(frame.next) else {
                self.stack.pop();
                continue;
            };
            frame.next += 1;
            self.key.truncate(frame.key_len);
            self.output.truncate(frame.output_len);
            self.key.push(arc.label);
            self.output.extend_from_slice(arc.output);

            let item = arc.is_final.then(|| {
                let mut output = self.output.clone();
                output.extend_from_slice(arc.final_output);
                (self.key.clone(), output)
            });

            if let Some(target) = arc.target {
                if let Err(e) = self.push_node(target) {
                    self.stack.clear();
                    return Some(Err(e));
                }
            }

            if let Some(item) = item {
                return Some(Ok(item));
            }
        }
    }
}
