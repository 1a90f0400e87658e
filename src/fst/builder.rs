use super::{ARC_FINAL, ARC_HAS_FINAL_OUTPUT, ARC_HAS_OUTPUT, ARC_STOP, Fst};
use crate::error::{Error, Result};
use crate::utils::encoding::{DataOutput, shared_prefix_len};
use rustc_hash::FxHashMap;

/// An arc on the frontier; `target` stays `None` until its child is frozen
/// (or for ever, when the child has no outgoing arcs)
#[derive(Debug, Default)]
struct PendingArc {
    label: u8,
    target: Option<u64>,
    output: Vec<u8>,
    is_final: bool,
    final_output: Vec<u8>,
}

#[derive(Debug, Default)]
struct UncompiledNode {
    arcs: Vec<PendingArc>,
    is_final: bool,
    output: Vec<u8>,
}

impl UncompiledNode {
    fn last_arc_mut(&mut self) -> Option<&mut PendingArc> {
        self.arcs.last_mut()
    }

    fn prepend_output(&mut self, prefix: &[u8]) {
        if prefix.is_empty() {
            return;
        }
        for arc in &mut self.arcs {
            arc.output = prepend(prefix, &arc.output);
        }
        if self.is_final {
            self.output = prepend(prefix, &self.output);
        }
    }
}

fn prepend(prefix: &[u8], bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + bytes.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(bytes);
    out
}

/// Builds a minimal [`Fst`] from keys added in strictly increasing order.
///
/// The frontier holds one uncompiled node per byte of the last key. When the
/// next key diverges, the abandoned tail is compiled bottom-up and identical
/// nodes are shared through the registry. Outputs are pushed as close to the
/// root as the common prefixes of sibling outputs allow.
pub struct FstBuilder {
    frontier: Vec<UncompiledNode>,
    last_input: Vec<u8>,
    bytes: Vec<u8>,
    registry: FxHashMap<Vec<u8>, u64>,
    empty_output: Option<Vec<u8>>,
    len: usize,
}

impl Default for FstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FstBuilder {
    pub fn new() -> Self {
        Self {
            frontier: vec![UncompiledNode::default()],
            last_input: Vec::new(),
            bytes: Vec::new(),
            registry: FxHashMap::default(),
            empty_output: None,
            len: 0,
        }
    }

    /// Number of keys added so far
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add `input -> output`; `input` must sort strictly after the previous key
    pub fn add(&mut self, input: &[u8], output: &[u8]) -> Result<()> {
        if self.len > 0 && input <= self.last_input.as_slice() {
            return Err(Error::fst(format!(
                "keys must be added in strictly increasing order: {:?} after {:?}",
                String::from_utf8_lossy(input),
                String::from_utf8_lossy(&self.last_input)
            )));
        }

        if input.is_empty() {
            self.empty_output = Some(output.to_vec());
            self.len += 1;
            return Ok(());
        }

        let prefix_len_plus1 = shared_prefix_len(&self.last_input, input) + 1;
        while self.frontier.len() <= input.len() {
            self.frontier.push(UncompiledNode::default());
        }

        self.freeze_tail(prefix_len_plus1);

        for idx in prefix_len_plus1..=input.len() {
            self.frontier[idx - 1].arcs.push(PendingArc {
                label: input[idx - 1],
                ..Default::default()
            });
        }
        let last_node = &mut self.frontier[input.len()];
        last_node.is_final = true;
        last_node.output.clear();

        // Push conflicting outputs forward along the shared path
        let mut output = output.to_vec();
        for idx in 1..prefix_len_plus1 {
            let (parents, children) = self.frontier.split_at_mut(idx);
            let Some(arc) = parents[idx - 1].last_arc_mut() else {
                continue;
            };
            debug_assert_eq!(arc.label, input[idx - 1]);
            if arc.output.is_empty() {
                continue;
            }
            let common = shared_prefix_len(&output, &arc.output);
            let word_suffix = arc.output.split_off(common);
            children[0].prepend_output(&word_suffix);
            output.drain(..common);
        }

        if let Some(arc) = self.frontier[prefix_len_plus1 - 1].last_arc_mut() {
            arc.output = output;
        }

        self.last_input.clear();
        self.last_input.extend_from_slice(input);
        self.len += 1;
        Ok(())
    }

    /// Compile the remaining frontier and return the finished transducer
    pub fn finish(mut self) -> Fst {
        self.freeze_tail(0);
        let root_arcs = std::mem::take(&mut self.frontier[0].arcs);
        let root = self.compile_node(&root_arcs);
        Fst::from_parts(self.bytes, root, self.empty_output, self.len)
    }

    /// Compile every frontier node deeper than `prefix_len_plus1 - 1`
    fn freeze_tail(&mut self, prefix_len_plus1: usize) {
        let down_to = prefix_len_plus1.max(1);
        for idx in (down_to..=self.last_input.len()).rev() {
            let node = std::mem::take(&mut self.frontier[idx]);
            let address = self.compile_node(&node.arcs);
            if let Some(arc) = self.frontier[idx - 1].last_arc_mut() {
                debug_assert_eq!(arc.label, self.last_input[idx - 1]);
                arc.target = address;
                arc.is_final = node.is_final;
                arc.final_output = node.output;
            }
        }
    }

    /// Serialize a node, reusing an identical one if it was already written.
    /// Nodes without arcs are never written; arcs into them carry `ARC_STOP`.
    fn compile_node(&mut self, arcs: &[PendingArc]) -> Option<u64> {
        if arcs.is_empty() {
            return None;
        }

        let mut buf = Vec::with_capacity(1 + arcs.len() * 4);
        // Writes into a Vec cannot fail.
        let _ = buf.write_vint(arcs.len() as u32);
        for arc in arcs {
            let mut flags = 0u8;
            if arc.is_final {
                flags |= ARC_FINAL;
            }
            if !arc.output.is_empty() {
                flags |= ARC_HAS_OUTPUT;
            }
            if !arc.final_output.is_empty() {
                flags |= ARC_HAS_FINAL_OUTPUT;
            }
            if arc.target.is_none() {
                flags |= ARC_STOP;
            }

            buf.push(arc.label);
            buf.push(flags);
            if !arc.output.is_empty() {
                let _ = buf.write_len_prefixed(&arc.output);
            }
            if !arc.final_output.is_empty() {
                let _ = buf.write_len_prefixed(&arc.final_output);
            }
            if let Some(target) = arc.target {
                let _ = buf.write_vlong(target);
            }
        }

        if let Some(&address) = self.registry.get(&buf) {
            return Some(address);
        }
        let address = self.bytes.len() as u64;
        self.bytes.extend_from_slice(&buf);
        self.registry.insert(buf, address);
        Some(address)
    }
}
