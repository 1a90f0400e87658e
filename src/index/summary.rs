//! Per-field summary records and the field directory in the metadata stream.
//!
//! Directory layout (after the codec header):
//!
//! ```text
//! vint(field_count)
//! per field:
//!   vint(field_number) vlong(num_terms) vint(len) root_code
//!   [vlong(sum_total_term_freq)]   only for fields with frequencies
//!   vlong(sum_doc_freq) vint(doc_count)
//!   vint(len) min_term vint(len) max_term
//!   vlong(index_start_fp)
//! vlong(index_end) vlong(terms_end)
//! ```

use crate::error::{Error, Result};
use crate::index::types::FieldInfo;
use crate::utils::encoding::{ByteReader, DataOutput};
use serde::Serialize;
use std::io;

/// Everything the reader needs to know about one written field
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FieldSummary {
    pub field_number: u32,
    pub num_terms: u64,
    /// Encoded location of the root block; empty when the field has no terms
    #[serde(skip)]
    pub root_code: Vec<u8>,
    /// `None` for fields that do not track frequencies
    pub sum_total_term_freq: Option<u64>,
    pub sum_doc_freq: u64,
    pub doc_count: u32,
    #[serde(skip)]
    pub min_term: Vec<u8>,
    #[serde(skip)]
    pub max_term: Vec<u8>,
    pub index_start_fp: u64,
}

impl FieldSummary {
    /// Summary of a field that received no terms
    pub fn empty(field_number: u32, has_freqs: bool, index_start_fp: u64) -> Self {
        Self {
            field_number,
            sum_total_term_freq: has_freqs.then_some(0),
            index_start_fp,
            ..Default::default()
        }
    }

    pub fn has_terms(&self) -> bool {
        self.num_terms > 0
    }

    pub fn encode<O: DataOutput + ?Sized>(&self, out: &mut O) -> io::Result<()> {
        out.write_vint(self.field_number)?;
        out.write_vlong(self.num_terms)?;
        out.write_len_prefixed(&self.root_code)?;
        if let Some(sum_total_term_freq) = self.sum_total_term_freq {
            out.write_vlong(sum_total_term_freq)?;
        }
        out.write_vlong(self.sum_doc_freq)?;
        out.write_vint(self.doc_count)?;
        out.write_len_prefixed(&self.min_term)?;
        out.write_len_prefixed(&self.max_term)?;
        out.write_vlong(self.index_start_fp)
    }

    pub fn decode(input: &mut ByteReader<'_>, fields: &[FieldInfo]) -> Result<Self> {
        let field_number = input.read_vint()?;
        let info = fields
            .iter()
            .find(|f| f.number == field_number)
            .ok_or_else(|| Error::corrupt(format!("summary for unknown field number {}", field_number)))?;

        let num_terms = input.read_vlong()?;
        let root_code = input.read_len_prefixed()?.to_vec();
        let sum_total_term_freq = if info.index_options.has_freqs() {
            Some(input.read_vlong()?)
        } else {
            None
        };
        let summary = Self {
            field_number,
            num_terms,
            root_code,
            sum_total_term_freq,
            sum_doc_freq: input.read_vlong()?,
            doc_count: input.read_vint()?,
            min_term: input.read_len_prefixed()?.to_vec(),
            max_term: input.read_len_prefixed()?.to_vec(),
            index_start_fp: input.read_vlong()?,
        };
        summary.check(&info.name)?;
        Ok(summary)
    }

    fn check(&self, name: &str) -> Result<()> {
        if self.num_terms == 0 {
            if !self.root_code.is_empty() || self.sum_doc_freq != 0 || self.doc_count != 0 {
                return Err(Error::corrupt(format!("field '{}' has no terms but non-zero aggregates", name)));
            }
            return Ok(());
        }
        if self.root_code.is_empty() {
            return Err(Error::corrupt(format!("field '{}' has terms but no root block", name)));
        }
        if self.sum_doc_freq < self.doc_count as u64 {
            return Err(Error::corrupt(format!(
                "field '{}': sum_doc_freq {} is below doc_count {}",
                name, self.sum_doc_freq, self.doc_count
            )));
        }
        if let Some(sum_total_term_freq) = self.sum_total_term_freq {
            if sum_total_term_freq < self.sum_doc_freq {
                return Err(Error::corrupt(format!(
                    "field '{}': sum_total_term_freq {} is below sum_doc_freq {}",
                    name, sum_total_term_freq, self.sum_doc_freq
                )));
            }
        }
        if self.min_term > self.max_term {
            return Err(Error::corrupt(format!("field '{}': min term sorts after max term", name)));
        }
        Ok(())
    }
}

/// Decoded content of the metadata stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDirectory {
    pub fields: Vec<FieldSummary>,
    pub index_end: u64,
    pub terms_end: u64,
}

impl FieldDirectory {
    pub fn write<O: DataOutput + ?Sized>(
        out: &mut O,
        fields: &[FieldSummary],
        index_end: u64,
        terms_end: u64,
    ) -> io::Result<()> {
        out.write_vint(fields.len() as u32)?;
        for field in fields {
            field.encode(out)?;
        }
        out.write_vlong(index_end)?;
        out.write_vlong(terms_end)
    }

    pub fn read(input: &mut ByteReader<'_>, infos: &[FieldInfo]) -> Result<Self> {
        let count = input.read_vint()? as usize;
        if count > infos.len() {
            return Err(Error::corrupt(format!(
                "directory lists {} fields but only {} are known",
                count,
                infos.len()
            )));
        }
        let mut fields: Vec<FieldSummary> = Vec::with_capacity(count);
        for _ in 0..count {
            let summary = FieldSummary::decode(input, infos)?;
            if let Some(previous) = fields.last() {
                if summary.field_number <= previous.field_number {
                    return Err(Error::corrupt(format!(
                        "field {} listed after field {}",
                        summary.field_number, previous.field_number
                    )));
                }
            }
            fields.push(summary);
        }
        Ok(Self {
            fields,
            index_end: input.read_vlong()?,
            terms_end: input.read_vlong()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::IndexOptions;

    fn infos() -> Vec<FieldInfo> {
        vec![
            FieldInfo::new("id", 0, IndexOptions::Docs),
            FieldInfo::new("body", 1, IndexOptions::DocsAndFreqs),
        ]
    }

    #[test]
    fn test_directory_roundtrip_with_and_without_freqs() {
        let fields = vec![
            FieldSummary {
                field_number: 0,
                num_terms: 3,
                root_code: vec![0x0a],
                sum_total_term_freq: None,
                sum_doc_freq: 3,
                doc_count: 3,
                min_term: b"a".to_vec(),
                max_term: b"c".to_vec(),
                index_start_fp: 30,
            },
            FieldSummary::empty(1, true, 55),
        ];

        let mut out = Vec::new();
        FieldDirectory::write(&mut out, &fields, 100, 200).unwrap();

        let mut input = ByteReader::new(&out);
        let directory = FieldDirectory::read(&mut input, &infos()).unwrap();
        assert!(input.is_at_end());
        assert_eq!(directory.fields, fields);
        assert_eq!((directory.index_end, directory.terms_end), (100, 200));
    }

    #[test]
    fn test_unknown_field_number_is_corrupt() {
        let mut out = Vec::new();
        FieldDirectory::write(&mut out, &[FieldSummary::empty(7, false, 0)], 0, 0).unwrap();
        assert!(matches!(
            FieldDirectory::read(&mut ByteReader::new(&out), &infos()),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn test_terms_without_root_is_corrupt() {
        let mut summary = FieldSummary::empty(1, true, 0);
        summary.num_terms = 2;
        let mut out = Vec::new();
        summary.encode(&mut out).unwrap();
        assert!(FieldSummary::decode(&mut ByteReader::new(&out), &infos()).is_err());
    }
}
