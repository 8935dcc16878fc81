//! Inverted index of a text segment.
//!
//! Every field of a segment gets its own term dictionary mapping a term to
//! its postings (document ordinal, frequency and, when the field was indexed
//! with positions, the token positions). Per-document field lengths back the
//! BM25 length normalization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::analysis::analyzer::PerFieldAnalyzer;
use crate::engine::document::{IndexOptions, TextField};
use crate::error::Result;

/// Hash map keyed with the `ahash` hasher; serde-compatible.
pub type FastMap<K, V> = HashMap<K, V, ahash::RandomState>;

/// One document's occurrences of a term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc: u32,
    pub freq: u32,
    pub positions: Vec<u32>,
}

/// Term dictionary and statistics of one field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldIndex {
    /// Postings per term, sorted by document ordinal.
    pub terms: FastMap<String, Vec<Posting>>,
    /// Token count per document ordinal; 0 when absent or norms are omitted.
    pub lengths: Vec<u32>,
    /// Number of documents that have this field.
    pub doc_count: u32,
    /// Sum of `lengths`.
    pub total_length: u64,
    /// True while every document indexed this field with positions.
    pub has_positions: bool,
    /// True once any document indexed this field with norms.
    pub has_norms: bool,
}

impl FieldIndex {
    fn new(num_docs: usize) -> Self {
        FieldIndex {
            terms: FastMap::default(),
            lengths: vec![0; num_docs],
            doc_count: 0,
            total_length: 0,
            has_positions: true,
            has_norms: false,
        }
    }

    pub fn postings(&self, term: &str) -> &[Posting] {
        self.terms.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn doc_freq(&self, term: &str) -> u32 {
        self.postings(term).len() as u32
    }

    pub fn length(&self, doc: u32) -> u32 {
        self.lengths.get(doc as usize).copied().unwrap_or(0)
    }
}

/// A stored (retrievable) field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredField {
    pub name: String,
    pub text: String,
}

/// Inverted index of all text fields of a segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvertedIndex {
    pub fields: FastMap<String, FieldIndex>,
    /// Stored fields per document ordinal.
    pub stored: Vec<Vec<StoredField>>,
}

impl InvertedIndex {
    /// Build the index of a segment from analyzed documents.
    pub fn build(docs: &[AnalyzedDocument]) -> Self {
        let num_docs = docs.len();
        let mut fields: FastMap<String, FieldIndex> = FastMap::default();
        let mut stored = Vec::with_capacity(num_docs);

        for (ordinal, doc) in docs.iter().enumerate() {
            let ordinal = ordinal as u32;
            let mut doc_stored = Vec::new();

            for field in &doc.fields {
                let index = fields
                    .entry(field.name.clone())
                    .or_insert_with(|| FieldIndex::new(num_docs));
                index.add(ordinal, field);

                if let Some(text) = &field.stored {
                    doc_stored.push(StoredField {
                        name: field.name.clone(),
                        text: text.clone(),
                    });
                }
            }
            stored.push(doc_stored);
        }

        InvertedIndex { fields, stored }
    }

    pub fn field(&self, name: &str) -> Option<&FieldIndex> {
        self.fields.get(name)
    }

    /// Rebuild without deleted documents. `remap[old]` is the new ordinal.
    pub fn compact(&self, remap: &[Option<u32>], num_docs: usize) -> Self {
        let mut fields: FastMap<String, FieldIndex> = FastMap::default();

        for (name, field) in &self.fields {
            let mut compacted = FieldIndex::new(num_docs);
            compacted.has_positions = field.has_positions;
            compacted.has_norms = field.has_norms;

            for (old, &length) in field.lengths.iter().enumerate() {
                if let Some(new) = remap[old] {
                    compacted.lengths[new as usize] = length;
                    compacted.total_length += length as u64;
                }
            }
            for (term, postings) in &field.terms {
                let kept: Vec<Posting> = postings
                    .iter()
                    .filter_map(|p| {
                        remap[p.doc as usize].map(|doc| Posting {
                            doc,
                            freq: p.freq,
                            positions: p.positions.clone(),
                        })
                    })
                    .collect();
                if !kept.is_empty() {
                    compacted.terms.insert(term.clone(), kept);
                }
            }
            compacted.doc_count = count_docs_with_field(&compacted);
            if compacted.doc_count > 0 {
                fields.insert(name.clone(), compacted);
            }
        }

        let mut stored = vec![Vec::new(); num_docs];
        for (old, values) in self.stored.iter().enumerate() {
            if let Some(new) = remap[old] {
                stored[new as usize] = values.clone();
            }
        }

        InvertedIndex { fields, stored }
    }

    /// Concatenate several indexes; documents of `parts[i]` follow those of
    /// `parts[i - 1]`.
    pub fn concat(parts: Vec<InvertedIndex>) -> Self {
        let num_docs: usize = parts.iter().map(|p| p.stored.len()).sum();
        let mut fields: FastMap<String, FieldIndex> = FastMap::default();
        let mut stored = Vec::with_capacity(num_docs);
        let mut base = 0u32;

        for part in parts {
            let part_docs = part.stored.len() as u32;
            for (name, field) in part.fields {
                let merged = fields
                    .entry(name)
                    .or_insert_with(|| FieldIndex::new(num_docs));
                merged.has_positions &= field.has_positions;
                merged.has_norms |= field.has_norms;
                merged.doc_count += field.doc_count;
                merged.total_length += field.total_length;
                for (doc, length) in field.lengths.into_iter().enumerate() {
                    merged.lengths[base as usize + doc] = length;
                }
                for (term, postings) in field.terms {
                    let target = merged.terms.entry(term).or_default();
                    target.extend(postings.into_iter().map(|mut p| {
                        p.doc += base;
                        p
                    }));
                }
            }
            stored.extend(part.stored);
            base += part_docs;
        }

        InvertedIndex { fields, stored }
    }
}

fn count_docs_with_field(field: &FieldIndex) -> u32 {
    let mut seen = vec![false; field.lengths.len()];
    for postings in field.terms.values() {
        for p in postings {
            seen[p.doc as usize] = true;
        }
    }
    seen.into_iter().filter(|s| *s).count() as u32
}

impl FieldIndex {
    fn add(&mut self, ordinal: u32, field: &AnalyzedField) {
        let mut occurrences: FastMap<&str, Vec<u32>> = FastMap::default();
        for (term, position) in &field.tokens {
            occurrences.entry(term.as_str()).or_default().push(*position);
        }

        for (term, positions) in occurrences {
            let freq = if field.options.has_freqs() {
                positions.len() as u32
            } else {
                1
            };
            let positions = if field.options.has_positions() {
                positions
            } else {
                Vec::new()
            };
            self.terms.entry(term.to_string()).or_default().push(Posting {
                doc: ordinal,
                freq,
                positions,
            });
        }

        self.doc_count += 1;
        self.has_positions &= field.options.has_positions();
        if field.norms {
            let length = field.tokens.len() as u32;
            self.has_norms = true;
            self.lengths[ordinal as usize] = length;
            self.total_length += length as u64;
        }
    }
}

/// A text field after analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedField {
    pub name: String,
    /// `(term, position)` pairs in stream order.
    pub tokens: Vec<(String, u32)>,
    pub options: IndexOptions,
    pub norms: bool,
    pub stored: Option<String>,
}

/// A text document after analysis, ready for the in-memory buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedDocument {
    pub fields: Vec<AnalyzedField>,
}

impl AnalyzedDocument {
    /// Analyze every field with the analyzer configured for it.
    pub fn analyze(fields: &[TextField], analyzer: &PerFieldAnalyzer) -> Result<Self> {
        let mut analyzed: Vec<AnalyzedField> = Vec::with_capacity(fields.len());
        for field in fields {
            let tokens: Vec<(String, u32)> = analyzer
                .analyze_field(&field.name, &field.text)?
                .map(|token| (token.term, token.position))
                .collect();

            // Repeated field names are one multi-valued field
            if let Some(existing) = analyzed.iter_mut().find(|f| f.name == field.name) {
                let gap = existing.tokens.last().map(|(_, p)| p + 1).unwrap_or(0);
                existing
                    .tokens
                    .extend(tokens.into_iter().map(|(term, p)| (term, p + gap)));
                if field.store {
                    let stored = existing.stored.get_or_insert_with(String::new);
                    if !stored.is_empty() {
                        stored.push(' ');
                    }
                    stored.push_str(&field.text);
                }
                continue;
            }

            analyzed.push(AnalyzedField {
                name: field.name.clone(),
                tokens,
                options: field.index_options,
                norms: field.norms,
                stored: field.store.then(|| field.text.clone()),
            });
        }
        Ok(AnalyzedDocument { fields: analyzed })
    }

    /// Rough heap footprint used for RAM accounting.
    pub fn ram_bytes(&self) -> u64 {
        let mut bytes = 64u64;
        for field in &self.fields {
            bytes += 64 + field.name.len() as u64;
            bytes += field
                .tokens
                .iter()
                .map(|(term, _)| term.len() as u64 + 32)
                .sum::<u64>();
            bytes += field.stored.as_ref().map(|s| s.len() as u64).unwrap_or(0);
        }
        bytes
    }
}
