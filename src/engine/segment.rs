//! Immutable segments.
//!
//! A segment is written once, by a flush or a merge, and never modified.
//! Deletions against it are tracked outside the segment as a live-docs bit
//! set persisted in generation-numbered `.del` files.

use serde::{Deserialize, Serialize};

use crate::engine::directory::{Directory, decode_checksummed, encode_checksummed};
use crate::engine::hnsw::{HnswGraph, HnswParams};
use crate::engine::inverted::{AnalyzedDocument, FastMap, InvertedIndex, StoredField};
use crate::engine::similarity::Similarity;
use crate::error::{LucernaError, Result};

/// Indexed content of a segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SegmentBody {
    Vector {
        vectors: Vec<Vec<f32>>,
        graph: HnswGraph,
    },
    Text(InvertedIndex),
}

/// Serialized form of a segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentData {
    /// Document id per ordinal.
    pub ids: Vec<String>,
    pub body: SegmentBody,
}

impl SegmentData {
    /// Build a vector segment, including its HNSW graph.
    pub fn vector(
        ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
        similarity: Similarity,
        params: &HnswParams,
    ) -> Self {
        let graph = HnswGraph::build(&vectors, similarity, params);
        SegmentData {
            ids,
            body: SegmentBody::Vector { vectors, graph },
        }
    }

    /// Build a text segment from analyzed documents.
    pub fn text(ids: Vec<String>, docs: &[AnalyzedDocument]) -> Self {
        SegmentData {
            ids,
            body: SegmentBody::Text(InvertedIndex::build(docs)),
        }
    }
}

/// A loaded segment.
#[derive(Debug)]
pub struct Segment {
    name: String,
    data: SegmentData,
    id_map: FastMap<String, Vec<u32>>,
    size_bytes: u64,
}

impl Segment {
    fn new(name: String, data: SegmentData, size_bytes: u64) -> Self {
        let mut id_map: FastMap<String, Vec<u32>> = FastMap::default();
        for (ordinal, id) in data.ids.iter().enumerate() {
            id_map.entry(id.clone()).or_default().push(ordinal as u32);
        }
        Segment {
            name,
            data,
            id_map,
            size_bytes,
        }
    }

    /// Write a segment file and return the loaded segment.
    pub fn write(dir: &Directory, name: &str, data: SegmentData) -> Result<Self> {
        let bytes = encode_checksummed(&data)?;
        let size_bytes = dir.write(&segment_file_name(name), &bytes)?;
        Ok(Segment::new(name.to_string(), data, size_bytes))
    }

    /// Load a segment file.
    pub fn read(dir: &Directory, name: &str, expected_docs: u32) -> Result<Self> {
        let file_name = segment_file_name(name);
        let bytes = dir.read(&file_name)?;
        let data: SegmentData = decode_checksummed(&file_name, &bytes)?;
        if data.ids.len() != expected_docs as usize {
            return Err(LucernaError::corruption(format!(
                "{file_name}: expected {expected_docs} docs, found {}",
                data.ids.len()
            )));
        }
        Ok(Segment::new(name.to_string(), data, bytes.len() as u64))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc_count(&self) -> u32 {
        self.data.ids.len() as u32
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn id(&self, ordinal: u32) -> &str {
        &self.data.ids[ordinal as usize]
    }

    pub fn ids(&self) -> &[String] {
        &self.data.ids
    }

    /// Ordinals of all documents with this id.
    pub fn ordinals_of(&self, id: &str) -> &[u32] {
        self.id_map.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn body(&self) -> &SegmentBody {
        &self.data.body
    }

    pub fn stored_fields(&self, ordinal: u32) -> &[StoredField] {
        match &self.data.body {
            SegmentBody::Text(index) => index
                .stored
                .get(ordinal as usize)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            SegmentBody::Vector { .. } => &[],
        }
    }

    /// File names this segment owns for a given deletion generation.
    pub fn files(&self, del_gen: u64) -> Vec<String> {
        let mut files = vec![segment_file_name(&self.name)];
        if del_gen > 0 {
            files.push(del_file_name(&self.name, del_gen));
        }
        files
    }
}

pub fn segment_file_name(name: &str) -> String {
    format!("{name}.seg")
}

pub fn del_file_name(name: &str, del_gen: u64) -> String {
    format!("{name}_{del_gen}.del")
}

/// Name of the `n`-th segment of an index.
pub fn segment_name(n: u64) -> String {
    format!("_{n}")
}

/// Persist the deleted ordinals of a segment.
pub fn write_deletions(dir: &Directory, name: &str, del_gen: u64, deleted: &[u32]) -> Result<()> {
    let bytes = encode_checksummed(&deleted)?;
    dir.write(&del_file_name(name, del_gen), &bytes)?;
    Ok(())
}

/// Load the deleted ordinals of a segment.
pub fn read_deletions(dir: &Directory, name: &str, del_gen: u64) -> Result<Vec<u32>> {
    let file_name = del_file_name(name, del_gen);
    let bytes = dir.read(&file_name)?;
    decode_checksummed(&file_name, &bytes)
}
