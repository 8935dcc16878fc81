//! Vector variant of an index.

use crate::config::Parameters;
use crate::engine::document::Document;
use crate::engine::hnsw::HnswParams;
use crate::engine::schema::Schema;
use crate::engine::similarity::Similarity;
use crate::error::{LucernaError, Result};
use crate::storage::index_config::VectorConfig;
use crate::storage::write_batch::{Payload, WriteOp};

/// HNSW-backed nearest-neighbour index settings.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimensions: usize,
    similarity: Similarity,
    hnsw: HnswParams,
}

impl VectorIndex {
    pub fn new(config: &VectorConfig) -> Result<Self> {
        Ok(VectorIndex {
            dimensions: config.dimensions,
            similarity: config.similarity()?,
            hnsw: config.hnsw_params(),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    pub fn schema(&self) -> Schema {
        Schema::Vector {
            dimensions: self.dimensions,
            similarity: self.similarity,
            hnsw: self.hnsw,
        }
    }

    pub fn max_merged_segment_bytes(&self, params: &Parameters) -> u64 {
        params.hnsw_max_segment_bytes()
    }

    /// Reject an operation this index cannot apply.
    pub fn validate(&self, op: &WriteOp) -> Result<()> {
        match op.payload() {
            Payload::Vector(vector) => self.check_dimensions(vector),
            Payload::None if op.is_delete() => Ok(()),
            Payload::None => Err(LucernaError::invalid_operation(format!(
                "{} op for id {} carries no vector",
                op.kind().as_str(),
                op.id()
            ))),
            Payload::Text(_) => Err(LucernaError::invalid_operation(format!(
                "text fields for id {} sent to a vector index",
                op.id()
            ))),
        }
    }

    pub fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(LucernaError::dimension_mismatch(self.dimensions, vector.len()));
        }
        Ok(())
    }

    /// The document written by an insert or update; `None` for deletes.
    pub fn to_document(&self, op: &WriteOp) -> Option<Document> {
        match op.payload() {
            Payload::Vector(vector) => Some(Document::vector(op.id(), vector.clone())),
            _ => None,
        }
    }
}
