//! What an index stores and how its documents are indexed.

use std::sync::Arc;

use crate::analysis::analyzer::PerFieldAnalyzer;
use crate::engine::document::{Document, DocumentBody};
use crate::engine::hnsw::HnswParams;
use crate::engine::similarity::Similarity;
use crate::error::{LucernaError, Result};

/// Schema of an index, fixed at creation.
#[derive(Debug, Clone)]
pub enum Schema {
    Vector {
        dimensions: usize,
        similarity: Similarity,
        hnsw: HnswParams,
    },
    Text {
        analyzer: Arc<PerFieldAnalyzer>,
    },
}

impl Schema {
    pub fn kind(&self) -> &'static str {
        match self {
            Schema::Vector { .. } => "vector",
            Schema::Text { .. } => "text",
        }
    }

    pub fn similarity(&self) -> Option<Similarity> {
        match self {
            Schema::Vector { similarity, .. } => Some(*similarity),
            Schema::Text { .. } => None,
        }
    }

    /// Check that a document fits this schema.
    pub fn check(&self, doc: &Document) -> Result<()> {
        match (self, &doc.body) {
            (Schema::Vector { dimensions, .. }, DocumentBody::Vector(vector)) => {
                if vector.len() != *dimensions {
                    return Err(LucernaError::dimension_mismatch(*dimensions, vector.len()));
                }
                Ok(())
            }
            (Schema::Text { .. }, DocumentBody::Text(_)) => Ok(()),
            _ => Err(LucernaError::invalid_operation(format!(
                "cannot add a {} document to a {} index",
                doc.kind(),
                self.kind()
            ))),
        }
    }
}
