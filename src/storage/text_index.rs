//! Text variant of an index.

use std::sync::Arc;

use crate::analysis::analyzer::PerFieldAnalyzer;
use crate::config::Parameters;
use crate::engine::document::Document;
use crate::engine::query::Query;
use crate::engine::schema::Schema;
use crate::error::{LucernaError, Result};
use crate::storage::index_config::TextConfig;
use crate::storage::write_batch::{Payload, WriteOp};

/// Inverted-index settings: the analyzers of every field.
#[derive(Debug, Clone)]
pub struct TextIndex {
    analyzer: Arc<PerFieldAnalyzer>,
}

impl TextIndex {
    pub fn new(config: &TextConfig) -> Result<Self> {
        let analyzer = PerFieldAnalyzer::from_names(&config.default_analyzer, &config.per_field_analyzer)?;
        Ok(TextIndex {
            analyzer: Arc::new(analyzer),
        })
    }

    /// Analyzers used at index time, also used to analyze query text.
    pub fn analyzer(&self) -> &Arc<PerFieldAnalyzer> {
        &self.analyzer
    }

    pub fn schema(&self) -> Schema {
        Schema::Text {
            analyzer: Arc::clone(&self.analyzer),
        }
    }

    pub fn max_merged_segment_bytes(&self, params: &Parameters) -> u64 {
        params.inverted_index_max_segment_bytes()
    }

    pub fn validate(&self, op: &WriteOp) -> Result<()> {
        match op.payload() {
            Payload::Text(fields) => {
                if let Some(field) = fields.iter().find(|f| f.name.is_empty()) {
                    return Err(LucernaError::invalid_operation(format!(
                        "empty field name in document {} (text {:?})",
                        op.id(),
                        field.text
                    )));
                }
                Ok(())
            }
            Payload::None if op.is_delete() => Ok(()),
            Payload::None => Err(LucernaError::invalid_operation(format!(
                "{} op for id {} carries no fields",
                op.kind().as_str(),
                op.id()
            ))),
            Payload::Vector(_) => Err(LucernaError::invalid_operation(format!(
                "vector for id {} sent to a text index",
                op.id()
            ))),
        }
    }

    pub fn to_document(&self, op: &WriteOp) -> Option<Document> {
        match op.payload() {
            Payload::Text(fields) => Some(Document::text(op.id(), fields.clone())),
            _ => None,
        }
    }

    /// Free-text query over `field` analyzed like the field itself.
    pub fn text_query(&self, field: &str, text: &str, match_all: bool) -> Result<Query> {
        Query::text(field, text, self.analyzer.field_analyzer(field).as_ref(), match_all)
    }
}
