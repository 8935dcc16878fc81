//! JSON query descriptions accepted by the command layer.
//!
//! Two operators are understood:
//!
//! ```json
//! {"text": {"query": "red \"running shoes\"", "path": "title", "matchAll": true}}
//! {"compound": {"must": [...], "mustNot": [...], "should": [...], "filter": [...]}}
//! ```
//!
//! A [`QuerySpec`] is turned into an engine [`Query`] with the analyzers of
//! the target index, so query text is tokenized like the indexed text.

use serde::{Deserialize, Serialize};

use crate::analysis::analyzer::PerFieldAnalyzer;
use crate::analysis::analyzer_from_name;
use crate::engine::query::{BooleanQuery, Query};
use crate::error::{LucernaError, Result};

/// A parsed query operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub enum QuerySpec {
    Text(TextQuerySpec),
    Compound(CompoundQuerySpec),
}

/// Free text matched against one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextQuerySpec {
    pub query: String,
    pub path: String,
    /// Analyzer name overriding the field's own analyzer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_analyzer: Option<String>,
    #[serde(default)]
    pub match_all: bool,
}

/// Boolean combination of nested operators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundQuerySpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<QuerySpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<QuerySpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<QuerySpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<QuerySpec>,
}

impl QuerySpec {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LucernaError::query(format!("invalid query: {e}")))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| LucernaError::query(format!("invalid query: {e}")))
    }

    /// Build the engine query, analyzing text with `analyzer`.
    pub fn to_query(&self, analyzer: &PerFieldAnalyzer) -> Result<Query> {
        match self {
            QuerySpec::Text(text) => text.to_query(analyzer),
            QuerySpec::Compound(compound) => compound.to_query(analyzer),
        }
    }
}

impl TextQuerySpec {
    fn to_query(&self, analyzer: &PerFieldAnalyzer) -> Result<Query> {
        if self.path.is_empty() {
            return Err(LucernaError::query("text operator requires a path"));
        }
        match &self.search_analyzer {
            Some(name) => {
                let search_analyzer = analyzer_from_name(name).map_err(|_| {
                    LucernaError::query(format!("unknown search analyzer {name}"))
                })?;
                Query::text(&self.path, &self.query, search_analyzer.as_ref(), self.match_all)
            }
            None => Query::text(
                &self.path,
                &self.query,
                analyzer.field_analyzer(&self.path).as_ref(),
                self.match_all,
            ),
        }
    }
}

impl CompoundQuerySpec {
    fn to_query(&self, analyzer: &PerFieldAnalyzer) -> Result<Query> {
        let convert = |specs: &[QuerySpec]| -> Result<Vec<Query>> {
            specs.iter().map(|spec| spec.to_query(analyzer)).collect()
        };
        let query = BooleanQuery {
            must: convert(&self.must)?,
            should: convert(&self.should)?,
            must_not: convert(&self.must_not)?,
            filter: convert(&self.filter)?,
        };
        Ok(query.into())
    }
}
