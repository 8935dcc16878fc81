//! Index definitions.
//!
//! An [`IndexConfig`] names an index, places it in a subdirectory of the
//! catalog root and carries exactly one variant configuration: `hnswConfig`
//! for vector indexes or `searchConfig` for text indexes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::analysis::{STANDARD_ANALYZER, is_known_analyzer};
use crate::engine::hnsw::HnswParams;
use crate::engine::similarity::Similarity;
use crate::error::{LucernaError, Result};

/// The two kinds of index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Vector,
    Text,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Vector => "vector",
            IndexKind::Text => "text",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of a vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorConfig {
    pub dimensions: usize,
    pub ef_construction: usize,
    #[serde(rename = "maxConn")]
    pub max_connections: usize,
    /// `euclidean`, `cosine` or `dotProduct`.
    pub similarity: String,
}

impl VectorConfig {
    pub fn new(dimensions: usize, similarity: Similarity) -> Self {
        let defaults = HnswParams::default();
        VectorConfig {
            dimensions,
            ef_construction: defaults.ef_construction,
            max_connections: defaults.max_connections,
            similarity: similarity.name().to_string(),
        }
    }

    pub fn similarity(&self) -> Result<Similarity> {
        self.similarity.parse()
    }

    pub fn hnsw_params(&self) -> HnswParams {
        HnswParams::new(self.max_connections, self.ef_construction)
    }

    fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(LucernaError::config("dimensions must be > 0"));
        }
        self.hnsw_params().validate()?;
        self.similarity()?;
        Ok(())
    }
}

/// Configuration of a text index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextConfig {
    pub default_analyzer: String,
    #[serde(default)]
    pub per_field_analyzer: BTreeMap<String, String>,
}

impl Default for TextConfig {
    fn default() -> Self {
        TextConfig {
            default_analyzer: STANDARD_ANALYZER.to_string(),
            per_field_analyzer: BTreeMap::new(),
        }
    }
}

impl TextConfig {
    pub fn with_field_analyzer<F: Into<String>, A: Into<String>>(mut self, field: F, analyzer: A) -> Self {
        self.per_field_analyzer.insert(field.into(), analyzer.into());
        self
    }

    fn validate(&self) -> Result<()> {
        let names = std::iter::once(&self.default_analyzer).chain(self.per_field_analyzer.values());
        for name in names {
            if !is_known_analyzer(name) {
                return Err(LucernaError::config(format!("invalid analyzer {name}")));
            }
        }
        Ok(())
    }
}

/// Definition of one index of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfig {
    pub name: String,
    /// Directory of the index, relative to the catalog root.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hnsw_config: Option<VectorConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_config: Option<TextConfig>,
}

impl IndexConfig {
    pub fn vector<N: Into<String>, P: Into<String>>(name: N, path: P, config: VectorConfig) -> Self {
        IndexConfig {
            name: name.into(),
            path: path.into(),
            hnsw_config: Some(config),
            search_config: None,
        }
    }

    pub fn text<N: Into<String>, P: Into<String>>(name: N, path: P, config: TextConfig) -> Self {
        IndexConfig {
            name: name.into(),
            path: path.into(),
            hnsw_config: None,
            search_config: Some(config),
        }
    }

    /// Check the definition; every problem is a `Config` error.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(LucernaError::config("index name must not be empty"));
        }
        validate_relative_path(&self.path)?;
        match (&self.hnsw_config, &self.search_config) {
            (Some(vector), None) => vector.validate(),
            (None, Some(text)) => text.validate(),
            (Some(_), Some(_)) => Err(LucernaError::config(format!(
                "index {} has both hnswConfig and searchConfig",
                self.name
            ))),
            (None, None) => Err(LucernaError::config("unknown index config type")),
        }
    }

    /// Kind of the index. Meaningful once [`IndexConfig::validate`] passed.
    pub fn kind(&self) -> IndexKind {
        if self.hnsw_config.is_some() {
            IndexKind::Vector
        } else {
            IndexKind::Text
        }
    }
}

fn validate_relative_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(LucernaError::config("index path must not be empty"));
    }
    let escapes = Path::new(path)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(LucernaError::config(format!(
            "index path {path} must be a plain relative path"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_config_json() {
        let json = r#"{
            "name": "v1",
            "path": "v1_dir",
            "hnswConfig": {"dimensions": 2, "efConstruction": 100, "maxConn": 16, "similarity": "euclidean"}
        }"#;
        let config: IndexConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.kind(), IndexKind::Vector);

        let vector = config.hnsw_config.as_ref().unwrap();
        assert_eq!(vector.max_connections, 16);
        assert_eq!(vector.similarity().unwrap(), Similarity::Euclidean);

        let out = serde_json::to_string(&config).unwrap();
        assert!(out.contains("\"maxConn\":16"));
        assert!(!out.contains("searchConfig"));
    }

    #[test]
    fn test_text_config_json() {
        let json = r#"{
            "name": "t1",
            "path": "t1",
            "searchConfig": {"defaultAnalyzer": "lucene.standard", "perFieldAnalyzer": {"tag": "lucene.simple"}}
        }"#;
        let config: IndexConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.kind(), IndexKind::Text);
    }

    #[test]
    fn test_invalid_configs() {
        let vector = VectorConfig::new(2, Similarity::Cosine);
        let cases = vec![
            IndexConfig::vector("", "p", vector.clone()),
            IndexConfig::vector("a", "", vector.clone()),
            IndexConfig::vector("a", "../outside", vector.clone()),
            IndexConfig::vector("a", "/abs", vector.clone()),
            IndexConfig::vector("a", "p", VectorConfig { dimensions: 0, ..vector.clone() }),
            IndexConfig::vector(
                "a",
                "p",
                VectorConfig {
                    similarity: "manhattan".into(),
                    ..vector.clone()
                },
            ),
            IndexConfig::text("a", "p", TextConfig::default().with_field_analyzer("f", "lucene.klingon")),
            IndexConfig {
                name: "a".into(),
                path: "p".into(),
                hnsw_config: Some(vector),
                search_config: Some(TextConfig::default()),
            },
            IndexConfig {
                name: "a".into(),
                path: "p".into(),
                hnsw_config: None,
                search_config: None,
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(LucernaError::Config(_))),
                "{config:?} should be rejected"
            );
        }
    }
}
