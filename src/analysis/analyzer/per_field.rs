//! Field-aware analysis for text indexes.
//!
//! A text index is defined with one default analyzer name and optional
//! overrides per field. Both indexing and query building resolve the
//! analyzer through [`PerFieldAnalyzer::field_analyzer`], so a field is
//! always searched with the analyzer it was indexed with unless a query
//! names another one explicitly.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use crate::analysis::analyzer::Analyzer;
use crate::analysis::analyzer_from_name;
use crate::analysis::token::TokenStream;
use crate::error::Result;

/// ```
/// use std::sync::Arc;
///
/// use lucerna::analysis::analyzer::{PerFieldAnalyzer, SimpleAnalyzer, StandardAnalyzer};
///
/// let mut analyzer = PerFieldAnalyzer::new(Arc::new(StandardAnalyzer::new().unwrap()));
/// analyzer.add_analyzer("sku", Arc::new(SimpleAnalyzer::new().unwrap()));
///
/// assert_eq!(analyzer.analyze_field("sku", "R2D2").unwrap().count(), 2);
/// assert_eq!(analyzer.analyze_field("body", "R2D2").unwrap().count(), 1);
/// ```
#[derive(Clone)]
pub struct PerFieldAnalyzer {
    default: Arc<dyn Analyzer>,
    fields: AHashMap<String, Arc<dyn Analyzer>>,
}

impl PerFieldAnalyzer {
    pub fn new(default: Arc<dyn Analyzer>) -> Self {
        PerFieldAnalyzer {
            default,
            fields: AHashMap::new(),
        }
    }

    /// Resolve analyzer names such as `lucene.standard`; an unknown name is a
    /// configuration error.
    pub fn from_names(default: &str, per_field: &BTreeMap<String, String>) -> Result<Self> {
        let mut analyzer = Self::new(analyzer_from_name(default)?);
        for (field, name) in per_field {
            analyzer.add_analyzer(field.clone(), analyzer_from_name(name)?);
        }
        Ok(analyzer)
    }

    pub fn add_analyzer(&mut self, field: impl Into<String>, analyzer: Arc<dyn Analyzer>) {
        self.fields.insert(field.into(), analyzer);
    }

    pub fn field_analyzer(&self, field: &str) -> &Arc<dyn Analyzer> {
        self.fields.get(field).unwrap_or(&self.default)
    }

    pub fn default_analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.default
    }

    pub fn analyze_field(&self, field: &str, text: &str) -> Result<TokenStream> {
        self.field_analyzer(field).analyze(text)
    }
}

impl Analyzer for PerFieldAnalyzer {
    /// Field-less analysis falls back to the default analyzer.
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        self.default.analyze(text)
    }

    fn name(&self) -> &'static str {
        "per_field"
    }
}

impl fmt::Debug for PerFieldAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: BTreeMap<&str, &str> = self
            .fields
            .iter()
            .map(|(field, analyzer)| (field.as_str(), analyzer.name()))
            .collect();
        f.debug_struct("PerFieldAnalyzer")
            .field("default", &self.default.name())
            .field("fields", &fields)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LucernaError;

    fn overrides(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(field, name)| (field.to_string(), name.to_string()))
            .collect()
    }

    #[test]
    fn test_override_applies_to_its_field_only() {
        let analyzer =
            PerFieldAnalyzer::from_names("lucene.standard", &overrides(&[("code", "lucene.simple")])).unwrap();

        let title: Vec<String> = analyzer.analyze_field("title", "Model T1000").unwrap().map(|t| t.term).collect();
        assert_eq!(title, ["model", "t1000"]);

        let code: Vec<String> = analyzer.analyze_field("code", "Model T1000").unwrap().map(|t| t.term).collect();
        assert_eq!(code, ["model", "t"]);

        assert_eq!(analyzer.field_analyzer("code").name(), "simple");
        assert_eq!(analyzer.field_analyzer("other").name(), "standard");
    }

    #[test]
    fn test_unknown_analyzer_names() {
        assert!(matches!(
            PerFieldAnalyzer::from_names("lucene.standard", &overrides(&[("code", "lucene.klingon")])),
            Err(LucernaError::Config(_))
        ));
        assert!(PerFieldAnalyzer::from_names("whitespace", &BTreeMap::new()).is_err());
    }
}
