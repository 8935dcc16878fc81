//! Text analysis for text indexes.
//!
//! Analyzers are addressed by the names clients use in index definitions and
//! queries: `lucene.standard` and `lucene.simple`.

use std::sync::Arc;

use crate::error::{LucernaError, Result};

pub mod analyzer;
pub mod token;
pub mod token_filter;
pub mod tokenizer;

pub use analyzer::{Analyzer, PerFieldAnalyzer, PipelineAnalyzer, SimpleAnalyzer, StandardAnalyzer};
pub use token::{Token, TokenStream};

/// Name of the word-tokenizing, lowercasing analyzer.
pub const STANDARD_ANALYZER: &str = "lucene.standard";

/// Name of the letter-tokenizing, lowercasing analyzer.
pub const SIMPLE_ANALYZER: &str = "lucene.simple";

/// Check that `name` refers to a known analyzer.
pub fn is_known_analyzer(name: &str) -> bool {
    matches!(name, STANDARD_ANALYZER | SIMPLE_ANALYZER)
}

/// Instantiate an analyzer by its client-facing name.
pub fn analyzer_from_name(name: &str) -> Result<Arc<dyn Analyzer>> {
    match name {
        STANDARD_ANALYZER => Ok(Arc::new(StandardAnalyzer::new()?)),
        SIMPLE_ANALYZER => Ok(Arc::new(SimpleAnalyzer::new()?)),
        _ => Err(LucernaError::config(format!("invalid analyzer {name}"))),
    }
}
