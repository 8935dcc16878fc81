//! Analyzers turn field text into the terms stored in the inverted index.
//!
//! ```text
//! text -> Tokenizer -> Filter .. Filter -> terms
//! ```
//!
//! [`StandardAnalyzer`] and [`SimpleAnalyzer`] back the two named analyzers
//! an index definition may reference. [`PipelineAnalyzer`] builds arbitrary
//! chains and [`PerFieldAnalyzer`] routes each field to its own analyzer.

use crate::analysis::token::TokenStream;
use crate::error::Result;

pub mod per_field;
pub mod pipeline;
pub mod simple;
pub mod standard;

pub use per_field::PerFieldAnalyzer;
pub use pipeline::PipelineAnalyzer;
pub use simple::SimpleAnalyzer;
pub use standard::StandardAnalyzer;

/// Shared by every writer thread of an index, hence `Send + Sync`.
pub trait Analyzer: Send + Sync {
    /// ```
    /// use lucerna::analysis::analyzer::{Analyzer, StandardAnalyzer};
    ///
    /// let analyzer = StandardAnalyzer::new().unwrap();
    /// let tokens: Vec<_> = analyzer.analyze("The quick brown fox").unwrap().collect();
    /// assert_eq!(tokens.len(), 4);
    /// assert_eq!(tokens[0].term, "the");
    /// ```
    fn analyze(&self, text: &str) -> Result<TokenStream>;

    fn name(&self) -> &'static str;
}
