//! `lucene.standard`: word characters, lowercased, no stop words.
//!
//! ```
//! use lucerna::analysis::analyzer::{Analyzer, StandardAnalyzer};
//!
//! let analyzer = StandardAnalyzer::new().unwrap();
//! let terms: Vec<_> = analyzer.analyze("Hello the World2").unwrap().map(|t| t.term).collect();
//! assert_eq!(terms, ["hello", "the", "world2"]);
//! ```

use std::sync::Arc;

use crate::analysis::analyzer::{Analyzer, PipelineAnalyzer};
use crate::analysis::token::TokenStream;
use crate::analysis::token_filter::LowercaseFilter;
use crate::analysis::tokenizer::RegexTokenizer;
use crate::error::Result;

#[derive(Clone, Debug)]
pub struct StandardAnalyzer(PipelineAnalyzer);

impl StandardAnalyzer {
    pub fn new() -> Result<Self> {
        let pipeline = PipelineAnalyzer::new(Arc::new(RegexTokenizer::new()?))
            .add_filter(Arc::new(LowercaseFilter));
        Ok(StandardAnalyzer(pipeline))
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        self.0.analyze(text)
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}
