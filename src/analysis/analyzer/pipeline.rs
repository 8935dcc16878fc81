//! Tokenizer plus an ordered chain of filters.
//!
//! ```
//! use std::sync::Arc;
//!
//! use lucerna::analysis::analyzer::{Analyzer, PipelineAnalyzer};
//! use lucerna::analysis::token_filter::LowercaseFilter;
//! use lucerna::analysis::tokenizer::RegexTokenizer;
//!
//! let analyzer = PipelineAnalyzer::new(Arc::new(RegexTokenizer::new().unwrap()))
//!     .add_filter(Arc::new(LowercaseFilter));
//! let terms: Vec<_> = analyzer.analyze("Hello World").unwrap().map(|t| t.term).collect();
//! assert_eq!(terms, ["hello", "world"]);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::analysis::analyzer::Analyzer;
use crate::analysis::token::TokenStream;
use crate::analysis::token_filter::Filter;
use crate::analysis::tokenizer::Tokenizer;
use crate::error::Result;

#[derive(Clone)]
pub struct PipelineAnalyzer {
    tokenizer: Arc<dyn Tokenizer>,
    filters: Vec<Arc<dyn Filter>>,
}

impl PipelineAnalyzer {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        PipelineAnalyzer {
            tokenizer,
            filters: Vec::new(),
        }
    }

    /// Append a filter; filters run in insertion order.
    pub fn add_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }
}

impl Analyzer for PipelineAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        self.filters
            .iter()
            .try_fold(self.tokenizer.tokenize(text)?, |tokens, filter| filter.filter(tokens))
    }

    fn name(&self) -> &'static str {
        "pipeline"
    }
}

impl fmt::Debug for PipelineAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filters: Vec<&str> = self.filters.iter().map(|filter| filter.name()).collect();
        f.debug_struct("PipelineAnalyzer")
            .field("tokenizer", &self.tokenizer.name())
            .field("filters", &filters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::token::Token;
    use crate::analysis::token_filter::LowercaseFilter;
    use crate::analysis::tokenizer::RegexTokenizer;

    /// Drops terms shorter than three bytes.
    struct MinLength;

    impl Filter for MinLength {
        fn filter(&self, tokens: TokenStream) -> Result<TokenStream> {
            Ok(Box::new(tokens.filter(|t| t.term.len() >= 3)))
        }

        fn name(&self) -> &'static str {
            "min_length"
        }
    }

    #[test]
    fn test_dropped_tokens_leave_position_gaps() {
        let analyzer = PipelineAnalyzer::new(Arc::new(RegexTokenizer::new().unwrap()))
            .add_filter(Arc::new(LowercaseFilter))
            .add_filter(Arc::new(MinLength));

        let tokens: Vec<Token> = analyzer.analyze("An Apple a DAY").unwrap().collect();

        let got: Vec<(&str, u32)> = tokens.iter().map(|t| (t.term.as_str(), t.position)).collect();
        assert_eq!(got, [("apple", 1), ("day", 3)]);
    }

    #[test]
    fn test_debug_lists_stages() {
        let analyzer = PipelineAnalyzer::new(Arc::new(RegexTokenizer::letters().unwrap()))
            .add_filter(Arc::new(LowercaseFilter));
        let debug = format!("{analyzer:?}");
        assert!(debug.contains("letter"));
        assert!(debug.contains("lowercase"));
    }
}
