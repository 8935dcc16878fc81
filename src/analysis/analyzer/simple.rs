//! `lucene.simple`: letters only, lowercased. Digits and punctuation split
//! tokens and are discarded.

use std::sync::Arc;

use crate::analysis::analyzer::{Analyzer, PipelineAnalyzer};
use crate::analysis::token::TokenStream;
use crate::analysis::token_filter::LowercaseFilter;
use crate::analysis::tokenizer::RegexTokenizer;
use crate::error::Result;

#[derive(Clone, Debug)]
pub struct SimpleAnalyzer(PipelineAnalyzer);

impl SimpleAnalyzer {
    pub fn new() -> Result<Self> {
        let pipeline = PipelineAnalyzer::new(Arc::new(RegexTokenizer::letters()?))
            .add_filter(Arc::new(LowercaseFilter));
        Ok(SimpleAnalyzer(pipeline))
    }
}

impl Analyzer for SimpleAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        self.0.analyze(text)
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_digits_and_punctuation() {
        let analyzer = SimpleAnalyzer::new().unwrap();
        let terms: Vec<String> = analyzer
            .analyze("Rust2024 Edition, World-42_x")
            .unwrap()
            .map(|t| t.term)
            .collect();
        assert_eq!(terms, ["rust", "edition", "world", "x"]);
    }
}
