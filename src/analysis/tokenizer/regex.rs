//! Pattern tokenizers. Every non-overlapping match becomes one token.

use std::sync::Arc;

use regex::Regex;

use super::Tokenizer;
use crate::analysis::token::{Token, TokenStream};
use crate::error::{LucernaError, Result};

/// Runs of word characters: letters, digits and underscore.
pub const WORD_PATTERN: &str = r"\w+";

/// Runs of letters; digits and punctuation separate tokens.
pub const LETTER_PATTERN: &str = r"\p{L}+";

#[derive(Clone, Debug)]
pub struct RegexTokenizer {
    regex: Arc<Regex>,
    name: &'static str,
}

impl RegexTokenizer {
    /// Word tokenizer used by `lucene.standard`.
    pub fn new() -> Result<Self> {
        Self::with_pattern(WORD_PATTERN, "word")
    }

    /// Letter tokenizer used by `lucene.simple`.
    pub fn letters() -> Result<Self> {
        Self::with_pattern(LETTER_PATTERN, "letter")
    }

    pub fn with_pattern(pattern: &str, name: &'static str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| LucernaError::config(format!("invalid tokenizer pattern {pattern:?}: {e}")))?;
        Ok(RegexTokenizer {
            regex: Arc::new(regex),
            name,
        })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

impl Tokenizer for RegexTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        // Matches borrow `text`, so the tokens are materialized up front.
        let tokens: Vec<Token> = self
            .regex
            .find_iter(text)
            .zip(0u32..)
            .map(|(m, position)| Token::new(m.as_str(), position).with_span(m.start(), m.end()))
            .collect();
        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
