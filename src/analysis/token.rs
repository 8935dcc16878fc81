//! Terms produced by analysis.
//!
//! Positions count tokens, not bytes: a tokenizer numbers its output 0, 1,
//! 2, ... and filters that drop tokens leave the surviving positions alone,
//! so phrase queries over a filtered field still see the gaps.
//!
//! ```
//! use lucerna::analysis::token::Token;
//!
//! let token = Token::new("world", 1).with_span(6, 11);
//! assert_eq!(token.term, "world");
//! assert_eq!(token.position, 1);
//! assert_eq!(token.span(), 6..11);
//! ```

use std::ops::Range;

/// One analyzed term and where it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    /// Index in the tokenizer's output.
    pub position: u32,
    /// Byte offsets into the analyzed text.
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn new<S: Into<String>>(term: S, position: u32) -> Self {
        Token {
            term: term.into(),
            position,
            start: 0,
            end: 0,
        }
    }

    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Byte range of the source text this token covers.
    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Replace the term, keeping position and span.
    pub fn map_term(mut self, f: impl FnOnce(&str) -> String) -> Self {
        self.term = f(&self.term);
        self
    }
}

/// Tokens flowing through an analyzer.
pub type TokenStream = Box<dyn Iterator<Item = Token> + Send>;
