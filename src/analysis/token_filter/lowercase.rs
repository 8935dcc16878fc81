//! Unicode lowercasing.
//!
//! ```
//! use lucerna::analysis::token::Token;
//! use lucerna::analysis::token_filter::{Filter, LowercaseFilter};
//!
//! let tokens = vec![Token::new("Vector", 0), Token::new("SEARCH", 1)];
//! let lowered: Vec<_> = LowercaseFilter
//!     .filter(Box::new(tokens.into_iter()))
//!     .unwrap()
//!     .map(|t| t.term)
//!     .collect();
//! assert_eq!(lowered, ["vector", "search"]);
//! ```

use crate::analysis::token::TokenStream;
use crate::analysis::token_filter::Filter;
use crate::error::Result;

/// Lowercases every term; positions and spans pass through.
#[derive(Clone, Copy, Debug, Default)]
pub struct LowercaseFilter;

impl LowercaseFilter {
    pub fn new() -> Self {
        LowercaseFilter
    }
}

impl Filter for LowercaseFilter {
    fn filter(&self, tokens: TokenStream) -> Result<TokenStream> {
        Ok(Box::new(tokens.map(|token| token.map_term(str::to_lowercase))))
    }

    fn name(&self) -> &'static str {
        "lowercase"
    }
}
