//! Token filters: stream-to-stream transformations applied after
//! tokenization. A filter may rewrite terms or drop tokens, but never
//! renumbers positions.

use crate::analysis::token::TokenStream;
use crate::error::Result;

pub trait Filter: Send + Sync {
    fn filter(&self, tokens: TokenStream) -> Result<TokenStream>;

    /// Short name shown in analyzer debug output.
    fn name(&self) -> &'static str;
}

pub mod lowercase;

pub use lowercase::LowercaseFilter;
