//! Tokenizers split raw field text into positioned tokens.

use crate::analysis::token::TokenStream;
use crate::error::Result;

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<TokenStream>;

    /// Short name shown in analyzer debug output.
    fn name(&self) -> &'static str;
}

pub mod regex;

pub use self::regex::RegexTokenizer;
