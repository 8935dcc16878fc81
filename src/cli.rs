//! Command line interface for operating a Lucerna catalog directory.

pub mod args;
pub mod commands;
pub mod output;

pub use args::*;
pub use commands::*;
pub use output::*;
