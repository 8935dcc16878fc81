//! # Lucerna
//!
//! Multi-index storage catalog for a search server offering approximate
//! nearest-neighbour vector search and BM25 full-text search side by side.
//!
//! ## Features
//!
//! - Named vector (HNSW) and text (inverted index) indexes under one root
//! - Batched insert/update/delete with optional auto-commit
//! - Snapshot readers published atomically after each commit
//! - Logical write timestamps and backup retention per index
//! - Background commits bounded by memory and staleness limits
//!
//! ## Modules
//!
//! - [`storage`]: the catalog, index handles and write batches
//! - [`engine`]: the embedded segment/commit engine underneath
//! - [`analysis`]: tokenizers and analyzers for text fields
//! - [`config`]: server parameters
//! - [`clock`]: injectable wall clock

pub mod analysis;
pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod storage;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
