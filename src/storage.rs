//! Index storage layer.
//!
//! This module manages the set of named indexes a server exposes. Each index
//! lives in its own directory under a catalog root and is either a vector
//! index (HNSW nearest-neighbour search) or a text index (BM25 full-text
//! search).
//!
//! # Architecture
//!
//! - **IndexCatalog**: registry of indexes, persisted metadata file and the
//!   background maintenance thread
//! - **IndexAccess**: one index's writer, published reader snapshot, logical
//!   timestamps and backup handle
//! - **WriteBatch**: ordered insert/update/delete operations for one index
//! - **IndexConfig**: index definition with its vector or text settings
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use lucerna::clock::ManualClock;
//! use lucerna::config::Parameters;
//! use lucerna::engine::TextField;
//! use lucerna::storage::{IndexCatalog, IndexConfig, QuerySpec, TextConfig, WriteBatch};
//!
//! # fn main() -> lucerna::error::Result<()> {
//! let root = tempfile::tempdir()?;
//! let catalog = IndexCatalog::open(
//!     root.path(),
//!     Arc::new(Parameters::default()),
//!     Arc::new(ManualClock::new(0)),
//! )?;
//! catalog.create_index(IndexConfig::text("docs", "docs", TextConfig::default()))?;
//!
//! let batch = WriteBatch::new("docs")
//!     .insert_text("a", vec![TextField::new("title", "Red running shoes")])
//!     .insert_text("b", vec![TextField::new("title", "Blue sandals")])
//!     .with_auto_commit(true);
//! catalog.batch_write("docs", &batch)?;
//!
//! let query = QuerySpec::from_json(r#"{"text": {"query": "shoes", "path": "title"}}"#)?;
//! assert_eq!(catalog.search_spec("docs", &query, 10)?, vec!["a"]);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod index_access;
pub mod index_config;
pub mod maintenance;
pub mod metadata;
pub mod query_spec;
pub mod text_index;
pub mod vector_index;
pub mod write_batch;

pub use catalog::{CatalogState, IndexCatalog};
pub use index_access::{IndexAccess, IndexState, IndexStats, IndexVariant};
pub use index_config::{IndexConfig, IndexKind, TextConfig, VectorConfig};
pub use maintenance::MaintenanceReport;
pub use query_spec::{CompoundQuerySpec, QuerySpec, TextQuerySpec};
pub use write_batch::{OpKind, Payload, WriteBatch, WriteOp};
