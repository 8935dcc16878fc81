//! Embedded indexing engine.
//!
//! Each index is a directory of immutable segments plus commit points. The
//! engine exposes a mutator/reader pair per index:
//!
//! - [`IndexWriter`]: thread-safe add/update/delete, RAM-bounded buffering,
//!   commits, merges and commit retention for backups
//! - [`IndexSnapshot`]: an immutable view of one commit answering
//!   nearest-neighbour and text queries
//!
//! Vector segments carry an HNSW graph, text segments an inverted index with
//! BM25 scoring.

pub mod commit;
pub mod directory;
pub mod document;
pub mod hnsw;
pub mod inverted;
pub mod merge;
pub mod query;
pub mod schema;
pub mod segment;
pub mod similarity;
pub mod snapshot;
pub mod writer;

pub use commit::{CommitHandle, CommitPoint};
pub use directory::Directory;
pub use document::{Document, DocumentBody, IndexOptions, TextField};
pub use hnsw::HnswParams;
pub use merge::{MergeScheduler, TieredMergePolicy};
pub use query::{BooleanQuery, Query};
pub use schema::Schema;
pub use similarity::Similarity;
pub use snapshot::{Hit, IndexSnapshot};
pub use writer::{IndexWriter, WriterConfig};
