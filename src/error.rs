//! Error types for the Lucerna storage layer.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is
//! the [`LucernaError`] enum. The variants mirror the failure classes the
//! command layer needs to distinguish when it builds an error reply: bad
//! configuration, unknown or duplicate index names, vector dimension
//! mismatches, backup conflicts, timestamp regressions and disk failures.
//!
//! # Examples
//!
//! ```
//! use lucerna::error::{LucernaError, Result};
//!
//! fn open_index(name: &str) -> Result<()> {
//!     Err(LucernaError::not_found(name))
//! }
//!
//! match open_index("products") {
//!     Ok(_) => println!("found"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Lucerna operations.
///
/// This enum uses the `thiserror` crate for the `Error` implementation and
/// provides constructor helpers for the string-carrying variants.
#[derive(Error, Debug)]
pub enum LucernaError {
    /// I/O errors (commit, metadata persistence, directory removal).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or unrecognized index or server configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// An index with this name is already registered.
    #[error("index {0} already exists")]
    DuplicateName(String),

    /// No index with this name is registered.
    #[error("index {0} not found")]
    NotFound(String),

    /// A vector payload does not match the configured dimensionality.
    #[error("invalid vector length: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A backup is already outstanding for the index.
    #[error("backup is still in progress for index {0}")]
    BackupConflict(String),

    /// A write timestamp would move backwards.
    #[error("index {index}: old timestamp {current} greater than {requested}")]
    MonotonicityViolation {
        index: String,
        current: u64,
        requested: u64,
    },

    /// The index handle has been dropped from the catalog.
    #[error("index {0} has been dropped")]
    IndexDropped(String),

    /// The underlying writer has been closed.
    #[error("index writer is closed: {0}")]
    IndexClosed(String),

    /// A variant-specific operation was called on the other variant.
    #[error("index {index} is a {actual} index, not a {expected} index")]
    IndexKindMismatch {
        index: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The catalog has been shut down.
    #[error("index catalog is closed")]
    CatalogClosed,

    /// Query construction or execution errors.
    #[error("Query error: {0}")]
    InvalidQuery(String),

    /// Invalid argument supplied by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid operation for the current state or payload.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// On-disk data failed validation (checksum, truncated file).
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Binary serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for operations that may fail with LucernaError.
pub type Result<T> = std::result::Result<T, LucernaError>;

impl LucernaError {
    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        LucernaError::Config(msg.into())
    }

    /// Create a new duplicate name error.
    pub fn duplicate_name<S: Into<String>>(name: S) -> Self {
        LucernaError::DuplicateName(name.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        LucernaError::NotFound(name.into())
    }

    /// Create a new dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        LucernaError::DimensionMismatch { expected, actual }
    }

    /// Create a new backup conflict error.
    pub fn backup_conflict<S: Into<String>>(name: S) -> Self {
        LucernaError::BackupConflict(name.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        LucernaError::InvalidQuery(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        LucernaError::InvalidArgument(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        LucernaError::InvalidOperation(msg.into())
    }

    /// Create a new corruption error.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        LucernaError::Corruption(msg.into())
    }

    /// Create a new writer-closed error.
    pub fn closed<S: Into<String>>(msg: S) -> Self {
        LucernaError::IndexClosed(msg.into())
    }

    /// Attach an index name to a monotonicity violation raised by a single index.
    ///
    /// Other errors are returned unchanged.
    pub fn with_index(self, name: &str) -> Self {
        match self {
            LucernaError::MonotonicityViolation {
                current, requested, ..
            } => LucernaError::MonotonicityViolation {
                index: name.to_string(),
                current,
                requested,
            },
            other => other,
        }
    }
}

impl From<bincode::Error> for LucernaError {
    fn from(err: bincode::Error) -> Self {
        LucernaError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = LucernaError::not_found("v1");
        assert_eq!(error.to_string(), "index v1 not found");

        let error = LucernaError::duplicate_name("v1");
        assert_eq!(error.to_string(), "index v1 already exists");

        let error = LucernaError::dimension_mismatch(2, 3);
        assert_eq!(
            error.to_string(),
            "invalid vector length: expected 2, got 3"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = LucernaError::from(io_error);

        match error {
            LucernaError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_with_index_tags_monotonicity_violation() {
        let error = LucernaError::MonotonicityViolation {
            index: String::new(),
            current: 10,
            requested: 5,
        }
        .with_index("text1");

        match error {
            LucernaError::MonotonicityViolation {
                index,
                current,
                requested,
            } => {
                assert_eq!(index, "text1");
                assert_eq!(current, 10);
                assert_eq!(requested, 5);
            }
            _ => panic!("Expected monotonicity violation"),
        }

        let other = LucernaError::config("bad").with_index("text1");
        assert!(matches!(other, LucernaError::Config(_)));
    }
}
