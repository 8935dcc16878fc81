//! Command line argument parsing for the Lucerna CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Lucerna - vector and full-text index catalog
#[derive(Parser, Debug, Clone)]
#[command(name = "lucerna")]
#[command(about = "Operate a Lucerna vector and full-text index catalog")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct LucernaArgs {
    /// Catalog root directory
    #[arg(short, long, env = "LUCERNA_ROOT", value_name = "DIR")]
    pub root: PathBuf,

    /// Server parameter file (JSON object of named parameters)
    #[arg(short, long, value_name = "FILE")]
    pub params: Option<PathBuf>,

    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl LucernaArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n + 1,
            }
        }
    }

    /// Default log filter for the verbosity level.
    pub fn log_filter(&self) -> &'static str {
        match self.verbosity() {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the indexes of the catalog
    List,

    /// Create an index from a JSON definition
    Create(CreateArgs),

    /// Drop an index and delete its directory
    Drop(DropArgs),

    /// Apply a JSON write batch
    Write(WriteArgs),

    /// Commit pending writes of an index
    Commit(CommitArgs),

    /// Nearest-neighbour query against a vector index
    Knn(KnnArgs),

    /// Text query against a text index
    Search(SearchArgs),

    /// Retain the current commits and list or copy their files
    Backup(BackupArgs),

    /// Show index statistics
    Stats(StatsArgs),

    /// Run one maintenance tick
    Maintain,
}

/// Arguments for creating an index
#[derive(Parser, Debug, Clone)]
pub struct CreateArgs {
    /// Index definition file (`{"name", "path", "hnswConfig" | "searchConfig"}`)
    #[arg(value_name = "CONFIG_FILE")]
    pub config_file: PathBuf,
}

/// Arguments for dropping an index
#[derive(Parser, Debug, Clone)]
pub struct DropArgs {
    /// Index name
    #[arg(value_name = "INDEX")]
    pub index: String,
}

/// Arguments for applying a write batch
#[derive(Parser, Debug, Clone)]
pub struct WriteArgs {
    /// Batch file (`{"indexName", "ops", "autoCommit"}`)
    #[arg(value_name = "BATCH_FILE")]
    pub batch_file: PathBuf,

    /// Target index (defaults to the batch's indexName)
    #[arg(short, long)]
    pub index: Option<String>,

    /// Logical write timestamp to record before applying the batch
    #[arg(long)]
    pub timestamp: Option<u64>,

    /// Commit after applying, regardless of autoCommit
    #[arg(long)]
    pub commit: bool,
}

/// Arguments for committing an index
#[derive(Parser, Debug, Clone)]
pub struct CommitArgs {
    /// Index name
    #[arg(value_name = "INDEX")]
    pub index: String,
}

/// Arguments for a nearest-neighbour query
#[derive(Parser, Debug, Clone)]
pub struct KnnArgs {
    /// Index name
    #[arg(value_name = "INDEX")]
    pub index: String,

    /// Query vector, comma separated
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    pub vector: Vec<f32>,

    /// Number of neighbours to return
    #[arg(short, long, default_value = "10")]
    pub k: usize,

    /// Candidate budget; defaults to k
    #[arg(short, long)]
    pub candidates: Option<usize>,
}

/// Arguments for a text query
#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    /// Index name
    #[arg(value_name = "INDEX")]
    pub index: String,

    /// Query JSON (`{"text": ...}` or `{"compound": ...}`)
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Maximum number of results to return
    #[arg(short, long, default_value = "10")]
    pub limit: usize,
}

/// Arguments for a backup
#[derive(Parser, Debug, Clone)]
pub struct BackupArgs {
    /// Copy the files into this directory instead of only listing them
    #[arg(short, long, value_name = "DIR")]
    pub dest: Option<PathBuf>,
}

/// Arguments for statistics
#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    /// Index name (default: all indexes)
    #[arg(value_name = "INDEX")]
    pub index: Option<String>,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
