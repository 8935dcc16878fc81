//! Command implementations for the Lucerna CLI.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::clock::SystemClock;
use crate::config::{Parameters, ServerParameters};
use crate::error::{LucernaError, Result};
use crate::storage::{IndexCatalog, IndexConfig, QuerySpec, WriteBatch};

/// Execute a CLI command against the catalog at `args.root`.
pub fn execute_command(args: LucernaArgs) -> Result<()> {
    let params = match &args.params {
        Some(path) => ServerParameters::from_file(path)?,
        None => ServerParameters::default(),
    };
    let catalog = IndexCatalog::open(&args.root, Arc::new(Parameters::new(params)?), Arc::new(SystemClock))?;

    let result = match &args.command {
        Command::List => list_indexes(&catalog, &args),
        Command::Create(create_args) => create_index(&catalog, create_args, &args),
        Command::Drop(drop_args) => drop_index(&catalog, drop_args, &args),
        Command::Write(write_args) => write_batch(&catalog, write_args, &args),
        Command::Commit(commit_args) => commit_index(&catalog, commit_args, &args),
        Command::Knn(knn_args) => knn(&catalog, knn_args, &args),
        Command::Search(search_args) => search(&catalog, search_args, &args),
        Command::Backup(backup_args) => backup(&catalog, backup_args, &args),
        Command::Stats(stats_args) => show_stats(&catalog, stats_args, &args),
        Command::Maintain => maintain(&catalog, &args),
    };
    let closed = catalog.close();
    result.and(closed)
}

fn list_indexes(catalog: &IndexCatalog, args: &LucernaArgs) -> Result<()> {
    let configs = catalog.index_configs()?;
    output_result(&format!("{} index(es)", configs.len()), &configs, args)
}

fn create_index(catalog: &IndexCatalog, create_args: &CreateArgs, args: &LucernaArgs) -> Result<()> {
    let config: IndexConfig = serde_json::from_slice(&fs::read(&create_args.config_file)?)?;
    let index = catalog.create_index(config)?;
    output_result("Index created", &index.stats(), args)
}

fn drop_index(catalog: &IndexCatalog, drop_args: &DropArgs, args: &LucernaArgs) -> Result<()> {
    catalog.drop_index(&drop_args.index)?;
    output_result("Index dropped", &drop_args.index, args)
}

fn write_batch(catalog: &IndexCatalog, write_args: &WriteArgs, args: &LucernaArgs) -> Result<()> {
    let batch = WriteBatch::from_json(&fs::read_to_string(&write_args.batch_file)?)?;
    let index = match &write_args.index {
        Some(index) => index.clone(),
        None if !batch.index_name().is_empty() => batch.index_name().to_string(),
        None => {
            return Err(LucernaError::invalid_argument(
                "batch has no indexName; pass --index",
            ));
        }
    };

    if let Some(ts) = write_args.timestamp {
        catalog.advance_write_timestamp(ts)?;
    }
    catalog.batch_write(&index, &batch)?;
    if write_args.commit {
        catalog.commit(&index)?;
    }

    let result = WriteResult {
        index,
        ops: batch.len(),
        committed: write_args.commit || batch.is_auto_commit(),
    };
    output_result("Batch applied", &result, args)
}

fn commit_index(catalog: &IndexCatalog, commit_args: &CommitArgs, args: &LucernaArgs) -> Result<()> {
    catalog.commit(&commit_args.index)?;
    let stats = catalog
        .get_index(&commit_args.index)
        .ok_or_else(|| LucernaError::not_found(&commit_args.index))?
        .stats();
    output_result("Index committed", &stats, args)
}

fn knn(catalog: &IndexCatalog, knn_args: &KnnArgs, args: &LucernaArgs) -> Result<()> {
    let start = Instant::now();
    let candidates = knn_args.candidates.unwrap_or(knn_args.k);
    let ids = catalog.knn(&knn_args.index, &knn_args.vector, knn_args.k, candidates)?;
    let results = QueryResults {
        index: knn_args.index.clone(),
        ids,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    output_result("Nearest neighbours", &results, args)
}

fn search(catalog: &IndexCatalog, search_args: &SearchArgs, args: &LucernaArgs) -> Result<()> {
    let start = Instant::now();
    let spec = QuerySpec::from_json(&search_args.query)?;
    let ids = catalog.search_spec(&search_args.index, &spec, search_args.limit)?;
    let results = QueryResults {
        index: search_args.index.clone(),
        ids,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    output_result("Search results", &results, args)
}

fn backup(catalog: &IndexCatalog, backup_args: &BackupArgs, args: &LucernaArgs) -> Result<()> {
    let files = catalog.begin_backup()?;
    let copied = match &backup_args.dest {
        Some(dest) => copy_files(catalog.root(), &files, dest),
        None => Ok(()),
    };
    let ended = catalog.end_backup();
    copied?;
    ended?;

    let result = BackupResult {
        files: files.iter().map(|f| f.display().to_string()).collect(),
        copied_to: backup_args.dest.as_ref().map(|d| d.display().to_string()),
    };
    output_result("Backup files", &result, args)
}

/// Copy `files` into `dest`, keeping their paths relative to `root`.
fn copy_files(root: &Path, files: &[std::path::PathBuf], dest: &Path) -> Result<()> {
    for file in files {
        let relative = file.strip_prefix(root).map_err(|_| {
            LucernaError::invalid_operation(format!("{} is outside the catalog root", file.display()))
        })?;
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(file, &target)?;
    }
    Ok(())
}

fn show_stats(catalog: &IndexCatalog, stats_args: &StatsArgs, args: &LucernaArgs) -> Result<()> {
    match &stats_args.index {
        Some(name) => {
            let index = catalog
                .get_index(name)
                .ok_or_else(|| LucernaError::not_found(name))?;
            output_result("Index statistics", &index.stats(), args)
        }
        None => output_result("Index statistics", &catalog.index_stats()?, args),
    }
}

fn maintain(catalog: &IndexCatalog, args: &LucernaArgs) -> Result<()> {
    let report = catalog.run_maintenance_tick()?;
    output_result("Maintenance tick", &report, args)
}
