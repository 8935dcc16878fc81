use std::sync::Arc;
use std::time::{Duration, Instant};

use lucerna::clock::{ManualClock, SystemClock};
use lucerna::config::{Parameters, ServerParameters};
use lucerna::engine::Similarity;
use lucerna::error::Result;
use lucerna::storage::{IndexCatalog, IndexConfig, VectorConfig, WriteBatch};
use tempfile::TempDir;

const DIMENSIONS: usize = 256;

fn vector_index(name: &str) -> IndexConfig {
    IndexConfig::vector(name, name, VectorConfig::new(DIMENSIONS, Similarity::DotProduct))
}

fn fill(catalog: &IndexCatalog, name: &str, docs: usize) -> Result<()> {
    let mut batch = WriteBatch::new(name);
    for i in 0..docs {
        let value = (i % 17) as f32 / 17.0;
        batch = batch.insert_vector(format!("{name}-{i}"), vec![value; DIMENSIONS]);
    }
    catalog.batch_write(name, &batch)
}

#[test]
fn test_aggregate_memory_commits_every_index() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut params = ServerParameters::default();
    params.max_buffered_memory_mb_all_indexes = 1;
    let clock = Arc::new(ManualClock::new(1_000));
    let catalog = IndexCatalog::open(temp_dir.path(), Arc::new(Parameters::new(params)?), clock.clone())?;

    for name in ["a", "b", "c"] {
        catalog.create_index(vector_index(name))?;
        fill(&catalog, name, 400)?;
    }
    let total: u64 = ["a", "b", "c"]
        .iter()
        .map(|name| catalog.get_index(name).unwrap().ram_bytes_used())
        .sum();
    assert!(total >= 1024 * 1024, "buffered {total} bytes");

    clock.advance(10);
    let report = catalog.run_maintenance_tick()?;
    assert!(report.forced);
    assert_eq!(report.total_ram_bytes, total);
    assert_eq!(report.committed, vec!["a", "b", "c"]);
    assert!(report.failed.is_empty());

    for name in ["a", "b", "c"] {
        let index = catalog.get_index(name).unwrap();
        assert_eq!(index.ram_bytes_used(), 0);
        assert_eq!(index.last_commit_millis(), 1_010);
        assert_eq!(index.snapshot()?.num_docs(), 400);
    }
    Ok(())
}

#[test]
fn test_stale_indexes_are_committed() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut params = ServerParameters::default();
    params.max_index_in_memory_millis = 5_000;
    let params = Arc::new(Parameters::new(params)?);
    let clock = Arc::new(ManualClock::new(0));
    let catalog = IndexCatalog::open(temp_dir.path(), Arc::clone(&params), clock.clone())?;

    catalog.create_index(vector_index("old"))?;
    clock.set(3_000);
    catalog.create_index(vector_index("new"))?;
    fill(&catalog, "old", 3)?;
    fill(&catalog, "new", 3)?;

    // Exactly at the limit nothing is due yet.
    clock.set(5_000);
    let report = catalog.run_maintenance_tick()?;
    assert!(!report.forced);
    assert!(report.committed.is_empty());

    clock.set(5_001);
    let report = catalog.run_maintenance_tick()?;
    assert_eq!(report.committed, vec!["old"]);
    assert_eq!(catalog.get_index("old").unwrap().snapshot()?.num_docs(), 3);
    assert_eq!(catalog.get_index("new").unwrap().snapshot()?.num_docs(), 0);

    // The staleness limit can change while running.
    params.set_at_runtime("maxIndexInMemoryMillis", 1_000)?;
    clock.set(5_500);
    let report = catalog.run_maintenance_tick()?;
    assert_eq!(report.committed, vec!["new"]);
    Ok(())
}

#[test]
fn test_background_thread_commits() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut params = ServerParameters::default();
    params.max_index_in_memory_millis = 0;
    params.maintenance_interval_millis = 10;
    let catalog = IndexCatalog::start_new(
        temp_dir.path(),
        Arc::new(Parameters::new(params)?),
        Arc::new(SystemClock),
    )?;
    catalog.create_index(vector_index("v"))?;
    fill(&catalog, "v", 5)?;

    let index = catalog.get_index("v").unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while index.snapshot()?.num_docs() < 5 {
        assert!(Instant::now() < deadline, "maintenance never committed");
        std::thread::sleep(Duration::from_millis(10));
    }

    catalog.close()?;
    Ok(())
}
