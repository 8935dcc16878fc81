//! Criterion benchmarks for Lucerna.
//!
//! Covers the hot paths of the storage layer:
//! - Text analysis
//! - HNSW graph construction and nearest-neighbour queries
//! - Batched writes with commit
//! - BM25 text queries

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use lucerna::analysis::{Analyzer, StandardAnalyzer};
use lucerna::clock::ManualClock;
use lucerna::config::Parameters;
use lucerna::engine::hnsw::{HnswGraph, HnswParams};
use lucerna::engine::{Similarity, TextField};
use lucerna::storage::{IndexCatalog, IndexConfig, QuerySpec, TextConfig, VectorConfig, WriteBatch};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

const WORDS: &[&str] = &[
    "search", "engine", "vector", "index", "query", "document", "field", "term", "phrase",
    "segment", "commit", "merge", "snapshot", "backup", "catalog", "shard", "replica",
    "timestamp", "analyzer", "token", "score", "ranking", "memory", "storage",
];

/// Generate test documents for benchmarking.
fn generate_test_documents(count: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..count)
        .map(|i| {
            let len = 20 + i % 40;
            (0..len)
                .map(|_| WORDS[rng.random_range(0..WORDS.len())])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

/// Generate random unit-range vectors.
fn generate_test_vectors(count: usize, dimension: usize) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| (0..dimension).map(|_| rng.random::<f32>()).collect())
        .collect()
}

fn bench_text_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_analysis");
    let analyzer = StandardAnalyzer::new().unwrap();
    let documents = generate_test_documents(100);

    group.throughput(Throughput::Elements(documents.len() as u64));
    group.bench_function("standard_analyzer", |b| {
        b.iter(|| {
            for doc in &documents {
                let tokens = analyzer.analyze(black_box(doc)).unwrap().count();
                black_box(tokens);
            }
        })
    });
    group.finish();
}

fn bench_hnsw(c: &mut Criterion) {
    let mut group = c.benchmark_group("hnsw");
    group.sample_size(20);
    let vectors = generate_test_vectors(1_000, 64);
    let params = HnswParams::new(16, 100);

    group.throughput(Throughput::Elements(vectors.len() as u64));
    group.bench_function("build_1000x64", |b| {
        b.iter(|| black_box(HnswGraph::build(&vectors, Similarity::Euclidean, &params)))
    });

    let graph = HnswGraph::build(&vectors, Similarity::Euclidean, &params);
    let queries = generate_test_vectors(100, 64);
    group.throughput(Throughput::Elements(queries.len() as u64));
    group.bench_function("search_ef50", |b| {
        b.iter(|| {
            for query in &queries {
                black_box(graph.search(&vectors, Similarity::Euclidean, query, 50));
            }
        })
    });
    group.finish();
}

fn open_catalog(root: &std::path::Path) -> IndexCatalog {
    IndexCatalog::open(root, Arc::new(Parameters::default()), Arc::new(ManualClock::new(0))).unwrap()
}

fn bench_catalog(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog");
    group.sample_size(10);

    let vectors = generate_test_vectors(500, 32);
    group.throughput(Throughput::Elements(vectors.len() as u64));
    group.bench_function("batch_write_commit_500", |b| {
        b.iter_batched(
            || {
                let temp_dir = TempDir::new().unwrap();
                let catalog = open_catalog(temp_dir.path());
                catalog
                    .create_index(IndexConfig::vector("v", "v", VectorConfig::new(32, Similarity::Cosine)))
                    .unwrap();
                (temp_dir, catalog)
            },
            |(_temp_dir, catalog)| {
                let mut batch = WriteBatch::new("v").with_auto_commit(true);
                for (i, vector) in vectors.iter().enumerate() {
                    batch = batch.insert_vector(i.to_string(), vector.clone());
                }
                catalog.batch_write("v", &batch).unwrap();
            },
            BatchSize::PerIteration,
        )
    });

    let temp_dir = TempDir::new().unwrap();
    let catalog = open_catalog(temp_dir.path());
    catalog
        .create_index(IndexConfig::vector("v", "v", VectorConfig::new(32, Similarity::Cosine)))
        .unwrap();
    catalog
        .create_index(IndexConfig::text("t", "t", TextConfig::default()))
        .unwrap();

    let mut vector_batch = WriteBatch::new("v").with_auto_commit(true);
    for (i, vector) in vectors.iter().enumerate() {
        vector_batch = vector_batch.insert_vector(i.to_string(), vector.clone());
    }
    catalog.batch_write("v", &vector_batch).unwrap();

    let mut text_batch = WriteBatch::new("t").with_auto_commit(true);
    for (i, doc) in generate_test_documents(1_000).into_iter().enumerate() {
        text_batch = text_batch.insert_text(i.to_string(), vec![TextField::new("body", doc)]);
    }
    catalog.batch_write("t", &text_batch).unwrap();

    group.throughput(Throughput::Elements(1));
    group.bench_function("knn_k10_c100", |b| {
        b.iter(|| black_box(catalog.knn("v", &vectors[7], 10, 100).unwrap()))
    });

    let spec = QuerySpec::from_json(r#"{"text": {"query": "vector \"commit merge\" snapshot", "path": "body"}}"#)
        .unwrap();
    group.bench_function("text_search_limit10", |b| {
        b.iter(|| black_box(catalog.search_spec("t", &spec, 10).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_text_analysis, bench_hnsw, bench_catalog);
criterion_main!(benches);
