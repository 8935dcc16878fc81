use std::sync::Arc;

use lucerna::clock::ManualClock;
use lucerna::config::Parameters;
use lucerna::engine::{BooleanQuery, IndexOptions, Query, TextField};
use lucerna::error::{LucernaError, Result};
use lucerna::storage::{IndexCatalog, IndexConfig, QuerySpec, TextConfig, WriteBatch};
use tempfile::TempDir;

fn catalog_with_products(root: &std::path::Path) -> Result<IndexCatalog> {
    let catalog = IndexCatalog::open(root, Arc::new(Parameters::default()), Arc::new(ManualClock::new(0)))?;
    let config = TextConfig::default().with_field_analyzer("sku", "lucene.simple");
    catalog.create_index(IndexConfig::text("products", "products", config))?;

    let batch = WriteBatch::new("products")
        .insert_text(
            "p1",
            vec![
                TextField::new("title", "Red running shoes").stored(),
                TextField::new("color", "red").with_index_options(IndexOptions::Docs),
            ],
        )
        .insert_text(
            "p2",
            vec![
                TextField::new("title", "Blue running shorts").stored(),
                TextField::new("color", "blue").with_index_options(IndexOptions::Docs),
            ],
        )
        .insert_text(
            "p3",
            vec![
                TextField::new("title", "Shoes for running in the red desert").stored(),
                TextField::new("color", "brown").with_index_options(IndexOptions::Docs),
            ],
        )
        .with_auto_commit(true);
    catalog.batch_write("products", &batch)?;
    Ok(catalog)
}

fn search(catalog: &IndexCatalog, json: &str) -> Result<Vec<String>> {
    catalog.search_spec("products", &QuerySpec::from_json(json)?, 10)
}

#[test]
fn test_text_operator() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let catalog = catalog_with_products(temp_dir.path())?;

    let mut ids = search(&catalog, r#"{"text": {"query": "shoes", "path": "title"}}"#)?;
    ids.sort();
    assert_eq!(ids, vec!["p1", "p3"]);

    let ids = search(
        &catalog,
        r#"{"text": {"query": "red shoes running", "path": "title", "matchAll": true}}"#,
    )?;
    assert_eq!(ids[0], "p1");
    assert_eq!(ids.len(), 2);
    Ok(())
}

#[test]
fn test_phrase_queries() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let catalog = catalog_with_products(temp_dir.path())?;

    let ids = search(&catalog, r#"{"text": {"query": "\"running shoes\"", "path": "title"}}"#)?;
    assert_eq!(ids, vec!["p1"]);

    // Positions were not indexed for the color field.
    let phrase = Query::phrase("color", vec!["red".into(), "blue".into()]);
    assert!(matches!(
        catalog.search("products", &phrase, 10),
        Err(LucernaError::InvalidQuery(_))
    ));
    Ok(())
}

#[test]
fn test_compound_clauses() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let catalog = catalog_with_products(temp_dir.path())?;

    let ids = search(
        &catalog,
        r#"{"compound": {
            "must": [{"text": {"query": "running", "path": "title"}}],
            "mustNot": [{"text": {"query": "blue", "path": "color"}}]
        }}"#,
    )?;
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["p1", "p3"]);

    let ids = search(
        &catalog,
        r#"{"compound": {
            "filter": [{"text": {"query": "red", "path": "color"}}],
            "should": [{"text": {"query": "shorts", "path": "title"}}]
        }}"#,
    )?;
    assert_eq!(ids, vec!["p1"]);

    let only_negative = BooleanQuery::new().must_not(Query::term("color", "blue"));
    assert!(catalog.search("products", &only_negative.into(), 10)?.is_empty());

    let mut all = catalog.search("products", &Query::MatchAll, 10)?;
    all.sort();
    assert_eq!(all, vec!["p1", "p2", "p3"]);
    Ok(())
}

#[test]
fn test_stored_fields_and_updates() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let catalog = catalog_with_products(temp_dir.path())?;
    let index = catalog.get_index("products").unwrap();

    let stored = index.stored_fields("p2")?.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "title");
    assert_eq!(stored[0].text, "Blue running shorts");

    catalog.batch_write(
        "products",
        &WriteBatch::new("products")
            .update_text("p2", vec![TextField::new("title", "Green sandals").stored()])
            .delete("p3")
            .with_auto_commit(true),
    )?;
    assert_eq!(index.stored_fields("p2")?.unwrap()[0].text, "Green sandals");
    assert!(index.stored_fields("p3")?.is_none());
    assert_eq!(search(&catalog, r#"{"text": {"query": "running", "path": "title"}}"#)?, vec!["p1"]);

    assert!(matches!(
        catalog.knn("products", &[0.0], 1, 1),
        Err(LucernaError::IndexKindMismatch { .. })
    ));
    Ok(())
}
