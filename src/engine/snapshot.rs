//! Point-in-time readers.
//!
//! An [`IndexSnapshot`] is the immutable view of one commit: the committed
//! segments with their live-docs bit sets as of that commit. Segments are
//! shared with the writer and with other snapshots through `Arc`, so a
//! snapshot stays fully usable after later commits merge or delete the files
//! it was loaded from.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bit_vec::BitVec;
use rayon::prelude::*;

use crate::engine::inverted::{FieldIndex, InvertedIndex, StoredField};
use crate::engine::query::{BooleanQuery, Query};
use crate::engine::segment::{Segment, SegmentBody};
use crate::engine::similarity::Similarity;
use crate::error::{LucernaError, Result};

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

/// A search result.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub score: f32,
}

/// One segment as seen by a snapshot.
#[derive(Debug, Clone)]
pub struct SegmentView {
    segment: Arc<Segment>,
    live: BitVec,
    live_count: u32,
}

impl SegmentView {
    pub fn new(segment: Arc<Segment>, live: BitVec) -> Self {
        let live_count = live.iter().filter(|l| *l).count() as u32;
        SegmentView {
            segment,
            live,
            live_count,
        }
    }

    pub fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    pub fn is_live(&self, ordinal: u32) -> bool {
        self.live.get(ordinal as usize).unwrap_or(false)
    }

    pub fn live_count(&self) -> u32 {
        self.live_count
    }

    fn deleted_count(&self) -> u32 {
        self.segment.doc_count() - self.live_count
    }
}

/// Immutable view of one commit.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    generation: u64,
    segments: Vec<SegmentView>,
    user_data: BTreeMap<String, String>,
    similarity: Option<Similarity>,
}

impl IndexSnapshot {
    pub fn new(
        generation: u64,
        segments: Vec<SegmentView>,
        user_data: BTreeMap<String, String>,
        similarity: Option<Similarity>,
    ) -> Self {
        IndexSnapshot {
            generation,
            segments,
            user_data,
            similarity,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn user_data(&self) -> &BTreeMap<String, String> {
        &self.user_data
    }

    pub fn segments(&self) -> &[SegmentView] {
        &self.segments
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.live_count as u64).sum()
    }

    /// Stored fields of the newest live document with `id`.
    pub fn stored_fields(&self, id: &str) -> Option<Vec<StoredField>> {
        self.segments.iter().rev().find_map(|view| {
            view.segment
                .ordinals_of(id)
                .iter()
                .rev()
                .find(|&&ordinal| view.is_live(ordinal))
                .map(|&ordinal| view.segment.stored_fields(ordinal).to_vec())
        })
    }

    /// Nearest neighbours of `query`.
    ///
    /// Each segment contributes its `candidates` best matches: by exact scan
    /// when it has no more live documents than that, through its HNSW graph
    /// otherwise. The best `candidates` overall are ranked and the first `k`
    /// returned.
    pub fn knn(&self, query: &[f32], k: usize, candidates: usize) -> Result<Vec<Hit>> {
        let similarity = self
            .similarity
            .ok_or_else(|| LucernaError::invalid_operation("knn on a snapshot without vectors"))?;

        // Ranked by raw distance; clamped scores can tie.
        let mut ranked: Vec<(f32, usize, u32)> = self
            .segments
            .par_iter()
            .enumerate()
            .map(|(seg, view)| {
                segment_knn(view, similarity, query, candidates)
                    .into_iter()
                    .map(|(distance, ordinal)| (distance, seg, ordinal))
                    .collect::<Vec<_>>()
            })
            .flatten()
            .collect();

        ranked.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        ranked.truncate(candidates);
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .map(|(distance, seg, ordinal)| Hit {
                id: self.segments[seg].segment.id(ordinal).to_string(),
                score: similarity.score_from_distance(distance),
            })
            .collect())
    }

    /// Run a text query; BM25 statistics span every segment of the snapshot.
    pub fn search(&self, query: &Query, limit: usize) -> Result<Vec<Hit>> {
        let stats = CollectionStats::new(self);

        let per_segment: Vec<Vec<(f32, usize, u32)>> = self
            .segments
            .par_iter()
            .enumerate()
            .map(|(seg, view)| -> Result<Vec<(f32, usize, u32)>> {
                let SegmentBody::Text(index) = view.segment.body() else {
                    return Err(LucernaError::invalid_operation(
                        "text search on a snapshot without text fields",
                    ));
                };
                let scorer = SegmentScorer {
                    view,
                    index,
                    stats: &stats,
                };
                let matches = scorer.eval(query)?;
                Ok(matches
                    .into_iter()
                    .filter(|(ordinal, _)| view.is_live(*ordinal))
                    .map(|(ordinal, score)| (score, seg, ordinal))
                    .collect())
            })
            .collect::<Result<_>>()?;

        let mut scored: Vec<(f32, usize, u32)> = per_segment.into_iter().flatten().collect();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(score, seg, ordinal)| Hit {
                id: self.segments[seg].segment.id(ordinal).to_string(),
                score,
            })
            .collect())
    }
}

/// `(distance, ordinal)` pairs of one segment, closest first for graph search.
fn segment_knn(
    view: &SegmentView,
    similarity: Similarity,
    query: &[f32],
    candidates: usize,
) -> Vec<(f32, u32)> {
    let SegmentBody::Vector { vectors, graph } = view.segment.body() else {
        return Vec::new();
    };

    if view.live_count as usize <= candidates {
        return vectors
            .iter()
            .enumerate()
            .filter(|(ordinal, _)| view.is_live(*ordinal as u32))
            .map(|(ordinal, vector)| (similarity.distance(query, vector), ordinal as u32))
            .collect();
    }

    let ef = candidates + view.deleted_count() as usize;
    graph
        .search(vectors, similarity, query, ef)
        .into_iter()
        .filter(|(ordinal, _)| view.is_live(*ordinal))
        .take(candidates)
        .map(|(ordinal, distance)| (distance, ordinal))
        .collect()
}

#[derive(Debug, Default)]
struct FieldStats {
    doc_count: u64,
    total_length: u64,
}

/// Field statistics summed over all segments.
struct CollectionStats<'a> {
    fields: HashMap<&'a str, FieldStats>,
    indexes: Vec<&'a InvertedIndex>,
}

impl<'a> CollectionStats<'a> {
    fn new(snapshot: &'a IndexSnapshot) -> Self {
        let indexes: Vec<&InvertedIndex> = snapshot
            .segments
            .iter()
            .filter_map(|view| match view.segment.body() {
                SegmentBody::Text(index) => Some(index),
                SegmentBody::Vector { .. } => None,
            })
            .collect();

        let mut fields: HashMap<&str, FieldStats> = HashMap::new();
        for index in &indexes {
            for (name, field) in &index.fields {
                let stats = fields.entry(name.as_str()).or_default();
                stats.doc_count += field.doc_count as u64;
                stats.total_length += field.total_length;
            }
        }
        CollectionStats { fields, indexes }
    }

    fn idf(&self, field: &str, term: &str) -> f32 {
        let n = self.fields.get(field).map(|s| s.doc_count).unwrap_or(0) as f32;
        let df: u32 = self
            .indexes
            .iter()
            .filter_map(|index| index.field(field))
            .map(|f| f.doc_freq(term))
            .sum();
        let df = df as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    fn avg_length(&self, field: &str) -> f32 {
        match self.fields.get(field) {
            Some(stats) if stats.doc_count > 0 && stats.total_length > 0 => {
                stats.total_length as f32 / stats.doc_count as f32
            }
            _ => 1.0,
        }
    }
}

type Matches = BTreeMap<u32, f32>;

struct SegmentScorer<'a> {
    view: &'a SegmentView,
    index: &'a InvertedIndex,
    stats: &'a CollectionStats<'a>,
}

impl SegmentScorer<'_> {
    fn eval(&self, query: &Query) -> Result<Matches> {
        match query {
            Query::Term { field, term } => Ok(self.term(field, term)),
            Query::Phrase { field, terms } => self.phrase(field, terms),
            Query::Boolean(boolean) => self.boolean(boolean),
            Query::MatchAll => Ok((0..self.view.segment.doc_count())
                .map(|ordinal| (ordinal, 1.0))
                .collect()),
        }
    }

    fn bm25(&self, field: &str, field_index: &FieldIndex, doc: u32, freq: f32, idf: f32) -> f32 {
        let norm = if field_index.has_norms {
            let length = field_index.length(doc) as f32;
            1.0 - BM25_B + BM25_B * length / self.stats.avg_length(field)
        } else {
            1.0
        };
        idf * freq * (BM25_K1 + 1.0) / (freq + BM25_K1 * norm)
    }

    fn term(&self, field: &str, term: &str) -> Matches {
        let Some(field_index) = self.index.field(field) else {
            return Matches::new();
        };
        let idf = self.stats.idf(field, term);
        field_index
            .postings(term)
            .iter()
            .map(|p| {
                let score = self.bm25(field, field_index, p.doc, p.freq as f32, idf);
                (p.doc, score)
            })
            .collect()
    }

    fn phrase(&self, field: &str, terms: &[String]) -> Result<Matches> {
        let Some(field_index) = self.index.field(field) else {
            return Ok(Matches::new());
        };
        if !field_index.has_positions {
            return Err(LucernaError::query(format!(
                "field {field} was indexed without positions; phrase queries are not supported"
            )));
        }
        match terms {
            [] => return Ok(Matches::new()),
            [term] => return Ok(self.term(field, term)),
            _ => {}
        }

        let postings: Vec<HashMap<u32, &[u32]>> = terms
            .iter()
            .map(|term| {
                field_index
                    .postings(term)
                    .iter()
                    .map(|p| (p.doc, p.positions.as_slice()))
                    .collect()
            })
            .collect();
        let idf: f32 = terms.iter().map(|term| self.stats.idf(field, term)).sum();

        let mut matches = Matches::new();
        for (&doc, first) in &postings[0] {
            let phrase_freq = first
                .iter()
                .filter(|&&start| {
                    postings[1..].iter().enumerate().all(|(offset, term_postings)| {
                        term_postings
                            .get(&doc)
                            .is_some_and(|positions| positions.contains(&(start + offset as u32 + 1)))
                    })
                })
                .count();
            if phrase_freq > 0 {
                let score = self.bm25(field, field_index, doc, phrase_freq as f32, idf);
                matches.insert(doc, score);
            }
        }
        Ok(matches)
    }

    fn boolean(&self, query: &BooleanQuery) -> Result<Matches> {
        if !query.has_positive_clause() {
            return Ok(Matches::new());
        }

        let mut result: Option<Matches> = None;
        for clause in &query.must {
            let matches = self.eval(clause)?;
            result = Some(match result {
                None => matches,
                Some(acc) => intersect(acc, &matches, true),
            });
        }
        for clause in &query.filter {
            let matches = self.eval(clause)?;
            result = Some(match result {
                None => matches.into_keys().map(|doc| (doc, 0.0)).collect(),
                Some(acc) => intersect(acc, &matches, false),
            });
        }

        let mut should = Matches::new();
        for clause in &query.should {
            for (doc, score) in self.eval(clause)? {
                *should.entry(doc).or_insert(0.0) += score;
            }
        }
        let mut result = match result {
            None => should,
            Some(mut acc) => {
                for (doc, score) in acc.iter_mut() {
                    if let Some(extra) = should.get(doc) {
                        *score += extra;
                    }
                }
                acc
            }
        };

        for clause in &query.must_not {
            for doc in self.eval(clause)?.into_keys() {
                result.remove(&doc);
            }
        }
        Ok(result)
    }
}

fn intersect(acc: Matches, other: &Matches, add_scores: bool) -> Matches {
    acc.into_iter()
        .filter_map(|(doc, score)| {
            other
                .get(&doc)
                .map(|extra| (doc, if add_scores { score + extra } else { score }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::{PerFieldAnalyzer, StandardAnalyzer};
    use crate::engine::directory::Directory;
    use crate::engine::document::{IndexOptions, TextField};
    use crate::engine::hnsw::HnswParams;
    use crate::engine::inverted::AnalyzedDocument;
    use crate::engine::segment::SegmentData;
    use tempfile::TempDir;

    fn text_snapshot(dir: &Directory, docs: &[(&str, Vec<TextField>)], deleted: &[usize]) -> IndexSnapshot {
        let analyzer = PerFieldAnalyzer::new(Arc::new(StandardAnalyzer::new().unwrap()));
        let analyzed: Vec<AnalyzedDocument> = docs
            .iter()
            .map(|(_, fields)| AnalyzedDocument::analyze(fields, &analyzer).unwrap())
            .collect();
        let ids = docs.iter().map(|(id, _)| id.to_string()).collect();
        let segment = Segment::write(dir, "_0", SegmentData::text(ids, &analyzed)).unwrap();

        let mut live = BitVec::from_elem(docs.len(), true);
        for &d in deleted {
            live.set(d, false);
        }
        IndexSnapshot::new(
            1,
            vec![SegmentView::new(Arc::new(segment), live)],
            BTreeMap::new(),
            None,
        )
    }

    fn ids(hits: &[Hit]) -> Vec<&str> {
        hits.iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn test_knn_exact_and_graph_agree() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Directory::open(temp_dir.path()).unwrap();

        let vectors: Vec<Vec<f32>> = (0..50).map(|i| vec![i as f32, 0.0]).collect();
        let doc_ids: Vec<String> = (0..50).map(|i| format!("d{i}")).collect();
        let data = SegmentData::vector(doc_ids, vectors, Similarity::Euclidean, &HnswParams::new(8, 64));
        let segment = Arc::new(Segment::write(&dir, "_0", data).unwrap());
        let mut live = BitVec::from_elem(50, true);
        live.set(10, false);

        let snapshot = IndexSnapshot::new(
            1,
            vec![SegmentView::new(segment, live)],
            BTreeMap::new(),
            Some(Similarity::Euclidean),
        );
        assert_eq!(snapshot.num_docs(), 49);

        // 49 live docs <= 100 candidates: exact scan
        let exact = snapshot.knn(&[10.2, 0.0], 3, 100).unwrap();
        assert_eq!(ids(&exact), vec!["d11", "d9", "d12"]);

        // Graph search
        let approx = snapshot.knn(&[10.2, 0.0], 3, 10).unwrap();
        assert_eq!(ids(&approx), vec!["d11", "d9", "d12"]);
        assert!(approx[0].score > approx[1].score);
    }

    #[test]
    fn test_knn_orders_negative_dot_products() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Directory::open(temp_dir.path()).unwrap();

        let doc_ids = vec!["far".to_string(), "near".to_string(), "mid".to_string()];
        let vectors = vec![vec![-5.0, 0.0], vec![-2.0, 0.0], vec![-3.0, 0.0]];
        let data = SegmentData::vector(doc_ids, vectors, Similarity::DotProduct, &HnswParams::new(8, 64));
        let segment = Arc::new(Segment::write(&dir, "_0", data).unwrap());
        let snapshot = IndexSnapshot::new(
            1,
            vec![SegmentView::new(segment, BitVec::from_elem(3, true))],
            BTreeMap::new(),
            Some(Similarity::DotProduct),
        );

        // Every score clamps to zero; order still follows the dot product.
        let hits = snapshot.knn(&[1.0, 0.0], 3, 10).unwrap();
        assert_eq!(ids(&hits), vec!["near", "mid", "far"]);
        assert!(hits.iter().all(|h| h.score == 0.0));
    }

    #[test]
    fn test_knn_requires_vectors() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Directory::open(temp_dir.path()).unwrap();
        let snapshot = text_snapshot(&dir, &[("a", vec![TextField::new("body", "x")])], &[]);
        assert!(snapshot.knn(&[1.0], 1, 1).is_err());
    }

    #[test]
    fn test_bm25_prefers_rarer_and_shorter() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Directory::open(temp_dir.path()).unwrap();
        let snapshot = text_snapshot(
            &dir,
            &[
                ("long", vec![TextField::new("body", "apple pie with lots of extra words here")]),
                ("short", vec![TextField::new("body", "apple pie")]),
                ("other", vec![TextField::new("body", "banana bread")]),
            ],
            &[],
        );

        let hits = snapshot.search(&Query::term("body", "apple"), 10).unwrap();
        assert_eq!(ids(&hits), vec!["short", "long"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_boolean_clauses() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Directory::open(temp_dir.path()).unwrap();
        let snapshot = text_snapshot(
            &dir,
            &[
                ("a", vec![TextField::new("body", "red apple"), TextField::new("kind", "fruit")]),
                ("b", vec![TextField::new("body", "green apple"), TextField::new("kind", "fruit")]),
                ("c", vec![TextField::new("body", "red car"), TextField::new("kind", "vehicle")]),
            ],
            &[],
        );

        let query = BooleanQuery::new()
            .must(Query::term("body", "apple"))
            .must_not(Query::term("body", "green"))
            .into();
        assert_eq!(ids(&snapshot.search(&query, 10).unwrap()), vec!["a"]);

        let query = BooleanQuery::new()
            .filter(Query::term("kind", "fruit"))
            .should(Query::term("body", "red"))
            .into();
        let hits = snapshot.search(&query, 10).unwrap();
        assert_eq!(ids(&hits), vec!["a", "b"]);
        assert_eq!(hits[1].score, 0.0);

        let query = BooleanQuery::new()
            .should(Query::term("body", "red"))
            .should(Query::term("body", "green"))
            .into();
        assert_eq!(snapshot.search(&query, 10).unwrap().len(), 3);

        let query = BooleanQuery::new().must_not(Query::term("body", "car")).into();
        assert!(snapshot.search(&query, 10).unwrap().is_empty());
    }

    #[test]
    fn test_phrase() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Directory::open(temp_dir.path()).unwrap();
        let snapshot = text_snapshot(
            &dir,
            &[
                ("a", vec![TextField::new("body", "the quick brown fox")]),
                ("b", vec![TextField::new("body", "brown quick fox")]),
                (
                    "c",
                    vec![TextField::new("tags", "quick brown").with_index_options(IndexOptions::Freqs)],
                ),
            ],
            &[],
        );

        let phrase = Query::phrase("body", vec!["quick".into(), "brown".into()]);
        assert_eq!(ids(&snapshot.search(&phrase, 10).unwrap()), vec!["a"]);

        let phrase = Query::phrase("tags", vec!["quick".into(), "brown".into()]);
        assert!(matches!(
            snapshot.search(&phrase, 10),
            Err(LucernaError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_deleted_docs_and_stored_fields() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Directory::open(temp_dir.path()).unwrap();
        let snapshot = text_snapshot(
            &dir,
            &[
                ("a", vec![TextField::new("body", "hello").stored()]),
                ("b", vec![TextField::new("body", "hello")]),
            ],
            &[1],
        );

        assert_eq!(ids(&snapshot.search(&Query::MatchAll, 10).unwrap()), vec!["a"]);
        let stored = snapshot.stored_fields("a").unwrap();
        assert_eq!(stored[0].text, "hello");
        assert!(snapshot.stored_fields("b").is_none());
    }
}
