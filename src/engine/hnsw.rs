//! HNSW (Hierarchical Navigable Small World) graph for approximate vector search.
//!
//! A graph is built once per segment over the segment's vectors and stored
//! alongside them; segments are immutable, so the graph never changes after
//! construction. Node ids are the document ordinals of the segment.
//!
//! Layer assignment uses a seeded RNG so that rebuilding a segment from the
//! same vectors yields the same graph.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::similarity::Similarity;
use crate::error::{LucernaError, Result};

/// Construction parameters of an HNSW graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Maximum number of connections per node in the upper layers.
    /// Layer 0 allows twice as many.
    pub max_connections: usize,
    /// Size of the candidate set during construction.
    pub ef_construction: usize,
    /// Random seed for layer assignment.
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        HnswParams {
            max_connections: 16,
            ef_construction: 100,
            seed: 42,
        }
    }
}

impl HnswParams {
    pub fn new(max_connections: usize, ef_construction: usize) -> Self {
        HnswParams {
            max_connections,
            ef_construction,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(LucernaError::config("maxConn must be > 0"));
        }
        if self.ef_construction == 0 {
            return Err(LucernaError::config("efConstruction must be > 0"));
        }
        Ok(())
    }

    fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.max_connections * 2
        } else {
            self.max_connections
        }
    }

    /// Layer-assignment multiplier `1 / ln(M)`.
    fn level_multiplier(&self) -> f64 {
        1.0 / (self.max_connections.max(2) as f64).ln()
    }
}

/// A node in the graph: its neighbour lists, one per layer it lives in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HnswNode {
    connections: Vec<Vec<u32>>,
}

impl HnswNode {
    fn new(max_layer: usize) -> Self {
        HnswNode {
            connections: vec![Vec::new(); max_layer + 1],
        }
    }

    fn max_layer(&self) -> usize {
        self.connections.len().saturating_sub(1)
    }

    fn neighbours(&self, layer: usize) -> &[u32] {
        self.connections.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Priority queue entry for HNSW search.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SearchCandidate {
    /// Distance to the query vector.
    distance: f32,
    /// Node id in the graph.
    node: u32,
}

impl Eq for SearchCandidate {}

impl PartialOrd for SearchCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// An immutable HNSW graph over a slice of vectors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HnswGraph {
    nodes: Vec<HnswNode>,
    entry_point: Option<u32>,
    max_layer: usize,
}

impl HnswGraph {
    /// Build a graph over `vectors`; node `i` is `vectors[i]`.
    pub fn build(vectors: &[Vec<f32>], similarity: Similarity, params: &HnswParams) -> Self {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let ml = params.level_multiplier();
        let mut graph = HnswGraph {
            nodes: Vec::with_capacity(vectors.len()),
            entry_point: None,
            max_layer: 0,
        };

        for (index, vector) in vectors.iter().enumerate() {
            let uniform: f64 = rng.random_range(f64::MIN_POSITIVE..1.0);
            let layer = (-uniform.ln() * ml).floor() as usize;
            let node = index as u32;
            graph.nodes.push(HnswNode::new(layer));

            match graph.entry_point {
                None => {
                    graph.entry_point = Some(node);
                    graph.max_layer = layer;
                }
                Some(entry_point) => {
                    graph.connect_new_node(vectors, similarity, params, node, entry_point, layer);
                    if layer > graph.max_layer {
                        graph.entry_point = Some(node);
                        graph.max_layer = layer;
                    }
                }
            }
        }

        graph
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Approximate nearest neighbours of `query`, visiting `ef` candidates on
    /// the bottom layer. Returns `(node, distance)` pairs, closest first.
    pub fn search(
        &self,
        vectors: &[Vec<f32>],
        similarity: Similarity,
        query: &[f32],
        ef: usize,
    ) -> Vec<(u32, f32)> {
        let Some(entry_point) = self.entry_point else {
            return Vec::new();
        };

        let mut closest = vec![entry_point];
        for layer in (1..=self.max_layer).rev() {
            closest = self
                .search_layer(vectors, similarity, query, &closest, 1, layer)
                .into_iter()
                .map(|c| c.node)
                .collect();
        }

        self.search_layer(vectors, similarity, query, &closest, ef.max(1), 0)
            .into_iter()
            .map(|c| (c.node, c.distance))
            .collect()
    }

    fn search_layer(
        &self,
        vectors: &[Vec<f32>],
        similarity: Similarity,
        query: &[f32],
        entry_points: &[u32],
        num_closest: usize,
        layer: usize,
    ) -> Vec<SearchCandidate> {
        let mut visited = HashSet::new();
        let mut candidates = BinaryHeap::new(); // min-heap via Reverse
        let mut found = BinaryHeap::new(); // max-heap, farthest on top

        for &entry in entry_points {
            if visited.insert(entry) {
                let candidate = SearchCandidate {
                    distance: similarity.distance(query, &vectors[entry as usize]),
                    node: entry,
                };
                candidates.push(Reverse(candidate));
                found.push(candidate);
            }
        }

        while let Some(Reverse(current)) = candidates.pop() {
            if let Some(farthest) = found.peek() {
                if current.distance > farthest.distance && found.len() >= num_closest {
                    break;
                }
            }

            for &neighbour in self.nodes[current.node as usize].neighbours(layer) {
                if !visited.insert(neighbour) {
                    continue;
                }
                let candidate = SearchCandidate {
                    distance: similarity.distance(query, &vectors[neighbour as usize]),
                    node: neighbour,
                };

                if found.len() < num_closest {
                    found.push(candidate);
                    candidates.push(Reverse(candidate));
                } else if let Some(farthest) = found.peek() {
                    if candidate.distance < farthest.distance {
                        found.pop();
                        found.push(candidate);
                        candidates.push(Reverse(candidate));
                    }
                }
            }
        }

        found.into_sorted_vec()
    }

    fn connect_new_node(
        &mut self,
        vectors: &[Vec<f32>],
        similarity: Similarity,
        params: &HnswParams,
        node: u32,
        entry_point: u32,
        node_layer: usize,
    ) {
        let query = &vectors[node as usize];
        let mut closest = vec![entry_point];

        for layer in (node_layer + 1..=self.max_layer).rev() {
            closest = self
                .search_layer(vectors, similarity, query, &closest, 1, layer)
                .into_iter()
                .map(|c| c.node)
                .collect();
        }

        for layer in (0..=node_layer.min(self.max_layer)).rev() {
            let max_links = params.max_links(layer);
            let ef = params.ef_construction.max(max_links);
            let found = self.search_layer(vectors, similarity, query, &closest, ef, layer);
            let selected: Vec<u32> = found
                .iter()
                .filter(|c| c.node != node)
                .take(max_links)
                .map(|c| c.node)
                .collect();

            self.nodes[node as usize].connections[layer] = selected.clone();

            for &neighbour in &selected {
                let links = &mut self.nodes[neighbour as usize].connections[layer];
                if !links.contains(&node) {
                    links.push(node);
                }
                if links.len() > max_links {
                    self.prune_connections(vectors, similarity, neighbour, layer, max_links);
                }
            }

            closest = found.into_iter().map(|c| c.node).collect();
        }
    }

    /// Keep only the `max_links` closest neighbours of `node` at `layer`.
    fn prune_connections(
        &mut self,
        vectors: &[Vec<f32>],
        similarity: Similarity,
        node: u32,
        layer: usize,
        max_links: usize,
    ) {
        let base = &vectors[node as usize];
        let mut candidates: Vec<SearchCandidate> = self.nodes[node as usize].connections[layer]
            .iter()
            .map(|&neighbour| SearchCandidate {
                distance: similarity.distance(base, &vectors[neighbour as usize]),
                node: neighbour,
            })
            .collect();
        candidates.sort();
        candidates.truncate(max_links);
        self.nodes[node as usize].connections[layer] =
            candidates.into_iter().map(|c| c.node).collect();
    }

    /// Highest layer any node lives in.
    pub fn max_layer(&self) -> usize {
        self.max_layer
    }

    /// Number of neighbours of `node` at `layer`.
    pub fn degree(&self, node: u32, layer: usize) -> usize {
        self.nodes
            .get(node as usize)
            .filter(|n| layer <= n.max_layer())
            .map(|n| n.neighbours(layer).len())
            .unwrap_or(0)
    }
}
