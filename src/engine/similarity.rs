//! Vector similarity functions.
//!
//! Each function has two faces: a *distance* used to navigate the HNSW graph
//! (smaller is closer) and a *score* reported to callers (larger is closer,
//! always positive):
//!
//! | similarity   | distance      | score           |
//! |--------------|---------------|-----------------|
//! | `euclidean`  | `d²`          | `1 / (1 + d²)`  |
//! | `cosine`     | `1 - cos`     | `(1 + cos) / 2` |
//! | `dotProduct` | `-dot`        | `(1 + dot) / 2` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LucernaError, Result};

/// Similarity function of a vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Similarity {
    /// Euclidean (L2) distance
    #[serde(rename = "euclidean")]
    Euclidean,
    /// Cosine of the angle between the vectors
    #[serde(rename = "cosine")]
    Cosine,
    /// Inner product, meant for unit-length vectors
    #[serde(rename = "dotProduct")]
    DotProduct,
}

impl Similarity {
    /// Graph distance between two vectors of equal length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Similarity::Euclidean => squared_euclidean(a, b),
            Similarity::Cosine => 1.0 - cosine(a, b),
            Similarity::DotProduct => -dot(a, b),
        }
    }

    /// Convert a graph distance back into a caller-facing score.
    pub fn score_from_distance(&self, distance: f32) -> f32 {
        match self {
            Similarity::Euclidean => 1.0 / (1.0 + distance),
            Similarity::Cosine => ((2.0 - distance) / 2.0).max(0.0),
            Similarity::DotProduct => ((1.0 - distance) / 2.0).max(0.0),
        }
    }

    /// Score between two vectors (higher is more similar).
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        self.score_from_distance(self.distance(a, b))
    }

    /// The name used in index definitions.
    pub fn name(&self) -> &'static str {
        match self {
            Similarity::Euclidean => "euclidean",
            Similarity::Cosine => "cosine",
            Similarity::DotProduct => "dotProduct",
        }
    }
}

impl FromStr for Similarity {
    type Err = LucernaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "euclidean" => Ok(Similarity::Euclidean),
            "cosine" => Ok(Similarity::Cosine),
            "dotProduct" => Ok(Similarity::DotProduct),
            _ => Err(LucernaError::config(format!("unknown similarity type {s}"))),
        }
    }
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        // Zero vectors are orthogonal to everything
        0.0
    } else {
        (dot(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean() {
        let sim = Similarity::Euclidean;
        assert_eq!(sim.distance(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(sim.score(&[1.0, 1.0], &[1.0, 1.0]), 1.0);
        assert!(sim.score(&[0.0, 1.0], &[0.0, 0.0]) > sim.score(&[0.0, 1.0], &[10.0, 10.0]));
    }

    #[test]
    fn test_cosine() {
        let sim = Similarity::Cosine;
        assert!((sim.score(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((sim.score(&[1.0, 0.0], &[0.0, 1.0]) - 0.5).abs() < 1e-6);
        assert!(sim.score(&[1.0, 0.0], &[-1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn test_dot_product() {
        let sim = Similarity::DotProduct;
        assert!((sim.score(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((sim.score(&[0.6, 0.8], &[0.8, 0.6]) - 0.98).abs() < 1e-6);
    }

    #[test]
    fn test_names_round_trip() {
        for sim in [Similarity::Euclidean, Similarity::Cosine, Similarity::DotProduct] {
            assert_eq!(sim.name().parse::<Similarity>().unwrap(), sim);
        }
        assert!("manhattan".parse::<Similarity>().is_err());

        let json = serde_json::to_string(&Similarity::DotProduct).unwrap();
        assert_eq!(json, "\"dotProduct\"");
    }
}
