//! Match decisions between two face embeddings.

use crate::types::Embedding;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Euclidean cutoff for L2-normalized ArcFace embeddings.
///
/// On unit vectors `d = sqrt(2 - 2 * cos)`, so 1.10 corresponds to a cosine
/// similarity of about 0.40.
pub const EUCLIDEAN_TOLERANCE: f32 = 1.10;

/// Cosine similarity above which two faces are the same person.
pub const COSINE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("embedding dimensions differ: {0} vs {1}")]
    DimensionMismatch(usize, usize),
    #[error("embedding is empty")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Lower is more similar; match when below the threshold.
    Euclidean,
    /// Higher is more similar; match when above the threshold.
    Cosine,
}

impl Metric {
    pub fn default_threshold(self) -> f32 {
        match self {
            Metric::Euclidean => EUCLIDEAN_TOLERANCE,
            Metric::Cosine => COSINE_THRESHOLD,
        }
    }

    pub fn measure(self, a: &Embedding, b: &Embedding) -> f32 {
        match self {
            Metric::Euclidean => a.euclidean_distance(b),
            Metric::Cosine => a.similarity(b),
        }
    }

    pub fn is_match(self, value: f32, threshold: f32) -> bool {
        match self {
            Metric::Euclidean => value < threshold,
            Metric::Cosine => value > threshold,
        }
    }
}

/// Outcome of comparing two embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub metric: Metric,
    /// Distance (euclidean) or similarity (cosine).
    pub value: f32,
    pub threshold: f32,
    pub matched: bool,
}

/// Compare two pre-computed encodings with the metric's fixed threshold.
pub fn compare_embeddings(
    a: &Embedding,
    b: &Embedding,
    metric: Metric,
) -> Result<Comparison, CompareError> {
    if a.values.is_empty() || b.values.is_empty() {
        return Err(CompareError::Empty);
    }
    if a.values.len() != b.values.len() {
        return Err(CompareError::DimensionMismatch(a.values.len(), b.values.len()));
    }

    let threshold = metric.default_threshold();
    let value = metric.measure(a, b);

    Ok(Comparison {
        metric,
        value,
        threshold,
        matched: metric.is_match(value, threshold),
    })
}
