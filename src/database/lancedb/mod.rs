// LanceDB vector database module
// Chunk vectors with their payload, similarity search with local re-ranking

#[cfg(test)]
mod tests;

pub mod vector_store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use vector_store::VectorStore;

/// Similarity measure of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
}

impl std::fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Cosine => write!(f, "cosine"),
        }
    }
}

/// Fixed payload stored next to every vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointPayload {
    pub kb_id: Uuid,
    pub doc_id: Uuid,
    pub chunk_index: u32,
    pub text: String,
    /// Length of `text` in characters
    pub text_length: u32,
    pub created_at: DateTime<Utc>,
}

/// One stored vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Uuid,
    /// Cosine similarity recomputed from the stored vector
    pub score: f32,
    pub text: String,
    pub doc_id: Uuid,
    pub kb_id: Uuid,
    pub chunk_index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    /// Restrict results to one knowledge base
    pub kb_id: Option<Uuid>,
    pub limit: usize,
    pub score_threshold: f32,
    /// Over-fetch factor applied before local re-ranking
    pub candidate_multiplier: usize,
}

impl SearchParams {
    #[inline]
    pub fn new(limit: usize) -> Self {
        Self {
            kb_id: None,
            limit,
            score_threshold: 0.7,
            candidate_multiplier: 4,
        }
    }

    #[inline]
    pub fn with_kb(mut self, kb_id: Uuid) -> Self {
        self.kb_id = Some(kb_id);
        self
    }

    #[inline]
    pub fn with_threshold(mut self, score_threshold: f32) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    #[inline]
    pub fn with_candidate_multiplier(mut self, candidate_multiplier: usize) -> Self {
        self.candidate_multiplier = candidate_multiplier;
        self
    }

    /// Number of nearest neighbours to pull before re-ranking
    #[inline]
    pub fn candidate_count(&self) -> usize {
        self.limit
            .saturating_mul(self.candidate_multiplier)
            .max(self.limit)
    }
}

/// Payload filter for counting points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointFilter {
    KnowledgeBase(Uuid),
    Document(Uuid),
}

impl PointFilter {
    /// SQL predicate understood by LanceDB
    #[inline]
    pub fn predicate(&self) -> String {
        match *self {
            Self::KnowledgeBase(kb_id) => format!("kb_id = {}", sql_literal(&kb_id.to_string())),
            Self::Document(doc_id) => format!("doc_id = {}", sql_literal(&doc_id.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub points_count: usize,
    pub metric: DistanceMetric,
}

/// Result of an operation that degrades instead of failing.
///
/// `Degraded` carries a fallback value together with the reason the store
/// could not produce the real one.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome<T> {
    Complete(T),
    Degraded { value: T, reason: String },
}

impl<T> StoreOutcome<T> {
    #[inline]
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Self::Degraded {
            value,
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn value(&self) -> &T {
        match self {
            Self::Complete(value) | Self::Degraded { value, .. } => value,
        }
    }

    #[inline]
    pub fn into_value(self) -> T {
        match self {
            Self::Complete(value) | Self::Degraded { value, .. } => value,
        }
    }

    #[inline]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    #[inline]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Complete(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// Exact cosine similarity, accumulated in `f64`.
///
/// Zero when either vector has zero norm or the lengths differ.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Score candidates against `query` and pick the results.
///
/// Candidates are ordered by descending similarity (ties keep fetch order).
/// Those at or above `score_threshold` are returned, at most `limit`; if fewer
/// than `limit` pass, the best `limit` are returned regardless of threshold.
#[inline]
pub fn rerank(
    query: &[f32],
    candidates: Vec<VectorPoint>,
    limit: usize,
    score_threshold: f32,
) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .map(|point| SearchHit {
            id: point.id,
            score: cosine_similarity(query, &point.vector) as f32,
            text: point.payload.text,
            doc_id: point.payload.doc_id,
            kb_id: point.payload.kb_id,
            chunk_index: point.payload.chunk_index,
        })
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));

    let passing = hits
        .iter()
        .take_while(|hit| hit.score >= score_threshold)
        .count();
    if passing >= limit {
        hits.truncate(passing);
    }
    hits.truncate(limit);
    hits
}

/// Quote a string for a LanceDB filter expression
#[inline]
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
