//! The vector store contract shared by the local and Qdrant backends.

use crate::{
    document::{EmbeddedSegment, ScoredSegment},
    error::Result,
};

/// Name of the single collection every pipeline reads and writes.
pub const COLLECTION_NAME: &str = "vector_db";

/// Persists `(vector, text, metadata)` triples in one named collection.
///
/// Implementations provide their own concurrency control; callers never
/// lock around them.
pub trait VectorStore: Send + Sync {
    /// Short backend name used in logs and `status` output.
    fn backend(&self) -> &str;

    /// Append segments. Existing entries are never checked or replaced.
    fn upsert(&self, segments: &[EmbeddedSegment]) -> Result<()>;

    /// Up to `top_k` segments with cosine similarity of at least
    /// `score_threshold`, most similar first.
    ///
    /// An empty or missing collection yields an empty list.
    fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredSegment>>;

    /// Delete every segment, leaving an empty collection with the same
    /// configuration.
    fn reset(&self) -> Result<()>;

    /// Number of stored segments.
    fn count(&self) -> Result<usize>;
}

/// Keep candidates at or above the threshold, order them by descending
/// score and truncate. Ties keep their input order.
pub(crate) fn rank_candidates(
    mut candidates: Vec<ScoredSegment>,
    top_k: usize,
    score_threshold: f32,
) -> Vec<ScoredSegment> {
    candidates.retain(|c| c.score >= score_threshold);
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(top_k);
    candidates
}
