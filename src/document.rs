//! Segment types shared by ingestion, storage and retrieval.

use serde::{Deserialize, Serialize};

/// Provenance attached to every segment at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    /// File name of the uploaded document, without any `temp_` prefix.
    pub source: String,
    /// Estimated 1-based page number. Proportional, not exact.
    pub page: u32,
    /// Position of the segment within its document, e.g. `"2 of 3"`.
    pub split: String,
}

/// A bounded slice of document text; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Random identifier shared by the vector store and the lexical index.
    pub id: String,
    pub text: String,
    pub metadata: SegmentMetadata,
}

/// A segment paired with its embedding, ready for upsert.
#[derive(Debug, Clone)]
pub struct EmbeddedSegment {
    pub segment: Segment,
    pub vector: Vec<f32>,
}

/// A segment returned by a search, with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSegment {
    pub id: String,
    pub text: String,
    pub metadata: SegmentMetadata,
    /// Cosine similarity between the query and the segment vectors.
    pub score: f32,
}

impl ScoredSegment {
    pub fn new(segment: Segment, score: f32) -> Self {
        Self {
            id: segment.id,
            text: segment.text,
            metadata: segment.metadata,
            score,
        }
    }
}
