use std::collections::HashSet;

use crate::{
    document::ScoredSegment,
    embedding::word_tokens,
    error::Result,
    tantivy_index::LexicalIndex,
};

/// Re-order retrieved segments by corpus-wide BM25 score and keep the top
/// `top_k`.
///
/// Scores are looked up by segment id; segments that share no term with
/// the question score 0. The sort is stable, so ties keep vector-search
/// order.
pub fn lexical_rerank(
    index: &LexicalIndex,
    question: &str,
    results: Vec<ScoredSegment>,
    top_k: usize,
) -> Result<Vec<ScoredSegment>> {
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    let bm25 = index.score_segments(question, &ids)?;

    let mut scored: Vec<(f32, ScoredSegment)> = results
        .into_iter()
        .map(|r| (bm25.get(&r.id).copied().unwrap_or(0.0), r))
        .collect();
    sort_descending(&mut scored);

    tracing::debug!(
        candidates = scored.len(),
        matched = bm25.len(),
        "lexical re-rank"
    );

    Ok(truncate(scored, top_k))
}

/// Re-order retrieved segments by how many distinct question words they
/// contain (case-insensitive) and keep the top `top_k`.
pub fn overlap_rerank(
    question: &str,
    results: Vec<ScoredSegment>,
    top_k: usize,
) -> Vec<ScoredSegment> {
    let question_tokens: HashSet<String> = word_tokens(question).collect();

    let mut scored: Vec<(f32, ScoredSegment)> = results
        .into_iter()
        .map(|r| (overlap_score(&question_tokens, &r.text) as f32, r))
        .collect();
    sort_descending(&mut scored);

    truncate(scored, top_k)
}

/// Number of distinct question tokens that also occur in `text`.
pub fn overlap_score(question_tokens: &HashSet<String>, text: &str) -> usize {
    let text_tokens: HashSet<String> = word_tokens(text).collect();
    question_tokens.intersection(&text_tokens).count()
}

fn sort_descending(scored: &mut [(f32, ScoredSegment)]) {
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn truncate(scored: Vec<(f32, ScoredSegment)>, top_k: usize) -> Vec<ScoredSegment> {
    scored.into_iter().take(top_k).map(|(_, r)| r).collect()
}
