//! The question-answering pipeline.
//!
//! A query moves through embed → vector search → optional lexical re-rank
//! → optional overlap re-rank → synthesis. An empty search result
//! short-circuits to [`Answer::insufficient_context`]; any fault becomes
//! [`QueryOutcome::Failed`].

use serde::{Deserialize, Serialize};

use crate::{
    document::{ScoredSegment, SegmentMetadata},
    embedding::Embedder,
    error::{Error, Result},
    generation::{Generator, build_prompt},
    reranker,
    tantivy_index::LexicalIndex,
    vector_store::VectorStore,
};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.3;

/// Returned when retrieval finds nothing relevant.
pub const INSUFFICIENT_CONTEXT: &str =
    "I don't have enough information. Please upload relevant documents first.";

/// A question and its retrieval options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    pub question: String,
    /// Maximum number of segments retrieved and fed to the model.
    pub top_k: usize,
    /// Minimum cosine similarity, in `(0, 1]`.
    pub score_threshold: f32,
    /// Re-order by question word overlap.
    pub rerank: bool,
    /// Re-order by corpus-wide BM25 before the overlap re-rank.
    pub bm25: bool,
}

impl QueryParams {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k: DEFAULT_TOP_K,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            rerank: true,
            bm25: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::InvalidQuery(
                "top_k must be at least 1".to_string(),
            ));
        }
        if !(self.score_threshold > 0.0 && self.score_threshold <= 1.0) {
            return Err(Error::InvalidQuery(format!(
                "score_threshold must be in (0, 1], got {}",
                self.score_threshold
            )));
        }
        Ok(())
    }
}

/// A synthesized answer with provenance from the best-ranked segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    /// Text of the highest-ranked segment.
    pub source_document: String,
    /// Source file name of the highest-ranked segment.
    pub doc: String,
    pub metadata: Option<SegmentMetadata>,
    /// Every segment given to the model, best first.
    pub sources: Vec<ScoredSegment>,
}

impl Answer {
    /// The fixed answer for questions nothing in the store can support.
    pub fn insufficient_context() -> Self {
        Self {
            answer: INSUFFICIENT_CONTEXT.to_string(),
            source_document: String::new(),
            doc: String::new(),
            metadata: None,
            sources: Vec::new(),
        }
    }
}

/// Result of a query. Serializes to either the answer object or
/// `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    Answered(Answer),
    Failed { error: String },
}

impl QueryOutcome {
    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered(_))
    }
}

/// The components a query reads from.
#[derive(Clone, Copy)]
pub struct QueryContext<'a> {
    pub embedder: &'a dyn Embedder,
    pub store: &'a dyn VectorStore,
    pub lexical: &'a LexicalIndex,
    pub generator: &'a dyn Generator,
}

/// Answer a question, reporting any fault as [`QueryOutcome::Failed`].
pub fn answer(ctx: QueryContext<'_>, params: &QueryParams) -> QueryOutcome {
    match run_query(ctx, params) {
        Ok(answer) => QueryOutcome::Answered(answer),
        Err(e) => {
            tracing::warn!(error = %e, "query failed");
            QueryOutcome::Failed {
                error: format!("System error: {e}"),
            }
        }
    }
}

/// Run every stage of the query, stopping at the first fault.
pub fn run_query(ctx: QueryContext<'_>, params: &QueryParams) -> Result<Answer> {
    params.validate()?;

    let vector = ctx.embedder.embed(&params.question)?;
    let mut results =
        ctx.store
            .search(&vector, params.top_k, params.score_threshold)?;
    tracing::debug!(hits = results.len(), "vector search");

    if results.is_empty() {
        return Ok(Answer::insufficient_context());
    }

    if params.bm25 {
        results = reranker::lexical_rerank(
            ctx.lexical,
            &params.question,
            results,
            params.top_k,
        )?;
    }
    if params.rerank {
        results =
            reranker::overlap_rerank(&params.question, results, params.top_k);
    }

    let context: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
    let prompt = build_prompt(&params.question, &context);
    let text = ctx.generator.generate(&prompt)?;

    let best = &results[0];
    Ok(Answer {
        answer: text,
        source_document: best.text.clone(),
        doc: best.metadata.source.clone(),
        metadata: Some(best.metadata.clone()),
        sources: results,
    })
}

/// Print an outcome for humans.
pub fn format_human(outcome: &QueryOutcome) {
    match outcome {
        QueryOutcome::Answered(answer) => {
            println!("{}", answer.answer);
            if let Some(ref meta) = answer.metadata {
                println!();
                println!(
                    "Source: {} (page {}, split {})",
                    meta.source, meta.page, meta.split
                );
            }
            for (rank, source) in answer.sources.iter().enumerate() {
                println!(
                    "{:>3}. {:.4}  {}  p.{}  {}",
                    rank + 1,
                    source.score,
                    source.metadata.source,
                    source.metadata.page,
                    source.metadata.split
                );
            }
        }
        QueryOutcome::Failed { error } => {
            eprintln!("{error}");
        }
    }
}

/// Print an outcome as JSON.
pub fn format_json(outcome: &QueryOutcome) -> Result<()> {
    println!("{}", serde_json::to_string(outcome)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        document::{EmbeddedSegment, Segment},
        embedding::HashingEmbedder,
        local_store::LocalStore,
    };

    /// Records prompts and answers with a canned string.
    struct EchoGenerator {
        prompts: Mutex<Vec<String>>,
    }

    impl EchoGenerator {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl Generator for EchoGenerator {
        fn model(&self) -> &str {
            "echo"
        }

        fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("Polyuria and polydipsia.".to_string())
        }
    }

    struct FailingGenerator;

    impl Generator for FailingGenerator {
        fn model(&self) -> &str {
            "failing"
        }

        fn generate(&self, _prompt: &str) -> Result<String> {
            Err(Error::Generation("upstream unavailable".to_string()))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        embedder: HashingEmbedder,
        store: LocalStore,
        lexical: LexicalIndex,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = LocalStore::open(&dir.path().join("store.redb")).unwrap();
            Self {
                _dir: dir,
                embedder: HashingEmbedder::default(),
                store,
                lexical: LexicalIndex::open_in_ram().unwrap(),
            }
        }

        fn add(&self, id: &str, source: &str, text: &str) {
            let segment = Segment {
                id: id.to_string(),
                text: text.to_string(),
                metadata: SegmentMetadata {
                    source: source.to_string(),
                    page: 1,
                    split: "1 of 1".to_string(),
                },
            };
            let vector = self.embedder.embed(text).unwrap();
            self.store
                .upsert(&[EmbeddedSegment {
                    segment: segment.clone(),
                    vector,
                }])
                .unwrap();
            self.lexical.add_segments(&[segment]).unwrap();
        }

        fn ctx<'a>(&'a self, generator: &'a dyn Generator) -> QueryContext<'a> {
            QueryContext {
                embedder: &self.embedder,
                store: &self.store,
                lexical: &self.lexical,
                generator,
            }
        }
    }

    fn answered(outcome: QueryOutcome) -> Answer {
        match outcome {
            QueryOutcome::Answered(answer) => answer,
            QueryOutcome::Failed { error } => panic!("query failed: {error}"),
        }
    }

    #[test]
    fn empty_store_returns_fallback_without_generating() {
        let fx = Fixture::new();
        let generator = EchoGenerator::new();

        let outcome = answer(
            fx.ctx(&generator),
            &QueryParams::new("What are the symptoms of diabetes?"),
        );

        assert_eq!(
            outcome,
            QueryOutcome::Answered(Answer::insufficient_context())
        );
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn fallback_ignores_rerank_flags() {
        let fx = Fixture::new();
        let generator = EchoGenerator::new();
        let mut params = QueryParams::new("diabetes");
        params.bm25 = true;
        params.rerank = false;

        let result = answered(answer(fx.ctx(&generator), &params));
        assert_eq!(result.answer, INSUFFICIENT_CONTEXT);
        assert!(result.metadata.is_none());
    }

    #[test]
    fn answers_with_provenance_from_best_segment() {
        let fx = Fixture::new();
        fx.add("dm", "diabetes.pdf", "Symptoms of diabetes include thirst.");
        fx.add("fx", "ortho.pdf", "Femur fractures need surgery.");
        let generator = EchoGenerator::new();

        let result = answered(answer(
            fx.ctx(&generator),
            &QueryParams::new("symptoms of diabetes"),
        ));

        assert_eq!(result.answer, "Polyuria and polydipsia.");
        assert_eq!(result.doc, "diabetes.pdf");
        assert_eq!(
            result.source_document,
            "Symptoms of diabetes include thirst."
        );
        assert_eq!(result.metadata.as_ref().unwrap().split, "1 of 1");
        assert_eq!(result.sources[0].id, "dm");

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with(
            "Context: Symptoms of diabetes include thirst."
        ));
        assert!(prompts[0].ends_with("\nQuestion: symptoms of diabetes\nAnswer:"));
    }

    #[test]
    fn sources_never_exceed_top_k() {
        let fx = Fixture::new();
        for i in 0..8 {
            fx.add(&format!("s{i}"), "bp.txt", &format!("blood pressure note {i}"));
        }
        let generator = EchoGenerator::new();
        let mut params = QueryParams::new("blood pressure");
        params.top_k = 3;
        params.score_threshold = 0.1;
        params.bm25 = true;

        let result = answered(answer(fx.ctx(&generator), &params));
        assert_eq!(result.sources.len(), 3);
    }

    #[test]
    fn repeated_queries_are_identical() {
        let fx = Fixture::new();
        fx.add("a", "a.txt", "Insulin lowers blood glucose.");
        fx.add("b", "b.txt", "Glucose monitoring with insulin pumps.");
        let generator = EchoGenerator::new();
        let mut params = QueryParams::new("insulin glucose");
        params.score_threshold = 0.1;

        let first = answer(fx.ctx(&generator), &params);
        let second = answer(fx.ctx(&generator), &params);
        assert_eq!(first, second);
    }

    #[test]
    fn overlap_rerank_promotes_more_shared_words() {
        let fx = Fixture::new();
        // "x" is closer in vector space; "y" shares more question words.
        fx.add("x", "x.txt", "diabetes thirst");
        fx.add(
            "y",
            "y.txt",
            "diabetes thirst polyuria fatigue weight loss blurred vision slow healing",
        );
        let generator = EchoGenerator::new();
        let mut params = QueryParams::new("diabetes thirst polyuria");
        params.rerank = false;
        let plain = answered(answer(fx.ctx(&generator), &params));
        assert_eq!(plain.sources[0].id, "x");

        params.rerank = true;
        params.score_threshold = 0.1;

        let result = answered(answer(fx.ctx(&generator), &params));
        assert_eq!(result.sources[0].id, "y");
    }

    #[test]
    fn generator_fault_becomes_system_error() {
        let fx = Fixture::new();
        fx.add("a", "a.txt", "Asthma inhaler technique.");

        let outcome = answer(
            fx.ctx(&FailingGenerator),
            &QueryParams::new("asthma inhaler"),
        );
        assert_eq!(
            outcome,
            QueryOutcome::Failed {
                error: "System error: generation failed: upstream unavailable"
                    .to_string()
            }
        );
    }

    #[test]
    fn embedder_dimension_change_is_reported() {
        let fx = Fixture::new();
        fx.add("a", "a.txt", "Asthma inhaler technique.");
        let generator = EchoGenerator::new();
        let smaller = HashingEmbedder::new(32);
        let ctx = QueryContext {
            embedder: &smaller,
            ..fx.ctx(&generator)
        };

        let QueryOutcome::Failed { error } =
            answer(ctx, &QueryParams::new("asthma inhaler"))
        else {
            panic!("expected failure");
        };
        assert!(error.contains("dimension mismatch"), "{error}");
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn invalid_params_become_system_error() {
        let fx = Fixture::new();
        let generator = EchoGenerator::new();

        let mut params = QueryParams::new("q");
        params.top_k = 0;
        let outcome = answer(fx.ctx(&generator), &params);
        assert!(!outcome.is_answered());

        let mut params = QueryParams::new("q");
        params.score_threshold = 0.0;
        let QueryOutcome::Failed { error } = answer(fx.ctx(&generator), &params)
        else {
            panic!("expected failure");
        };
        assert!(error.starts_with("System error: invalid query"));
    }

    #[test]
    fn outcome_serializes_flat() {
        let fallback = QueryOutcome::Answered(Answer::insufficient_context());
        let value = serde_json::to_value(&fallback).unwrap();
        assert_eq!(value["answer"], INSUFFICIENT_CONTEXT);
        assert_eq!(value["doc"], "");
        assert!(value["metadata"].is_null());

        let failed = QueryOutcome::Failed {
            error: "System error: boom".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"error": "System error: boom"})
        );
    }
}
