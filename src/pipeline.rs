use std::path::Path;

use serde::Serialize;

use crate::{
    chunking::ChunkingConfig,
    config::{EmbedderKind, Settings},
    embedding::{Embedder, HashingEmbedder},
    error::Result,
    generation::{Generator, OpenAiGenerator},
    ingestion::{self, IngestReport},
    local_store::LocalStore,
    model_manager::ColbertEmbedder,
    qdrant::QdrantStore,
    query::{self, QueryContext, QueryOutcome, QueryParams},
    tantivy_index::LexicalIndex,
    vector_store::VectorStore,
};

/// Owns every component ingestion and querying need.
///
/// Open one at startup and share it (it is `Send + Sync`); dropping it
/// releases the stores and the model.
pub struct Pipeline {
    embedder: Box<dyn Embedder>,
    store: Box<dyn VectorStore>,
    lexical: LexicalIndex,
    generator: Box<dyn Generator>,
    chunking: ChunkingConfig,
}

/// Counts and component names reported by `medrag status`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub store_backend: String,
    pub segments: usize,
    pub lexical_segments: u64,
    pub embedder: String,
    pub llm_model: String,
}

impl Pipeline {
    pub fn new(
        embedder: Box<dyn Embedder>,
        store: Box<dyn VectorStore>,
        lexical: LexicalIndex,
        generator: Box<dyn Generator>,
    ) -> Self {
        Self {
            embedder,
            store,
            lexical,
            generator,
            chunking: ChunkingConfig::default(),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Build the configured components.
    ///
    /// Creates blocking HTTP clients, so call this outside any async
    /// runtime.
    pub fn open(settings: &Settings) -> Result<Self> {
        let embedder: Box<dyn Embedder> = match settings.embedder {
            EmbedderKind::Colbert => {
                Box::new(ColbertEmbedder::new(settings.model_name.clone()))
            }
            EmbedderKind::Hashing => Box::new(HashingEmbedder::default()),
        };

        let store: Box<dyn VectorStore> = match settings.qdrant_url {
            Some(ref url) => {
                Box::new(QdrantStore::new(url, settings.http_timeout)?)
            }
            None => Box::new(LocalStore::open(&settings.data_dir.store_db())?),
        };

        let lexical = LexicalIndex::open(&settings.data_dir.lexical_dir()?)?;

        let generator = Box::new(OpenAiGenerator::new(
            &settings.llm_base_url,
            &settings.llm_model,
            settings.api_key.clone(),
            settings.http_timeout,
        )?);

        tracing::debug!(
            embedder = embedder.name(),
            store = store.backend(),
            llm = %settings.llm_model,
            "pipeline opened"
        );

        Ok(Self::new(embedder, store, lexical, generator))
    }

    /// Ingest one file. Faults are reported in the returned value.
    pub fn ingest(&self, path: &Path) -> IngestReport {
        ingestion::ingest_file(
            path,
            self.chunking,
            self.embedder.as_ref(),
            self.store.as_ref(),
            &self.lexical,
        )
    }

    /// Answer a question. Faults are reported in the returned value.
    pub fn answer(&self, params: &QueryParams) -> QueryOutcome {
        query::answer(self.query_context(), params)
    }

    /// Remove every stored segment from the vector store and the lexical
    /// index.
    pub fn reset(&self) -> Result<()> {
        self.store.reset()?;
        self.lexical.clear()?;
        tracing::info!("cleared all stored segments");
        Ok(())
    }

    pub fn status(&self) -> Result<PipelineStatus> {
        Ok(PipelineStatus {
            store_backend: self.store.backend().to_string(),
            segments: self.store.count()?,
            lexical_segments: self.lexical.num_segments()?,
            embedder: self.embedder.name().to_string(),
            llm_model: self.generator.model().to_string(),
        })
    }

    fn query_context(&self) -> QueryContext<'_> {
        QueryContext {
            embedder: self.embedder.as_ref(),
            store: self.store.as_ref(),
            lexical: &self.lexical,
            generator: self.generator.as_ref(),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("embedder", &self.embedder.name())
            .field("store", &self.store.backend())
            .field("generator", &self.generator.model())
            .field("chunking", &self.chunking)
            .finish_non_exhaustive()
    }
}
