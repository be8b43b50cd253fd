use std::path::Path;

use serde::{Serialize, Serializer};

use crate::{
    chunking::{self, ChunkingConfig},
    document::EmbeddedSegment,
    embedding::Embedder,
    error::{Error, Result},
    loader::{self, DocumentKind},
    tantivy_index::LexicalIndex,
    vector_store::VectorStore,
};

/// Result of ingesting one file.
///
/// Faults never escape ingestion; they are reported here as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestReport {
    Success { message: String, segments: usize },
    Failure { message: String },
}

impl IngestReport {
    pub fn success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Success { message, .. } | Self::Failure { message } => {
                message
            }
        }
    }

    /// Number of segments stored, zero on failure.
    pub fn segments(&self) -> usize {
        match self {
            Self::Success { segments, .. } => *segments,
            Self::Failure { .. } => 0,
        }
    }
}

/// Serializes as `{"success": bool, "message": string}`.
impl Serialize for IngestReport {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Payload<'a> {
            success: bool,
            message: &'a str,
        }

        Payload {
            success: self.success(),
            message: self.message(),
        }
        .serialize(serializer)
    }
}

/// Load, chunk, tag, embed and store one document.
///
/// Unsupported extensions are rejected before anything is read or written.
/// Segments are appended to the vector store first, then to the lexical
/// index; a fault part-way through is not rolled back.
pub fn ingest_file(
    path: &Path,
    chunking: ChunkingConfig,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    lexical: &LexicalIndex,
) -> IngestReport {
    let ext = loader::extension_label(path);

    if DocumentKind::from_path(path).is_none() {
        tracing::warn!(path = %path.display(), "unsupported file type");
        return IngestReport::Failure {
            message: format!("Unsupported file type: {ext}"),
        };
    }

    match store_document(path, chunking, embedder, store, lexical) {
        Ok(segments) => {
            tracing::info!(
                path = %path.display(),
                segments,
                "ingested document"
            );
            IngestReport::Success {
                message: format!("Processed {ext} file successfully"),
                segments,
            }
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ingestion failed");
            IngestReport::Failure {
                message: format!("Error: {e}"),
            }
        }
    }
}

fn store_document(
    path: &Path,
    chunking: ChunkingConfig,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    lexical: &LexicalIndex,
) -> Result<usize> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::Config(format!("not a file path: {}", path.display()))
        })?;

    let document = loader::load(path)?;
    let chunks = chunking::chunk_text(&document.text(), chunking);
    tracing::debug!(
        file = %file_name,
        pages = document.total_pages(),
        chunks = chunks.len(),
        "chunked document"
    );

    let segments =
        chunking::tag_segments(chunks, &file_name, document.total_pages());
    if segments.is_empty() {
        return Ok(0);
    }

    let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts)?;
    if vectors.len() != segments.len() {
        return Err(Error::Embedding(format!(
            "expected {} vectors, got {}",
            segments.len(),
            vectors.len()
        )));
    }

    let embedded: Vec<EmbeddedSegment> = segments
        .iter()
        .cloned()
        .zip(vectors)
        .map(|(segment, vector)| EmbeddedSegment { segment, vector })
        .collect();

    store.upsert(&embedded)?;
    lexical.add_segments(&segments)?;

    Ok(segments.len())
}
