//! Qdrant vector store backend.
//!
//! Points are stored with the segment's UUID as id, the segment vector, and
//! a payload of `{page_content, metadata: {source, page, split}}`. The
//! collection is created on first upsert with cosine distance and the
//! dimension of the first vector seen.
//!
//! The [qdrant-client](https://docs.rs/qdrant-client) API is async; the
//! store owns a current-thread runtime and blocks on each call, so it must
//! not be used (or dropped) from inside another runtime's async task.

use std::{collections::HashMap, future::Future, time::Duration};

use qdrant_client::{
    Qdrant,
    QdrantError,
    qdrant::{
        CountPointsBuilder,
        CreateCollectionBuilder,
        Distance,
        PointId,
        PointStruct,
        SearchPointsBuilder,
        UpsertPointsBuilder,
        Value as QdrantValue,
        VectorParamsBuilder,
        point_id::PointIdOptions,
        value::Kind,
        vectors_config::Config as VectorsConfig,
    },
};
use tokio::runtime::Runtime;

use crate::{
    document::{EmbeddedSegment, ScoredSegment, SegmentMetadata},
    error::{Error, Result},
    vector_store::{COLLECTION_NAME, VectorStore},
};

/// Default gRPC endpoint of a local Qdrant server.
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// A [`VectorStore`] backed by a [Qdrant](https://qdrant.tech/) server.
pub struct QdrantStore {
    client: Qdrant,
    runtime: Runtime,
    url: String,
    collection: String,
}

impl QdrantStore {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Self::with_collection(url, COLLECTION_NAME, timeout)
    }

    pub fn with_collection(
        url: &str,
        collection: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let client = {
            let _guard = runtime.enter();
            Qdrant::from_url(url)
                .timeout(timeout)
                .build()
                .map_err(map_err)?
        };

        Ok(Self {
            client,
            runtime,
            url: url.to_string(),
            collection: collection.to_string(),
        })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn collection_exists(&self) -> Result<bool> {
        self.block_on(self.client.collection_exists(&self.collection))
            .map_err(map_err)
    }

    /// Vector size of the collection, or `None` if it does not exist.
    fn vector_size(&self) -> Result<Option<u64>> {
        if !self.collection_exists()? {
            return Ok(None);
        }

        let info = self
            .block_on(self.client.collection_info(&self.collection))
            .map_err(map_err)?;
        let size = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|config| match config {
                VectorsConfig::Params(params) => Some(params.size),
                VectorsConfig::ParamsMap(_) => None,
            })
            .ok_or_else(|| {
                Error::VectorStore(format!(
                    "collection {} has no single unnamed vector",
                    self.collection
                ))
            })?;
        Ok(Some(size))
    }

    fn create_collection(&self, size: u64) -> Result<()> {
        self.block_on(self.client.create_collection(
            CreateCollectionBuilder::new(&self.collection)
                .vectors_config(VectorParamsBuilder::new(size, Distance::Cosine)),
        ))
        .map_err(map_err)?;

        tracing::debug!(
            collection = %self.collection,
            size,
            "created qdrant collection"
        );
        Ok(())
    }
}

impl VectorStore for QdrantStore {
    fn backend(&self) -> &str {
        "qdrant"
    }

    fn upsert(&self, segments: &[EmbeddedSegment]) -> Result<()> {
        let Some(first) = segments.first() else {
            return Ok(());
        };
        if !self.collection_exists()? {
            self.create_collection(first.vector.len() as u64)?;
        }

        let points: Vec<PointStruct> = segments.iter().map(to_point).collect();
        self.block_on(self.client.upsert_points(
            UpsertPointsBuilder::new(&self.collection, points).wait(true),
        ))
        .map_err(map_err)?;

        tracing::debug!(
            collection = %self.collection,
            count = segments.len(),
            "upserted points to qdrant"
        );
        Ok(())
    }

    fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredSegment>> {
        if !self.collection_exists()? {
            return Ok(Vec::new());
        }

        let response = self
            .block_on(
                self.client.search_points(
                    SearchPointsBuilder::new(
                        &self.collection,
                        vector.to_vec(),
                        top_k as u64,
                    )
                    .score_threshold(score_threshold)
                    .with_payload(true),
                ),
            )
            .map_err(map_err)?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let (text, metadata) = from_payload(&point.payload);
                ScoredSegment {
                    id: point_id_string(point.id),
                    text,
                    metadata,
                    score: point.score,
                }
            })
            .collect())
    }

    fn reset(&self) -> Result<()> {
        let Some(size) = self.vector_size()? else {
            return Ok(());
        };

        self.block_on(self.client.delete_collection(&self.collection))
            .map_err(map_err)?;
        self.create_collection(size)?;

        tracing::info!(collection = %self.collection, "reset qdrant collection");
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        if !self.collection_exists()? {
            return Ok(0);
        }

        let response = self
            .block_on(self.client.count(
                CountPointsBuilder::new(&self.collection).exact(true),
            ))
            .map_err(map_err)?;
        Ok(response.result.map_or(0, |r| r.count as usize))
    }
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore")
            .field("url", &self.url)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

fn map_err(e: QdrantError) -> Error {
    Error::VectorStore(format!("qdrant: {e}"))
}

fn to_point(embedded: &EmbeddedSegment) -> PointStruct {
    let segment = &embedded.segment;
    let metadata = HashMap::from([
        (
            "source".to_string(),
            QdrantValue::from(segment.metadata.source.clone()),
        ),
        (
            "page".to_string(),
            QdrantValue::from(i64::from(segment.metadata.page)),
        ),
        (
            "split".to_string(),
            QdrantValue::from(segment.metadata.split.clone()),
        ),
    ]);
    let payload: HashMap<String, QdrantValue> = HashMap::from([
        (
            "page_content".to_string(),
            QdrantValue::from(segment.text.clone()),
        ),
        ("metadata".to_string(), QdrantValue::from(qdrant_client::Payload::from(metadata))),
    ]);

    PointStruct::new(segment.id.clone(), embedded.vector.clone(), payload)
}

/// Segment text and metadata from a stored payload.
///
/// Points written by other LangChain-style loaders may lack `split` or
/// `page`; those fall back to an empty split and page 1.
fn from_payload(payload: &HashMap<String, QdrantValue>) -> (String, SegmentMetadata) {
    let text = payload
        .get("page_content")
        .and_then(string_value)
        .unwrap_or_default();

    let fields = payload.get("metadata").and_then(|v| match &v.kind {
        Some(Kind::StructValue(s)) => Some(&s.fields),
        _ => None,
    });
    let field = |name: &str| fields.and_then(|f| f.get(name));

    let metadata = SegmentMetadata {
        source: field("source").and_then(string_value).unwrap_or_default(),
        page: field("page").and_then(page_value).unwrap_or(1),
        split: field("split").and_then(string_value).unwrap_or_default(),
    };
    (text, metadata)
}

fn string_value(value: &QdrantValue) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn page_value(value: &QdrantValue) -> Option<u32> {
    match value.kind {
        Some(Kind::IntegerValue(n)) => u32::try_from(n).ok(),
        Some(Kind::DoubleValue(n)) if n >= 0.0 => Some(n as u32),
        _ => None,
    }
}

fn point_id_string(id: Option<PointId>) -> String {
    match id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Uuid(s)) => s,
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}
