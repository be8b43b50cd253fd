use std::path::Path;

use rayon::prelude::*;
use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};

use crate::{
    document::{EmbeddedSegment, ScoredSegment, Segment},
    embedding::cosine_similarity,
    error::{Error, Result},
    vector_store::{COLLECTION_NAME, VectorStore, rank_candidates},
};

/// Header size: 4 bytes vector dimension.
const HEADER_SIZE: usize = 4;

/// Embedded vector store backed by a redb database.
///
/// Each collection is one table keyed by an increasing `u64`, so entries
/// come back in insertion order. Binary format per entry:
/// - 4 bytes: vector dimension D (u32 LE)
/// - D * 4 bytes: f32 values in native byte order
/// - remaining bytes: the segment (id, text, metadata) as JSON
pub struct LocalStore {
    db: Database,
    collection: String,
}

impl LocalStore {
    /// Open or create a store at the given path using the default
    /// collection.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use medrag::{LocalStore, vector_store::VectorStore};
    ///
    /// let store = LocalStore::open(&tmp.path().join("store.redb")).unwrap();
    /// assert_eq!(store.count().unwrap(), 0);
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_collection(path, COLLECTION_NAME)
    }

    pub fn open_collection(path: &Path, collection: &str) -> Result<Self> {
        let db = Database::create(path)?;
        let store = Self {
            db,
            collection: collection.to_string(),
        };

        let txn = store.db.begin_write()?;
        txn.open_table(store.table())?;
        txn.commit()?;

        Ok(store)
    }

    fn table(&self) -> TableDefinition<'_, u64, &'static [u8]> {
        TableDefinition::new(&self.collection)
    }

    /// All stored entries in insertion order.
    fn load_all(&self) -> Result<Vec<(Segment, Vec<f32>)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(self.table())?;

        let mut entries = Vec::new();
        for entry in table.iter()? {
            let (_key, value) = entry?;
            entries.push(decode_record(value.value())?);
        }
        Ok(entries)
    }
}

impl VectorStore for LocalStore {
    fn backend(&self) -> &str {
        "local"
    }

    fn upsert(&self, segments: &[EmbeddedSegment]) -> Result<()> {
        if segments.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(self.table())?;
            let mut next_key = match table.last()? {
                Some((key, _)) => key.value() + 1,
                None => 0,
            };

            for embedded in segments {
                let payload = serde_json::to_vec(&embedded.segment)?;
                let vector: &[u8] = bytemuck::cast_slice(&embedded.vector);
                let dimension = u32::try_from(embedded.vector.len())
                    .map_err(|_| {
                        Error::VectorStore("vector too large".to_string())
                    })?;

                let byte_len = HEADER_SIZE + vector.len() + payload.len();
                let mut guard = table.insert_reserve(next_key, byte_len)?;
                let dest = guard.as_mut();

                let payload_start = HEADER_SIZE + vector.len();
                dest[..HEADER_SIZE].copy_from_slice(&dimension.to_le_bytes());
                dest[HEADER_SIZE..payload_start].copy_from_slice(vector);
                dest[payload_start..].copy_from_slice(&payload);

                next_key += 1;
            }
        }
        txn.commit()?;

        tracing::debug!(
            collection = %self.collection,
            count = segments.len(),
            "appended segments to local store"
        );
        Ok(())
    }

    fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredSegment>> {
        let entries = self.load_all()?;

        if let Some((_, stored)) =
            entries.iter().find(|(_, stored)| stored.len() != vector.len())
        {
            return Err(Error::VectorStore(format!(
                "dimension mismatch: query has {} dimensions, stored segments have {}",
                vector.len(),
                stored.len()
            )));
        }

        let candidates: Vec<ScoredSegment> = entries
            .into_par_iter()
            .map(|(segment, stored)| {
                let score = cosine_similarity(vector, &stored);
                ScoredSegment::new(segment, score)
            })
            .collect();

        Ok(rank_candidates(candidates, top_k, score_threshold))
    }

    fn reset(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(self.table())?;
        txn.open_table(self.table())?;
        txn.commit()?;

        tracing::info!(collection = %self.collection, "reset local store");
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(self.table())?;
        Ok(table.len()? as usize)
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

fn decode_record(bytes: &[u8]) -> Result<(Segment, Vec<f32>)> {
    let corrupt = || Error::VectorStore("corrupt segment record".to_string());

    let header: [u8; HEADER_SIZE] = bytes
        .get(..HEADER_SIZE)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(corrupt)?;
    let dimension = u32::from_le_bytes(header) as usize;

    let payload_start = HEADER_SIZE + dimension * 4;
    let vector_bytes =
        bytes.get(HEADER_SIZE..payload_start).ok_or_else(corrupt)?;
    let vector: Vec<f32> = bytemuck::pod_collect_to_vec(vector_bytes);

    let segment: Segment = serde_json::from_slice(&bytes[payload_start..])?;
    Ok((segment, vector))
}
