//! Vector index trait and the records it stores.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::document::{ChunkMetadata, EmbeddedChunk, RetrievalResult};
use crate::error::Result;

/// One stored entry: id, vector, string metadata, and the chunk text.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    /// String-only metadata, see [`ChunkMetadata::to_index_metadata`].
    pub metadata: BTreeMap<String, String>,
    pub document: String,
}

impl IndexRecord {
    /// Build the record for an embedded chunk. The id is the chunk's
    /// identity key.
    pub fn from_embedded(chunk: &EmbeddedChunk) -> Self {
        Self {
            id: chunk.chunk.metadata.identity_key(),
            embedding: chunk.embedding.clone(),
            metadata: chunk.chunk.metadata.to_index_metadata(),
            document: chunk.chunk.content.clone(),
        }
    }
}

/// A nearest-neighbor hit. Lower `distance` is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub document: String,
    pub metadata: BTreeMap<String, String>,
    pub distance: f32,
}

impl IndexHit {
    /// Convert into a semantic [`RetrievalResult`] (distance set, no score).
    pub fn into_result(self) -> RetrievalResult {
        RetrievalResult {
            content: self.document,
            metadata: ChunkMetadata::from_index_metadata(&self.metadata),
            distance: Some(self.distance),
            score: None,
        }
    }
}

/// Parallel arrays describing stored entries, in storage order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSnapshot {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<BTreeMap<String, String>>,
}

impl IndexSnapshot {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A storage backend for vector embeddings with nearest-neighbor search.
///
/// Implementations manage named collections of [`IndexRecord`]s. Upserting an
/// existing id replaces that entry.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// store.upsert("docs", &records).await?;
/// let hits = store.query("docs", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its data.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert or replace records in a collection.
    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<()>;

    /// Return up to `k` records nearest to `embedding`, by ascending distance.
    async fn query(&self, collection: &str, embedding: &[f32], k: usize)
    -> Result<Vec<IndexHit>>;

    /// Return stored records in storage order, at most `limit` when given.
    async fn get_all(&self, collection: &str, limit: Option<usize>) -> Result<IndexSnapshot>;

    /// Delete records by id. Unknown ids are ignored.
    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()>;

    /// Number of records in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;
}
