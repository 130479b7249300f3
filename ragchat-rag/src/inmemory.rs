//! In-memory vector store using cosine distance.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by
//! insertion-ordered maps behind a `tokio::sync::RwLock`. It is suitable for
//! development, testing, and single-process use; nothing is persisted.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::error::{RagError, Result};
use crate::vectorstore::{IndexHit, IndexRecord, IndexSnapshot, VectorStore};

const BACKEND: &str = "InMemory";

#[derive(Debug, Default)]
struct Collection {
    dimensions: usize,
    records: IndexMap<String, IndexRecord>,
}

/// An in-memory vector store.
///
/// Collections map record id → record and keep insertion order, so
/// [`get_all`](VectorStore::get_all) snapshots are stable and an upsert of an
/// existing id keeps its original position. Distances are cosine distances
/// (`1 - cosine_similarity`), in `[0, 2]`.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(collection: &str) -> RagError {
    RagError::store(BACKEND, format!("collection '{collection}' does not exist"))
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| Collection { dimensions, records: IndexMap::new() });
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;

        if let Some(bad) = records.iter().find(|r| r.embedding.len() != store.dimensions) {
            return Err(RagError::store(
                BACKEND,
                format!(
                    "record '{}' has {} dimensions, collection '{collection}' expects {}",
                    bad.id,
                    bad.embedding.len(),
                    store.dimensions
                ),
            ));
        }

        for record in records {
            store.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<IndexHit>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut hits: Vec<IndexHit> = store
            .records
            .values()
            .map(|record| IndexHit {
                id: record.id.clone(),
                document: record.document.clone(),
                metadata: record.metadata.clone(),
                distance: 1.0 - cosine_similarity(&record.embedding, embedding),
            })
            .collect();

        // Stable: equal distances keep insertion order.
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn get_all(&self, collection: &str, limit: Option<usize>) -> Result<IndexSnapshot> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut snapshot = IndexSnapshot::default();
        for record in store.records.values().take(limit.unwrap_or(usize::MAX)) {
            snapshot.ids.push(record.id.clone());
            snapshot.documents.push(record.document.clone());
            snapshot.metadatas.push(record.metadata.clone());
        }
        Ok(snapshot)
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        for id in ids {
            store.records.shift_remove(*id);
        }
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(store.records.len())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn record(id: &str, embedding: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            embedding,
            metadata: BTreeMap::from([("filename".to_string(), format!("{id}.pdf"))]),
            document: format!("text of {id}"),
        }
    }

    #[tokio::test]
    async fn query_orders_by_ascending_distance() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();
        store
            .upsert(
                "docs",
                &[
                    record("far", vec![-1.0, 0.0]),
                    record("near", vec![1.0, 0.0]),
                    record("mid", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.query("docs", &[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!(hits[0].distance.abs() < 1e-6);
        assert!((hits[1].distance - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_replaces_in_place_and_get_all_respects_limit() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 1).await.unwrap();
        store
            .upsert("docs", &[record("a", vec![1.0]), record("b", vec![1.0]), record("c", vec![1.0])])
            .await
            .unwrap();
        let mut replacement = record("a", vec![1.0]);
        replacement.document = "updated".to_string();
        store.upsert("docs", &[replacement]).await.unwrap();

        let snapshot = store.get_all("docs", Some(2)).await.unwrap();
        assert_eq!(snapshot.ids, vec!["a", "b"]);
        assert_eq!(snapshot.documents[0], "updated");
        assert_eq!(store.count("docs").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_removes_ids_and_keeps_order() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 1).await.unwrap();
        store
            .upsert("docs", &[record("a", vec![1.0]), record("b", vec![1.0]), record("c", vec![1.0])])
            .await
            .unwrap();
        store.delete("docs", &["b", "missing"]).await.unwrap();

        let snapshot = store.get_all("docs", None).await.unwrap();
        assert_eq!(snapshot.ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 3).await.unwrap();
        let err = store.upsert("docs", &[record("a", vec![1.0])]).await.unwrap_err();
        assert!(matches!(err, RagError::VectorStoreError { .. }));
        assert_eq!(store.count("docs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_collection_is_an_error() {
        let store = InMemoryVectorStore::new();
        assert!(store.count("nope").await.is_err());
        assert!(store.query("nope", &[1.0], 1).await.is_err());
    }
}
