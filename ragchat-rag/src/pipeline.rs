//! Indexing and retrieval pipeline over one collection.
//!
//! The [`RagPipeline`] composes an [`EmbeddingProvider`], a [`VectorStore`],
//! a [`ChunkAssembler`], a [`RetrievalCoordinator`], and a [`RerankStage`].
//! Indexing runs chunk → embed → upsert; retrieval runs
//! embed → search → rerank.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchat_rag::{HashingEmbeddingProvider, InMemoryVectorStore, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .collection("rag_documents")
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::new(384)?))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! pipeline.ensure_collection().await?;
//! let report = pipeline.index(&documents).await?;
//! let results = pipeline.retrieve("warranty terms", None, 5).await?;
//! ```

use std::sync::Arc;

use ragchat_telemetry::LogContext;
use tracing::{Instrument, error, info};

use crate::chunking::{ChunkAssembler, GlobalChunkCounter};
use crate::config::RagConfig;
use crate::document::{Chunk, EmbeddedChunk, RetrievalResult, SourceDocument};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::reranker::RerankStage;
use crate::retrieval::RetrievalCoordinator;
use crate::vectorstore::{IndexRecord, VectorStore};

const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

/// Outcome of one [`RagPipeline::index`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Documents that produced at least one chunk.
    pub document_count: usize,
    /// Chunks embedded and stored.
    pub chunk_count: usize,
}

/// Chunking, indexing, and retrieval for a single collection.
///
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    collection: String,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    assembler: ChunkAssembler,
    coordinator: RetrievalCoordinator,
    reranker: RerankStage,
    embed_batch_size: usize,
    log: LogContext,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Name of the collection this pipeline indexes into.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Return a reference to the rerank stage.
    pub fn reranker(&self) -> &RerankStage {
        &self.reranker
    }

    /// Create the collection if it does not exist yet, sized for the
    /// embedding provider.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the vector store operation fails.
    pub async fn ensure_collection(&self) -> Result<()> {
        let dimensions = self.embedding_provider.dimensions();
        self.vector_store.create_collection(&self.collection, dimensions).await.map_err(|e| {
            let _span = self.log.enter();
            error!(collection = %self.collection, error = %e, "failed to create collection");
            RagError::PipelineError(format!(
                "failed to create collection '{}': {e}",
                self.collection
            ))
        })
    }

    /// Chunk, embed, and store `documents`.
    ///
    /// Global chunk ids run from zero across all documents of this call, in
    /// document then page order. Embedding happens in batches after all ids
    /// are assigned. Documents yielding no chunks are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ChunkingError`] if no document produced a chunk,
    /// and [`RagError::PipelineError`] if embedding or storage fails. Every
    /// chunk is embedded before the first write, and a failed call leaves
    /// none of its chunks stored.
    pub async fn index(&self, documents: &[SourceDocument]) -> Result<IndexReport> {
        let mut counter = GlobalChunkCounter::new();
        let chunks = self.assembler.assemble_with(documents, &mut counter);
        if chunks.is_empty() {
            return Err(RagError::ChunkingError(format!(
                "no chunks produced from {} document(s)",
                documents.len()
            )));
        }

        let document_count = documents
            .iter()
            .filter(|document| chunks.iter().any(|c| c.metadata.filename == document.metadata.filename))
            .count();

        let span = self.log.span().clone();
        async move {
            let mut records: Vec<IndexRecord> = Vec::with_capacity(chunks.len());
            for batch in chunks.chunks(self.embed_batch_size) {
                let embedded = self.embed_chunks(batch).await?;
                records.extend(embedded.iter().map(IndexRecord::from_embedded));
            }
            self.store_records(&records).await?;

            let report = IndexReport { document_count, chunk_count: chunks.len() };
            info!(
                collection = %self.collection,
                document_count = report.document_count,
                chunk_count = report.chunk_count,
                "indexed documents"
            );
            Ok::<_, RagError>(report)
        }
        .instrument(span)
        .await
    }

    /// Upsert in batches. If a batch fails, the batches already written by
    /// this call are deleted again.
    async fn store_records(&self, records: &[IndexRecord]) -> Result<()> {
        let mut written = 0;
        for batch in records.chunks(self.embed_batch_size) {
            if let Err(e) = self.vector_store.upsert(&self.collection, batch).await {
                error!(collection = %self.collection, error = %e, "upsert failed during indexing");
                let ids: Vec<&str> = records[..written].iter().map(|r| r.id.as_str()).collect();
                if !ids.is_empty() {
                    if let Err(rollback) = self.vector_store.delete(&self.collection, &ids).await {
                        error!(error = %rollback, rolled_back = ids.len(), "rollback after failed upsert failed");
                    }
                }
                return Err(RagError::PipelineError(format!("upsert failed: {e}")));
            }
            written += batch.len();
        }
        Ok(())
    }

    async fn embed_chunks(&self, batch: &[Chunk]) -> Result<Vec<EmbeddedChunk>> {
        let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
        let embeddings = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
            error!(batch_size = batch.len(), error = %e, "embedding failed during indexing");
            RagError::PipelineError(format!("embedding failed: {e}"))
        })?;
        if embeddings.len() != batch.len() {
            return Err(RagError::PipelineError(format!(
                "embedding provider returned {} vectors for {} chunks",
                embeddings.len(),
                batch.len()
            )));
        }

        Ok(batch
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
            .collect())
    }

    /// Retrieve the best `top_k` chunks for `query`.
    ///
    /// `embed_text` is what gets embedded for the semantic search (a
    /// conversation window, for example) and defaults to `query`. The raw
    /// `query` drives keyword matching and reranking. Retrieval gathers
    /// `top_k * rerank_candidate_factor` candidates for the rerank stage when
    /// a scorer is available.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the query cannot be embedded.
    /// Search and rerank failures degrade instead of erroring.
    pub async fn retrieve(
        &self,
        query: &str,
        embed_text: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let span = self.log.span().clone();
        async move {
            let query_embedding =
                self.embedding_provider.embed(embed_text.unwrap_or(query)).await.map_err(|e| {
                    error!(error = %e, "embedding failed during query");
                    RagError::PipelineError(format!("query embedding failed: {e}"))
                })?;

            let candidate_count = if self.reranker.is_available() {
                self.config.candidate_count(top_k)
            } else {
                top_k
            };
            let candidates = self
                .coordinator
                .search(&query_embedding, Some(query), candidate_count, self.config.hybrid_enabled)
                .await;
            let results = self.reranker.rerank(query, candidates, top_k).await;

            info!(result_count = results.len(), "retrieval completed");
            Ok::<_, RagError>(results)
        }
        .instrument(span)
        .await
    }

    /// Number of chunks stored in the collection.
    pub async fn count(&self) -> Result<usize> {
        self.vector_store.count(&self.collection).await
    }

    /// Delete every stored chunk, keeping the collection itself.
    pub async fn clear(&self) -> Result<usize> {
        let snapshot = self.vector_store.get_all(&self.collection, None).await?;
        if snapshot.is_empty() {
            return Ok(0);
        }
        let ids: Vec<&str> = snapshot.ids.iter().map(String::as_str).collect();
        self.vector_store.delete(&self.collection, &ids).await?;

        let _span = self.log.enter();
        info!(collection = %self.collection, deleted = ids.len(), "cleared collection");
        Ok(ids.len())
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// The embedding provider and vector store are required. Call
/// [`build()`](RagPipelineBuilder::build) to validate and produce the pipeline.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    collection: Option<String>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    reranker: Option<RerankStage>,
    embed_batch_size: Option<usize>,
    log: Option<LogContext>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration. Defaults to [`RagConfig::default()`].
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the collection name. Defaults to `rag_documents`.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the rerank stage. Defaults to pass-through.
    pub fn reranker(mut self, reranker: RerankStage) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Set how many chunks are embedded per provider call.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = Some(size);
        self
    }

    /// Attach the logging context of the owning session.
    pub fn log_context(mut self, log: LogContext) -> Self {
        self.log = Some(log);
        self
    }

    /// Build the [`RagPipeline`], validating the configuration and that all
    /// required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing, the
    /// batch size is zero, or the configuration is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let embed_batch_size = self.embed_batch_size.unwrap_or(DEFAULT_EMBED_BATCH_SIZE);
        if embed_batch_size == 0 {
            return Err(RagError::ConfigError("embed_batch_size must be greater than zero".to_string()));
        }
        let collection = self.collection.unwrap_or_else(|| "rag_documents".to_string());
        let log = self.log.unwrap_or_default();

        let assembler =
            ChunkAssembler::from_config(&config).with_log_context(log.component("chunker"));
        let coordinator = RetrievalCoordinator::new(vector_store.clone(), collection.clone(), &config)
            .with_log_context(log.component("retrieval"));
        let reranker = self.reranker.unwrap_or_default().with_log_context(log.component("reranker"));

        Ok(RagPipeline {
            config,
            collection,
            embedding_provider,
            vector_store,
            assembler,
            coordinator,
            reranker,
            embed_batch_size,
            log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentMetadata, Page};
    use crate::hashing::HashingEmbeddingProvider;
    use crate::inmemory::InMemoryVectorStore;

    fn document(filename: &str, pages: &[&str]) -> SourceDocument {
        let pages: Vec<Page> =
            pages.iter().enumerate().map(|(i, text)| Page::new(i as u32 + 1, *text)).collect();
        SourceDocument {
            content: pages.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join("\n"),
            metadata: DocumentMetadata {
                filename: filename.to_string(),
                file_path: format!("/docs/{filename}"),
                file_type: ".txt".to_string(),
                file_size: 100,
                page_count: pages.len(),
            },
            pages,
        }
    }

    fn pipeline(config: RagConfig) -> RagPipeline {
        RagPipeline::builder()
            .config(config)
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(128).unwrap()))
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .embed_batch_size(2)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn index_then_retrieve() {
        let pipeline = pipeline(RagConfig::default());
        pipeline.ensure_collection().await.unwrap();
        let report = pipeline
            .index(&[
                document("engine.txt", &["Engine oil must be changed every 5000 km.", "Spark plugs last long."]),
                document("bread.txt", &["Bake bread at high temperature.", "Flour and water.", "Yeast."]),
                document("blank.txt", &["   "]),
            ])
            .await
            .unwrap();
        assert_eq!(report, IndexReport { document_count: 2, chunk_count: 5 });
        assert_eq!(pipeline.count().await.unwrap(), 5);

        let results = pipeline.retrieve("When is the engine oil changed?", None, 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata.filename, "engine.txt");
        assert_eq!(results[0].metadata.page_number, Some(1));
    }

    #[tokio::test]
    async fn index_without_chunks_fails() {
        let pipeline = pipeline(RagConfig::default());
        pipeline.ensure_collection().await.unwrap();
        let err = pipeline.index(&[document("blank.txt", &["", " \n "])]).await.unwrap_err();
        assert!(matches!(err, RagError::ChunkingError(_)));
        assert_eq!(pipeline.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let pipeline = pipeline(RagConfig::default());
        pipeline.ensure_collection().await.unwrap();
        pipeline.index(&[document("a.txt", &["alpha", "beta"])]).await.unwrap();
        assert_eq!(pipeline.clear().await.unwrap(), 2);
        assert_eq!(pipeline.count().await.unwrap(), 0);
        assert_eq!(pipeline.clear().await.unwrap(), 0);
    }

    /// Fails every `embed_batch` call after the first `healthy_batches`.
    struct FlakyProvider {
        inner: HashingEmbeddingProvider,
        healthy_batches: usize,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for FlakyProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call >= self.healthy_batches {
                return Err(RagError::EmbeddingError {
                    provider: "flaky".into(),
                    message: "service unavailable".into(),
                });
            }
            self.inner.embed_batch(texts).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }
    }

    #[tokio::test]
    async fn failed_embedding_stores_nothing() {
        let pipeline = RagPipeline::builder()
            .embedding_provider(Arc::new(FlakyProvider {
                inner: HashingEmbeddingProvider::new(64).unwrap(),
                healthy_batches: 1,
                calls: Default::default(),
            }))
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .embed_batch_size(2)
            .build()
            .unwrap();
        pipeline.ensure_collection().await.unwrap();

        let err = pipeline
            .index(&[document("four.txt", &["one page", "two page", "three page", "four page"])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::PipelineError(_)));
        assert_eq!(pipeline.count().await.unwrap(), 0);
    }

    #[test]
    fn builder_requires_provider_and_store() {
        let err = RagPipeline::builder()
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RagError::ConfigError(_)));
    }
}
