//! # ragchat-rag
//!
//! Retrieval core for document question answering: chunking, embedding and
//! vector index traits, hybrid semantic/lexical search, and reranking.
//!
//! ## Overview
//!
//! - [`ChunkAssembler`] cleans page text and splits it into overlapping
//!   [`Chunk`]s carrying page, section, and id metadata.
//! - [`EmbeddingProvider`] and [`VectorStore`] are the seams to external
//!   embedding models and vector indexes. [`HashingEmbeddingProvider`] and
//!   [`InMemoryVectorStore`] work offline.
//! - [`RetrievalCoordinator`] fuses nearest-neighbor and keyword results.
//! - [`RerankStage`] reorders candidates with an optional [`PairwiseScorer`].
//! - [`RagPipeline`] ties them together for one collection.
//!
//! ## Features
//!
//! - `openai` enables [`openai::OpenAIEmbeddingProvider`].

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod hashing;
pub mod inmemory;
pub mod keyword;
pub mod pipeline;
pub mod reranker;
pub mod retrieval;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{ChunkAssembler, GlobalChunkCounter, RecursiveSplitter, clean_text, detect_section};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, ChunkMetadata, DocumentMetadata, EmbeddedChunk, Page, PageFlags, RetrievalResult,
    SourceDocument,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use hashing::HashingEmbeddingProvider;
pub use inmemory::{InMemoryVectorStore, cosine_similarity};
pub use keyword::{extract_frequent_keywords, extract_keywords};
pub use pipeline::{IndexReport, RagPipeline, RagPipelineBuilder};
pub use reranker::{EmbeddingSimilarityScorer, PairwiseScorer, RerankStage, RerankStrategy};
pub use retrieval::{FusionWeights, RetrievalCoordinator, fuse};
pub use vectorstore::{IndexHit, IndexRecord, IndexSnapshot, VectorStore};
