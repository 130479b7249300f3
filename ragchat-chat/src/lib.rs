//! # ragchat-chat
//!
//! Conversational question answering over a local document collection.
//!
//! ## Overview
//!
//! - [`Orchestrator`] - one chat session: load documents, then ask questions
//!   with [`Orchestrator::query`] or [`Orchestrator::stream_query`]
//! - [`DocumentLoader`] / [`PlainTextLoader`] - turning files into pages
//! - [`ConversationManager`] - bounded history, conversation window, JSON
//!   persistence
//! - [`PromptAssembler`] - the citation-oriented generation prompt
//! - [`ChatConfig`] - every setting, loadable from one JSON file
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use ragchat_chat::{ChatConfig, Orchestrator};
//! use ragchat_rag::HashingEmbeddingProvider;
//!
//! ragchat_telemetry::init_telemetry("ragchat");
//!
//! let mut chat = Orchestrator::builder()
//!     .config(ChatConfig::default())
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::new(384)?))
//!     .build()?;
//!
//! chat.load(Path::new("data/documents")).await?;
//! println!("{}", chat.query("What does chapter 2 cover?", 5).await);
//! ```

pub mod config;
pub mod conversation;
pub mod error;
pub mod ingest;
pub mod orchestrator;
pub mod prompt;

pub use config::{ChatConfig, PromptConfig};
pub use conversation::{ConversationManager, Exchange};
pub use error::{ChatError, NOT_INITIALIZED_MESSAGE, QUERY_FAILED_MESSAGE, Result};
pub use ingest::{DocumentLoader, PlainTextLoader};
pub use orchestrator::{CollectionInfo, Orchestrator, OrchestratorBuilder, OrchestratorState, QueryStream};
pub use prompt::{PromptAssembler, citation};
