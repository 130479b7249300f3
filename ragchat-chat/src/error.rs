//! Error types for the `ragchat-chat` crate.

use std::path::PathBuf;

use ragchat_model::ModelError;
use ragchat_rag::RagError;
use thiserror::Error;

/// Reply given to questions asked before any documents were loaded.
pub const NOT_INITIALIZED_MESSAGE: &str = "Please load documents first before asking questions.";

/// Reply given when a question could not be answered for an internal reason.
pub const QUERY_FAILED_MESSAGE: &str =
    "Sorry, I encountered an error while processing your question.";

/// Errors surfaced by the chat layer.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A query was attempted before any successful load.
    #[error("no documents have been loaded")]
    NotInitialized,

    /// No documents were found, or none produced any chunk.
    #[error("no usable input: {0}")]
    EmptyInput(String),

    /// A single document could not be read or decoded.
    #[error("failed to ingest {}: {message}", path.display())]
    Ingestion { path: PathBuf, message: String },

    /// An embedding, vector index, or generation collaborator failed.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// Saving or loading chat history failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Rag(#[from] RagError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl ChatError {
    /// Short sentence suitable for an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotInitialized => NOT_INITIALIZED_MESSAGE,
            Self::Model(e) => e.user_message(),
            _ => QUERY_FAILED_MESSAGE,
        }
    }
}

/// A convenience result type for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;
