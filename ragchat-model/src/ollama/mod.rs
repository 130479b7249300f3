//! Ollama provider using the `/api/generate` endpoint.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchat_model::ollama::{OllamaClient, OllamaConfig};
//!
//! let client = OllamaClient::new(OllamaConfig::default().with_model("llama3"))?;
//! client.check_connection().await?;
//! let answer = client.generate("Why is the sky blue?", &GenerationOptions::default()).await?;
//! ```

mod client;
mod config;

pub use client::OllamaClient;
pub use config::{DEFAULT_BASE_URL, DEFAULT_MODEL, OllamaConfig};
