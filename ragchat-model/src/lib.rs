//! # ragchat-model
//!
//! Text generation providers for the chat pipeline.
//!
//! ## Overview
//!
//! - [`TextGenerator`] - the provider seam: one-shot and streamed generation
//! - [`OllamaClient`] - Ollama's `/api/generate` endpoint, with NDJSON streaming
//! - [`MockGenerator`] - scripted provider for tests
//!
//! Failures are reported as [`ModelError`]; [`ModelError::user_message`]
//! gives the short sentence shown to users instead of an answer.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ragchat_model::{GenerationOptions, OllamaClient, OllamaConfig, TextGenerator};
//!
//! let model = OllamaClient::new(OllamaConfig::default())?;
//! let mut stream = model.stream_generate("Hello", &GenerationOptions::default()).await?;
//! while let Some(increment) = stream.next().await {
//!     print!("{}", increment?);
//! }
//! ```
//!
//! ## Features
//!
//! - `ollama` (default) enables [`OllamaClient`].

pub mod error;
pub mod generation;
pub mod mock;
#[cfg(feature = "ollama")]
pub mod ollama;

pub use error::{ModelError, Result};
pub use generation::{GenerationOptions, TextGenerator, TextStream};
pub use mock::MockGenerator;
#[cfg(feature = "ollama")]
pub use ollama::{OllamaClient, OllamaConfig};
