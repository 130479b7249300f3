//! The text generation seam.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An ordered, finite sequence of text increments.
///
/// The consumer may stop polling at any point; dropping the stream releases
/// the underlying connection.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Sampling options passed with every generation request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationOptions {
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Top-k truncation.
    pub top_k: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self { temperature: 0.7, top_p: 0.9, top_k: 40 }
    }
}

/// A provider that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model or provider name, for logs.
    fn name(&self) -> &str;

    /// Generate the full response for `prompt`.
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;

    /// Generate the response for `prompt` as a stream of increments.
    ///
    /// Errors before the first increment (connection, status) are returned
    /// directly; later failures are yielded as the stream's final item.
    async fn stream_generate(&self, prompt: &str, options: &GenerationOptions)
    -> Result<TextStream>;
}
