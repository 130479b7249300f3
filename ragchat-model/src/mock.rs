//! Scripted generator for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use crate::error::{ModelError, Result};
use crate::generation::{GenerationOptions, TextGenerator, TextStream};

/// A [`TextGenerator`] that replays a fixed list of increments.
///
/// `generate` returns the concatenated increments; `stream_generate` yields
/// them one by one, optionally followed by an error. Every prompt received is
/// recorded for inspection.
///
/// # Example
///
/// ```rust
/// use ragchat_model::MockGenerator;
///
/// let mock = MockGenerator::new(["Hello", ", world"]);
/// assert_eq!(mock.response(), "Hello, world");
/// ```
#[derive(Debug, Default)]
pub struct MockGenerator {
    increments: Vec<String>,
    fail_after: Option<String>,
    fail_immediately: bool,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn new<I, S>(increments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { increments: increments.into_iter().map(Into::into).collect(), ..Self::default() }
    }

    /// End the stream with a connection error after the scripted increments.
    pub fn failing_after(mut self, message: impl Into<String>) -> Self {
        self.fail_after = Some(message.into());
        self
    }

    /// Fail every call before producing any text.
    pub fn unreachable() -> Self {
        Self { fail_immediately: true, ..Self::default() }
    }

    /// The full scripted response.
    pub fn response(&self) -> String {
        self.increments.concat()
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default()
    }

    fn record(&self, prompt: &str) -> Result<()> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if self.fail_immediately {
            return Err(ModelError::Connection("mock generator is unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String> {
        self.record(prompt)?;
        if let Some(message) = &self.fail_after {
            return Err(ModelError::Connection(message.clone()));
        }
        Ok(self.response())
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<TextStream> {
        self.record(prompt)?;
        let mut items: Vec<Result<String>> = self.increments.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.fail_after {
            items.push(Err(ModelError::Connection(message.clone())));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}
