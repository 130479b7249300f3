//! Ollama HTTP client.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use ragchat_telemetry::LogContext;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, error, info, warn};

use super::config::OllamaConfig;
use crate::error::{ModelError, Result};
use crate::generation::{GenerationOptions, TextGenerator, TextStream};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Serialize)]
struct SamplingOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

impl From<&GenerationOptions> for SamplingOptions {
    fn from(options: &GenerationOptions) -> Self {
        Self { temperature: options.temperature, top_p: options.top_p, top_k: options.top_k }
    }
}

/// One line of a generate response, streamed or not.
#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// What to do with one NDJSON line of a streamed response.
#[derive(Debug, PartialEq)]
enum LineEvent {
    Text(String),
    Done(Option<String>),
    Skip,
}

fn parse_line(line: &[u8]) -> LineEvent {
    let line = line.trim_ascii();
    if line.is_empty() {
        return LineEvent::Skip;
    }
    match serde_json::from_slice::<GenerateChunk>(line) {
        Ok(chunk) => {
            let text = chunk.response.filter(|text| !text.is_empty());
            match (chunk.done, text) {
                (true, text) => LineEvent::Done(text),
                (false, Some(text)) => LineEvent::Text(text),
                (false, None) => LineEvent::Skip,
            }
        }
        Err(e) => {
            debug!(error = %e, "skipping malformed stream line");
            LineEvent::Skip
        }
    }
}

/// Client for a local or remote Ollama server.
pub struct OllamaClient {
    client: reqwest::Client,
    config: OllamaConfig,
    log: LogContext,
}

impl OllamaClient {
    /// Create a client with the timeouts from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] if the HTTP client cannot be built.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ModelError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config, log: LogContext::disabled() })
    }

    /// Attach the logging context of the owning session.
    pub fn with_log_context(mut self, log: LogContext) -> Self {
        self.log = log;
        self
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Names of the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self.client.get(self.config.endpoint("/api/tags")).send().await?;
        let response = check_status(response).await?;
        let tags: TagsResponse =
            response.json().await.map_err(|e| ModelError::Decode(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Check that the server answers and report whether the configured model
    /// is installed. A missing model is logged, not treated as an error.
    pub async fn check_connection(&self) -> Result<bool> {
        let span = self.log.span().clone();
        async move {
            let models = match self.list_models().await {
                Ok(models) => models,
                Err(e) => {
                    error!(base_url = %self.config.base_url, error = %e, "cannot connect to Ollama server");
                    return Err(e);
                }
            };
            info!(base_url = %self.config.base_url, "connected to Ollama server");

            let available = models.iter().any(|name| name.contains(&self.config.model));
            if !available {
                warn!(model = %self.config.model, available = ?models, "model not found on server");
            }
            Ok(available)
        }
        .instrument(span)
        .await
    }

    async fn send_generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream,
            options: options.into(),
        };
        let response = self
            .client
            .post(self.config.endpoint("/api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(model = %self.config.model, error = %e, "Ollama request failed");
                ModelError::from(e)
            })?;
        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(%status, body = %body, "Ollama API error");
    Err(ModelError::Status { status: status.as_u16(), body })
}

#[async_trait]
impl TextGenerator for OllamaClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let span = self.log.span().clone();
        async move {
            debug!(model = %self.config.model, prompt_len = prompt.len(), "generating response");
            let response = self.send_generate(prompt, options, false).await?;
            let body: GenerateChunk = response.json().await.map_err(ModelError::from)?;
            Ok::<_, ModelError>(body.response.unwrap_or_default().trim().to_string())
        }
        .instrument(span)
        .await
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TextStream> {
        let response =
            self.send_generate(prompt, options, true).instrument(self.log.span().clone()).await?;
        let mut bytes = response.bytes_stream();

        let increments = stream! {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(item) = bytes.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(error = %e, "stream interrupted");
                        yield Err(ModelError::from(e));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    match parse_line(&line) {
                        LineEvent::Text(text) => yield Ok(text),
                        LineEvent::Done(text) => {
                            if let Some(text) = text {
                                yield Ok(text);
                            }
                            return;
                        }
                        LineEvent::Skip => {}
                    }
                }
            }

            // A final line without a trailing newline.
            match parse_line(&buffer) {
                LineEvent::Text(text) | LineEvent::Done(Some(text)) => yield Ok(text),
                LineEvent::Done(None) | LineEvent::Skip => {}
            }
        };

        Ok(Box::pin(increments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_handles_text_done_and_garbage() {
        assert_eq!(parse_line(br#"{"response":"Hel","done":false}"#), LineEvent::Text("Hel".into()));
        assert_eq!(parse_line(br#"{"response":"","done":true}"#), LineEvent::Done(None));
        assert_eq!(parse_line(br#"{"response":"!","done":true}"#), LineEvent::Done(Some("!".into())));
        assert_eq!(parse_line(b"{not json"), LineEvent::Skip);
        assert_eq!(parse_line(b"   \r\n"), LineEvent::Skip);
        assert_eq!(parse_line(br#"{"done":false}"#), LineEvent::Skip);
    }
}
