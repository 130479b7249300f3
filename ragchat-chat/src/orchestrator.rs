//! The chat session: loading documents and answering questions about them.
//!
//! An [`Orchestrator`] moves through three states:
//!
//! ```text
//! Uninitialized --load--> Loading --ok--> Ready
//!       ^                    |              |
//!       +------failed--------+   <--load----+
//!       +---------------------clear---------+
//! ```
//!
//! A failed load restores whichever state the session was in before. Loads
//! are additive; [`Orchestrator::clear`] empties the collection.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchat_chat::{ChatConfig, Orchestrator};
//!
//! let mut chat = Orchestrator::builder()
//!     .config(ChatConfig::from_file("ragchat.json")?)
//!     .embedding_provider(provider)
//!     .build()?;
//!
//! chat.load(Path::new("docs/")).await?;
//! let mut answer = chat.stream_query("What does the warranty cover?", 5).await;
//! while let Some(text) = answer.next().await {
//!     print!("{text}");
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use ragchat_model::{ModelError, OllamaClient, TextGenerator, TextStream};
use ragchat_rag::{
    ChunkMetadata, EmbeddingProvider, InMemoryVectorStore, IndexReport, RagError, RagPipeline,
    RerankStage, RetrievalResult, VectorStore,
};
use ragchat_telemetry::LogContext;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, error, info, warn};

use crate::config::ChatConfig;
use crate::conversation::{ConversationManager, Exchange};
use crate::error::{ChatError, NOT_INITIALIZED_MESSAGE, QUERY_FAILED_MESSAGE, Result};
use crate::ingest::{DocumentLoader, PlainTextLoader};
use crate::prompt::PromptAssembler;

/// Lifecycle of a session's document collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Uninitialized,
    Loading,
    Ready,
}

/// Read-only summary of a session, recomputed on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    /// Chunks currently stored in the collection.
    pub document_count: usize,
    pub is_initialized: bool,
    pub chat_history_length: usize,
}

/// Sequences ingestion, indexing, retrieval, prompting, and generation for
/// one chat session.
///
/// The session owns its chat history exclusively; share an orchestrator
/// between tasks only behind a lock.
pub struct Orchestrator {
    config: ChatConfig,
    pipeline: RagPipeline,
    generator: Arc<dyn TextGenerator>,
    loader: Arc<dyn DocumentLoader>,
    prompts: PromptAssembler,
    conversation: ConversationManager,
    state: OrchestratorState,
    log: LogContext,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == OrchestratorState::Ready
    }

    pub fn history(&self) -> &[Exchange] {
        self.conversation.history()
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.pipeline
    }

    /// Ingest, chunk, embed, and index everything at `path`.
    ///
    /// Documents that fail to ingest are skipped. Global chunk ids are
    /// assigned in loader order, which is sorted path order for directories.
    ///
    /// # Errors
    ///
    /// [`ChatError::EmptyInput`] when nothing usable was found or no chunk
    /// was produced, [`ChatError::ExternalService`] when embedding or
    /// indexing fails. The session state is unchanged on error.
    pub async fn load(&mut self, path: &Path) -> Result<IndexReport> {
        let previous = self.state;
        self.state = OrchestratorState::Loading;

        let span = self.log.span().clone();
        let outcome = self.load_documents(path).instrument(span).await;
        match &outcome {
            Ok(report) => {
                self.state = OrchestratorState::Ready;
                let _span = self.log.enter();
                info!(
                    path = %path.display(),
                    document_count = report.document_count,
                    chunk_count = report.chunk_count,
                    "documents loaded"
                );
            }
            Err(e) => {
                self.state = previous;
                let _span = self.log.enter();
                error!(path = %path.display(), error = %e, "failed to load documents");
            }
        }
        outcome
    }

    async fn load_documents(&self, path: &Path) -> Result<IndexReport> {
        let documents = self.loader.load_path(path).await?;
        if documents.is_empty() {
            return Err(ChatError::EmptyInput(format!(
                "no supported documents found at {}",
                path.display()
            )));
        }

        self.pipeline.ensure_collection().await.map_err(external)?;
        self.pipeline.index(&documents).await.map_err(|e| match e {
            RagError::ChunkingError(message) => ChatError::EmptyInput(message),
            other => external(other),
        })
    }

    /// Answer `message` from the loaded documents and record the exchange.
    ///
    /// Always returns text for the user. Before a successful load this is a
    /// fixed prompt to load documents first and nothing is recorded. A
    /// generation failure is answered, and recorded, with a short error
    /// sentence.
    pub async fn query(&mut self, message: &str, top_k: usize) -> String {
        if !self.is_ready() {
            let _span = self.log.enter();
            warn!(state = ?self.state, "query before documents were loaded");
            return NOT_INITIALIZED_MESSAGE.to_string();
        }

        let span = self.log.span().clone();
        let turn = async {
            let (sources, prompt) = self.prepare(message, top_k).await?;
            let answer = match self.generator.generate(&prompt, &self.config.generation).await {
                Ok(answer) => answer,
                Err(e) => {
                    error!(generator = self.generator.name(), error = %e, "generation failed");
                    e.user_message().to_string()
                }
            };
            Ok::<_, ChatError>((answer, sources))
        }
        .instrument(span)
        .await;

        match turn {
            Ok((answer, sources)) => {
                self.conversation.append(message, answer.clone(), metadata_of(&sources));
                answer
            }
            Err(e) => {
                let _span = self.log.enter();
                error!(error = %e, "query failed");
                QUERY_FAILED_MESSAGE.to_string()
            }
        }
    }

    /// Like [`query`](Self::query), but the answer arrives as increments.
    ///
    /// The exchange is recorded when the returned stream ends, fails, or is
    /// dropped, holding exactly the text yielded up to that point. Failures
    /// before generation starts yield a single `Error: ...` line and record
    /// nothing.
    pub async fn stream_query(&mut self, message: &str, top_k: usize) -> QueryStream<'_> {
        if !self.is_ready() {
            let _span = self.log.enter();
            warn!(state = ?self.state, "query before documents were loaded");
            return QueryStream::message(NOT_INITIALIZED_MESSAGE.to_string());
        }

        let span = self.log.span().clone();
        let started = async {
            let (sources, prompt) = self.prepare(message, top_k).await?;
            let increments =
                self.generator.stream_generate(&prompt, &self.config.generation).await?;
            Ok::<_, ChatError>((sources, increments))
        }
        .instrument(span)
        .await;

        match started {
            Ok((sources, increments)) => QueryStream {
                pending: None,
                increments: Some(increments),
                recorder: Some(Recorder {
                    conversation: &mut self.conversation,
                    human: message.to_string(),
                    sources: metadata_of(&sources),
                    collected: String::new(),
                }),
            },
            Err(e) => {
                let _span = self.log.enter();
                error!(error = %e, "streaming query failed to start");
                QueryStream::message(format!("Error: {}", e.user_message()))
            }
        }
    }

    /// Retrieve context and render the prompt for one turn.
    async fn prepare(&self, message: &str, top_k: usize) -> Result<(Vec<RetrievalResult>, String)> {
        let window = (!self.conversation.is_empty())
            .then(|| self.conversation.window(message, self.config.window_size));
        let sources = self.pipeline.retrieve(message, window.as_deref(), top_k).await?;
        let prompt =
            self.prompts.build(message, &sources, self.conversation.history(), window.as_deref());
        Ok((sources, prompt))
    }

    /// Retrieval only, without generation. Empty before a successful load
    /// or when retrieval fails.
    pub async fn relevant_sources(&self, message: &str, top_k: usize) -> Vec<RetrievalResult> {
        if !self.is_ready() {
            return Vec::new();
        }
        match self.pipeline.retrieve(message, None, top_k).await {
            Ok(sources) => sources,
            Err(e) => {
                let _span = self.log.enter();
                error!(error = %e, "source lookup failed");
                Vec::new()
            }
        }
    }

    pub async fn database_info(&self) -> Result<CollectionInfo> {
        let document_count = self.pipeline.count().await.map_err(external)?;
        Ok(CollectionInfo {
            name: self.pipeline.collection().to_string(),
            document_count,
            is_initialized: self.is_ready(),
            chat_history_length: self.conversation.len(),
        })
    }

    /// Delete all indexed content and return to `Uninitialized`.
    ///
    /// Chat history is kept; see [`clear_history`](Self::clear_history).
    pub async fn clear(&mut self) -> Result<usize> {
        let deleted = self.pipeline.clear().await.map_err(external)?;
        self.state = OrchestratorState::Uninitialized;
        let _span = self.log.enter();
        info!(deleted, "collection cleared");
        Ok(deleted)
    }

    pub fn clear_history(&mut self) {
        self.conversation.clear();
    }

    /// Save the chat history under the configured history directory.
    pub fn save_history(&self, file_name: Option<&str>) -> Result<PathBuf> {
        self.conversation.save(&self.config.history_dir, file_name)
    }

    /// Replace the chat history with a saved one. On failure the current
    /// history is kept.
    pub fn load_history(&mut self, path: &Path) -> Result<usize> {
        self.conversation.load(path)
    }
}

fn external(e: RagError) -> ChatError {
    ChatError::ExternalService(e.to_string())
}

fn metadata_of(sources: &[RetrievalResult]) -> Vec<ChunkMetadata> {
    sources.iter().map(|s| s.metadata.clone()).collect()
}

/// Records the exchange of a streamed answer once it is over.
struct Recorder<'a> {
    conversation: &'a mut ConversationManager,
    human: String,
    sources: Vec<ChunkMetadata>,
    collected: String,
}

impl Recorder<'_> {
    fn finish(self) {
        self.conversation.append(self.human, self.collected, self.sources);
    }
}

/// The streamed answer to one question.
///
/// Call [`next`](QueryStream::next) until it returns `None`. Stopping early
/// is a cancellation: dropping the stream closes the generation request and
/// records the text received so far.
pub struct QueryStream<'a> {
    pending: Option<String>,
    increments: Option<TextStream>,
    recorder: Option<Recorder<'a>>,
}

impl QueryStream<'_> {
    fn message(text: String) -> Self {
        Self { pending: Some(text), increments: None, recorder: None }
    }

    /// The next text increment, or `None` once the answer is complete.
    ///
    /// A generation failure mid-answer yields one final `Error: ...` item;
    /// the recorded exchange holds only the text before it.
    pub async fn next(&mut self) -> Option<String> {
        if let Some(text) = self.pending.take() {
            return Some(text);
        }

        let item = self.increments.as_mut()?.next().await;
        match item {
            Some(Ok(text)) => {
                if let Some(recorder) = self.recorder.as_mut() {
                    recorder.collected.push_str(&text);
                }
                Some(text)
            }
            Some(Err(e)) => {
                warn!(error = %e, "generation stream failed");
                self.close();
                Some(stream_error(&e))
            }
            None => {
                self.close();
                None
            }
        }
    }

    /// Drain the remaining increments into one string.
    pub async fn collect_text(mut self) -> String {
        let mut text = String::new();
        while let Some(increment) = self.next().await {
            text.push_str(&increment);
        }
        text
    }

    fn close(&mut self) {
        self.increments = None;
        if let Some(recorder) = self.recorder.take() {
            recorder.finish();
        }
    }
}

impl Drop for QueryStream<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

fn stream_error(e: &ModelError) -> String {
    format!("Error: {}", e.user_message())
}

/// Builder for an [`Orchestrator`].
///
/// Only the embedding provider is required. The vector store defaults to an
/// [`InMemoryVectorStore`], the generator to an [`OllamaClient`] built from
/// the config, the loader to a [`PlainTextLoader`] for the configured
/// extensions, and reranking to pass-through.
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Option<ChatConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    generator: Option<Arc<dyn TextGenerator>>,
    loader: Option<Arc<dyn DocumentLoader>>,
    reranker: Option<RerankStage>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: ChatConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn reranker(mut self, reranker: RerankStage) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Validate the configuration and assemble the session.
    ///
    /// # Errors
    ///
    /// [`ChatError::Config`] when the embedding provider is missing or the
    /// configuration is invalid, [`ChatError::Model`] when the default
    /// generator cannot be created.
    pub fn build(self) -> Result<Orchestrator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| ChatError::Config("embedding_provider is required".to_string()))?;

        let log = LogContext::new(&config.collection_name);
        let vector_store: Arc<dyn VectorStore> =
            self.vector_store.unwrap_or_else(|| Arc::new(InMemoryVectorStore::new()));
        let generator: Arc<dyn TextGenerator> = match self.generator {
            Some(generator) => generator,
            None => Arc::new(
                OllamaClient::new(config.ollama.clone())?.with_log_context(log.component("generator")),
            ),
        };
        let loader: Arc<dyn DocumentLoader> = self
            .loader
            .unwrap_or_else(|| Arc::new(PlainTextLoader::new(config.supported_extensions.clone())));

        let pipeline = RagPipeline::builder()
            .config(config.rag.clone())
            .collection(config.collection_name.clone())
            .embedding_provider(embedding_provider)
            .vector_store(vector_store)
            .reranker(self.reranker.unwrap_or_default())
            .embed_batch_size(config.embed_batch_size)
            .log_context(log.component("pipeline"))
            .build()?;
        let conversation =
            ConversationManager::new(config.max_history).with_log_context(log.component("conversation"));

        Ok(Orchestrator {
            prompts: PromptAssembler::new(config.prompt.clone()),
            config,
            pipeline,
            generator,
            loader,
            conversation,
            state: OrchestratorState::Uninitialized,
            log,
        })
    }
}
