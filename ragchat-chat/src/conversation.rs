//! Bounded chat history and the conversation window derived from it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ragchat_rag::ChunkMetadata;
use ragchat_telemetry::LogContext;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{ChatError, Result};

/// One completed question/answer turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exchange {
    pub timestamp: DateTime<Utc>,
    pub human: String,
    pub assistant: String,
    /// Metadata of the chunks the answer was grounded on.
    #[serde(default)]
    pub sources: Vec<ChunkMetadata>,
}

/// Ordered chat history holding at most `max_history` exchanges.
///
/// Appending past the bound evicts the oldest exchanges first.
#[derive(Debug, Clone)]
pub struct ConversationManager {
    history: Vec<Exchange>,
    max_history: usize,
    log: LogContext,
}

impl ConversationManager {
    pub fn new(max_history: usize) -> Self {
        Self { history: Vec::new(), max_history: max_history.max(1), log: LogContext::disabled() }
    }

    /// Attach the logging context of the owning session.
    pub fn with_log_context(mut self, log: LogContext) -> Self {
        self.log = log;
        self
    }

    pub fn history(&self) -> &[Exchange] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Record a finished turn, stamped with the current time.
    pub fn append(
        &mut self,
        human: impl Into<String>,
        assistant: impl Into<String>,
        sources: Vec<ChunkMetadata>,
    ) {
        self.push(Exchange {
            timestamp: Utc::now(),
            human: human.into(),
            assistant: assistant.into(),
            sources,
        });
    }

    fn push(&mut self, exchange: Exchange) {
        self.history.push(exchange);
        self.enforce_bound();
    }

    fn enforce_bound(&mut self) {
        if self.history.len() > self.max_history {
            let excess = self.history.len() - self.max_history;
            self.history.drain(..excess);
        }
    }

    /// Render the last `window_size` exchanges followed by the current
    /// question, for disambiguating follow-up questions.
    ///
    /// With no history this is `current_query` unchanged.
    pub fn window(&self, current_query: &str, window_size: usize) -> String {
        if self.history.is_empty() {
            return current_query.to_string();
        }

        let start = self.history.len().saturating_sub(window_size);
        let mut lines: Vec<String> = Vec::with_capacity((self.history.len() - start) * 2 + 1);
        for exchange in &self.history[start..] {
            lines.push(format!("User: {}", exchange.human));
            lines.push(format!("Assistant: {}", exchange.assistant));
        }
        lines.push(format!("Current Question: {current_query}"));
        lines.join("\n")
    }

    pub fn clear(&mut self) {
        self.history.clear();
        let _span = self.log.enter();
        info!("chat history cleared");
    }

    /// Write the history as pretty-printed JSON to `dir`.
    ///
    /// Without a `file_name`, the file is named after the current local time
    /// (`chat_history_YYYYmmdd_HHMMSS.json`). The directory is created if
    /// missing. Returns the written path.
    pub fn save(&self, dir: &Path, file_name: Option<&str>) -> Result<PathBuf> {
        let _span = self.log.enter();
        let file_name = match file_name {
            Some(name) => name.to_string(),
            None => format!("chat_history_{}.json", chrono::Local::now().format("%Y%m%d_%H%M%S")),
        };
        let path = dir.join(file_name);

        let write = || -> std::result::Result<(), String> {
            std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
            let json = serde_json::to_string_pretty(&self.history).map_err(|e| e.to_string())?;
            std::fs::write(&path, json).map_err(|e| e.to_string())
        };
        write().map_err(|message| {
            error!(path = %path.display(), error = %message, "failed to save chat history");
            ChatError::Persistence(format!("cannot write {}: {message}", path.display()))
        })?;

        info!(path = %path.display(), exchange_count = self.history.len(), "chat history saved");
        Ok(path)
    }

    /// Replace the history with the contents of a saved file, keeping only
    /// the most recent `max_history` exchanges.
    ///
    /// On failure the in-memory history is left as it was.
    pub fn load(&mut self, path: &Path) -> Result<usize> {
        let log = self.log.clone();
        let _span = log.enter();
        let read = || -> std::result::Result<Vec<Exchange>, String> {
            let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
            serde_json::from_str(&raw).map_err(|e| e.to_string())
        };
        let loaded = read().map_err(|message| {
            error!(path = %path.display(), error = %message, "failed to load chat history");
            ChatError::Persistence(format!("cannot read {}: {message}", path.display()))
        })?;

        self.history = loaded;
        self.enforce_bound();
        info!(path = %path.display(), exchange_count = self.history.len(), "chat history loaded");
        Ok(self.history.len())
    }
}
