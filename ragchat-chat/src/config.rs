//! Top-level configuration for a chat session.

use std::path::{Path, PathBuf};

use ragchat_model::{GenerationOptions, OllamaConfig};
use ragchat_rag::RagConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Prompt rendering limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromptConfig {
    /// Context chunks longer than this many characters are truncated.
    pub max_chunk_chars: usize,
    /// Number of trailing exchanges rendered as raw history.
    pub history_exchanges: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self { max_chunk_chars: 1000, history_exchanges: 3 }
    }
}

/// Everything a session needs, loadable from one JSON file.
///
/// Every section has defaults, so a file only lists what it overrides:
///
/// ```json
/// { "collection_name": "manuals", "rag": { "top_k": 8 }, "ollama": { "model": "mistral" } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub rag: RagConfig,
    pub generation: GenerationOptions,
    pub ollama: OllamaConfig,
    pub prompt: PromptConfig,
    pub collection_name: String,
    /// Maximum number of exchanges kept in memory.
    pub max_history: usize,
    /// Exchanges rendered into the conversation window.
    pub window_size: usize,
    /// Where saved chat histories go.
    pub history_dir: PathBuf,
    /// Chunks embedded per provider call while loading.
    pub embed_batch_size: usize,
    /// File extensions picked up when loading a directory, with leading dot.
    pub supported_extensions: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            rag: RagConfig::default(),
            generation: GenerationOptions::default(),
            ollama: OllamaConfig::default(),
            prompt: PromptConfig::default(),
            collection_name: "rag_documents".to_string(),
            max_history: 10,
            window_size: 3,
            history_dir: PathBuf::from("data/chat_history"),
            embed_batch_size: 32,
            supported_extensions: vec![".txt".to_string(), ".md".to_string()],
        }
    }
}

impl ChatConfig {
    /// Read and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ChatError::Config(format!("invalid config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that values are usable.
    pub fn validate(&self) -> Result<()> {
        self.rag.validate()?;
        if self.collection_name.trim().is_empty() {
            return Err(ChatError::Config("collection_name must not be empty".to_string()));
        }
        if self.max_history == 0 {
            return Err(ChatError::Config("max_history must be greater than zero".to_string()));
        }
        if self.embed_batch_size == 0 {
            return Err(ChatError::Config("embed_batch_size must be greater than zero".to_string()));
        }
        if self.prompt.max_chunk_chars == 0 {
            return Err(ChatError::Config("prompt.max_chunk_chars must be greater than zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ChatConfig::default();
        config.validate().unwrap();
        assert_eq!(config.collection_name, "rag_documents");
        assert_eq!(config.max_history, 10);
        assert_eq!(config.prompt.max_chunk_chars, 1000);
    }

    #[test]
    fn from_file_merges_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragchat.json");
        std::fs::write(
            &path,
            r#"{"collection_name": "manuals", "rag": {"top_k": 8}, "ollama": {"model": "mistral"}}"#,
        )
        .unwrap();

        let config = ChatConfig::from_file(&path).unwrap();
        assert_eq!(config.collection_name, "manuals");
        assert_eq!(config.rag.top_k, 8);
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(config.ollama.model, "mistral");
        assert_eq!(config.window_size, 3);
    }

    #[test]
    fn from_file_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"rag": {"chunk_size": 100, "chunk_overlap": 100}}"#).unwrap();
        assert!(matches!(ChatConfig::from_file(&path), Err(ChatError::Rag(_))));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(ChatConfig::from_file(&path), Err(ChatError::Config(_))));

        assert!(ChatConfig::from_file(dir.path().join("missing.json")).is_err());
    }
}
