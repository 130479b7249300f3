//! Configuration for chunking and retrieval.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for chunking, hybrid retrieval, and reranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Maximum number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of results handed to the prompt.
    pub top_k: usize,
    /// Whether lexical results are fused with semantic ones.
    pub hybrid_enabled: bool,
    /// Weight of the semantic contribution in `[0, 1]`; lexical gets `1 - alpha`.
    pub hybrid_alpha: f32,
    /// Multiplier applied to the lexical contribution.
    pub lexical_weight: f32,
    /// How many stored chunks the lexical scan reads. Chunks past this bound
    /// are invisible to keyword matching, which caps recall on large corpora.
    pub keyword_scan_limit: usize,
    /// Maximum number of keywords taken from a query.
    pub max_keywords: usize,
    /// Retrieval fetches `top_k * rerank_candidate_factor` candidates for the
    /// rerank stage to cut down to `top_k`.
    pub rerank_candidate_factor: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            hybrid_enabled: true,
            hybrid_alpha: 0.7,
            lexical_weight: 0.8,
            keyword_scan_limit: 1000,
            max_keywords: 5,
            rerank_candidate_factor: 2,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `hybrid_alpha` is outside `[0, 1]`
    /// - `lexical_weight` is negative
    /// - `keyword_scan_limit == 0` or `rerank_candidate_factor == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.hybrid_alpha) {
            return Err(RagError::ConfigError(format!(
                "hybrid_alpha ({}) must be within [0, 1]",
                self.hybrid_alpha
            )));
        }
        if self.lexical_weight < 0.0 {
            return Err(RagError::ConfigError("lexical_weight must not be negative".to_string()));
        }
        if self.keyword_scan_limit == 0 {
            return Err(RagError::ConfigError(
                "keyword_scan_limit must be greater than zero".to_string(),
            ));
        }
        if self.rerank_candidate_factor == 0 {
            return Err(RagError::ConfigError(
                "rerank_candidate_factor must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of candidates retrieval should produce before reranking.
    pub fn candidate_count(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.rerank_candidate_factor)
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of results handed to the prompt.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Enable or disable hybrid (semantic + lexical) retrieval.
    pub fn hybrid_enabled(mut self, enabled: bool) -> Self {
        self.config.hybrid_enabled = enabled;
        self
    }

    /// Set the semantic weight used by score fusion.
    pub fn hybrid_alpha(mut self, alpha: f32) -> Self {
        self.config.hybrid_alpha = alpha;
        self
    }

    /// Set the multiplier applied to a lexical match.
    pub fn lexical_weight(mut self, weight: f32) -> Self {
        self.config.lexical_weight = weight;
        self
    }

    /// Set how many stored chunks the lexical scan reads.
    pub fn keyword_scan_limit(mut self, limit: usize) -> Self {
        self.config.keyword_scan_limit = limit;
        self
    }

    /// Set the maximum number of query keywords.
    pub fn max_keywords(mut self, max: usize) -> Self {
        self.config.max_keywords = max;
        self
    }

    /// Set the candidate multiplier for the rerank stage.
    pub fn rerank_candidate_factor(mut self, factor: usize) -> Self {
        self.config.rerank_candidate_factor = factor;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
