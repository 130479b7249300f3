//! Second-pass reranking of retrieval candidates.

use std::sync::Arc;

use async_trait::async_trait;
use ragchat_telemetry::LogContext;
use tracing::{Instrument, debug, warn};

use crate::document::RetrievalResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::inmemory::cosine_similarity;

/// Scores how relevant each document is to a query, one score per document.
///
/// Cross-encoder models are the typical implementation. Higher is more
/// relevant; scores are only compared within one call.
#[async_trait]
pub trait PairwiseScorer: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Score `documents` against `query`, returning scores in input order.
    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>>;
}

/// Whether a pairwise scorer could be set up.
#[derive(Clone)]
pub enum RerankStrategy {
    /// Rerank with this scorer.
    Available(Arc<dyn PairwiseScorer>),
    /// Pass candidates through unchanged.
    Unavailable,
}

impl std::fmt::Debug for RerankStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available(scorer) => f.debug_tuple("Available").field(&scorer.name()).finish(),
            Self::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// Reorders retrieval candidates by pairwise relevance.
///
/// Reranking never fails: when no scorer is available, or the scorer errors
/// at call time, the first `top_k` candidates are returned in their original
/// order.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_rag::{EmbeddingSimilarityScorer, RerankStage};
///
/// let stage = RerankStage::available(EmbeddingSimilarityScorer::new(provider));
/// let top = stage.rerank("engine warranty", candidates, 5).await;
/// ```
#[derive(Debug, Clone)]
pub struct RerankStage {
    strategy: RerankStrategy,
    log: LogContext,
}

impl RerankStage {
    /// Create a stage with the given strategy and logging disabled.
    pub fn new(strategy: RerankStrategy) -> Self {
        Self { strategy, log: LogContext::disabled() }
    }

    /// A stage that reorders candidates with `scorer`.
    pub fn available(scorer: impl PairwiseScorer + 'static) -> Self {
        Self::new(RerankStrategy::Available(Arc::new(scorer)))
    }

    /// A stage that keeps retrieval order and only truncates.
    pub fn unavailable() -> Self {
        Self::new(RerankStrategy::Unavailable)
    }

    /// Build from the outcome of loading a scorer. A load failure is logged
    /// and yields the pass-through strategy.
    pub fn from_loaded(loaded: Result<Arc<dyn PairwiseScorer>>) -> Self {
        match loaded {
            Ok(scorer) => Self::new(RerankStrategy::Available(scorer)),
            Err(e) => {
                warn!(error = %e, "reranker failed to load, reranking disabled");
                Self::unavailable()
            }
        }
    }

    /// Attach the logging context of the owning session.
    pub fn with_log_context(mut self, log: LogContext) -> Self {
        self.log = log;
        self
    }

    /// The strategy this stage was built with.
    pub fn strategy(&self) -> &RerankStrategy {
        &self.strategy
    }

    /// Whether a scorer is loaded.
    pub fn is_available(&self) -> bool {
        matches!(self.strategy, RerankStrategy::Available(_))
    }

    /// Return at most `top_k` candidates, best first.
    ///
    /// Reranked results carry the scorer's value in `score`; ties keep the
    /// candidates' original relative order.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalResult>,
        top_k: usize,
    ) -> Vec<RetrievalResult> {
        let span = self.log.span().clone();
        async move {
            let scorer = match &self.strategy {
                RerankStrategy::Available(scorer) if !candidates.is_empty() => scorer,
                _ => return passthrough(candidates, top_k),
            };

            let documents: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();
            let scores = match scorer.score(query, &documents).await {
                Ok(scores) if scores.len() == candidates.len() => scores,
                Ok(scores) => {
                    warn!(
                        reranker = scorer.name(),
                        expected = candidates.len(),
                        received = scores.len(),
                        "reranker returned wrong number of scores, keeping retrieval order"
                    );
                    return passthrough(candidates, top_k);
                }
                Err(e) => {
                    warn!(reranker = scorer.name(), error = %e, "reranking failed, keeping retrieval order");
                    return passthrough(candidates, top_k);
                }
            };

            let mut scored: Vec<RetrievalResult> = candidates
                .into_iter()
                .zip(scores)
                .map(|(mut candidate, score)| {
                    // NaN ranks last.
                    candidate.score = Some(if score.is_nan() { f32::NEG_INFINITY } else { score });
                    candidate
                })
                .collect();
            scored.sort_by(|a, b| b.score.unwrap_or(0.0).total_cmp(&a.score.unwrap_or(0.0)));
            scored.truncate(top_k);
            debug!(reranker = scorer.name(), result_count = scored.len(), "reranked candidates");
            scored
        }
        .instrument(span)
        .await
    }
}

impl Default for RerankStage {
    fn default() -> Self {
        Self::unavailable()
    }
}

fn passthrough(mut candidates: Vec<RetrievalResult>, top_k: usize) -> Vec<RetrievalResult> {
    candidates.truncate(top_k);
    candidates
}

/// Scores documents by cosine similarity between their embeddings and the
/// query embedding.
pub struct EmbeddingSimilarityScorer {
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingSimilarityScorer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl PairwiseScorer for EmbeddingSimilarityScorer {
    fn name(&self) -> &str {
        "embedding-similarity"
    }

    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        let query_embedding = self.provider.embed(query).await?;
        let embeddings = self.provider.embed_batch(documents).await?;
        if embeddings.len() != documents.len() {
            return Err(RagError::RerankerError {
                reranker: self.name().to_string(),
                message: format!(
                    "expected {} embeddings, provider returned {}",
                    documents.len(),
                    embeddings.len()
                ),
            });
        }
        Ok(embeddings.iter().map(|e| cosine_similarity(&query_embedding, e)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkMetadata;
    use crate::hashing::HashingEmbeddingProvider;

    fn candidate(id: usize, content: &str) -> RetrievalResult {
        RetrievalResult {
            content: content.to_string(),
            metadata: ChunkMetadata {
                filename: "doc.pdf".into(),
                global_chunk_id: Some(id),
                ..Default::default()
            },
            distance: None,
            score: Some(0.5),
        }
    }

    struct FixedScorer(Vec<f32>);

    #[async_trait]
    impl PairwiseScorer for FixedScorer {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn score(&self, _query: &str, _documents: &[&str]) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl PairwiseScorer for FailingScorer {
        fn name(&self) -> &str {
            "failing"
        }

        async fn score(&self, _query: &str, _documents: &[&str]) -> Result<Vec<f32>> {
            Err(RagError::RerankerError { reranker: "failing".into(), message: "model offline".into() })
        }
    }

    fn ids(results: &[RetrievalResult]) -> Vec<usize> {
        results.iter().filter_map(|r| r.metadata.global_chunk_id).collect()
    }

    #[tokio::test]
    async fn sorts_by_score_with_stable_ties() {
        let stage = RerankStage::available(FixedScorer(vec![0.1, 0.9, 0.5, 0.9]));
        let candidates = (0..4).map(|i| candidate(i, "text")).collect();
        let reranked = stage.rerank("q", candidates, 3).await;
        assert_eq!(ids(&reranked), vec![1, 3, 2]);
        assert_eq!(reranked[0].score, Some(0.9));
    }

    #[tokio::test]
    async fn nan_scores_rank_last() {
        let stage = RerankStage::available(FixedScorer(vec![f32::NAN, 0.5, 0.9]));
        let candidates = (0..3).map(|i| candidate(i, "text")).collect();
        let reranked = stage.rerank("q", candidates, 3).await;
        assert_eq!(ids(&reranked), vec![2, 1, 0]);
        assert_eq!(reranked[2].score, Some(f32::NEG_INFINITY));
    }

    #[tokio::test]
    async fn unavailable_scorer_passes_through() {
        let stage = RerankStage::unavailable();
        let candidates: Vec<_> = (0..5).map(|i| candidate(i, "text")).collect();
        let reranked = stage.rerank("q", candidates.clone(), 3).await;
        assert_eq!(reranked, candidates[..3].to_vec());
    }

    #[tokio::test]
    async fn scorer_errors_fall_back_to_input_order() {
        let stage = RerankStage::available(FailingScorer);
        let candidates: Vec<_> = (0..4).map(|i| candidate(i, "text")).collect();
        assert_eq!(stage.rerank("q", candidates.clone(), 2).await, candidates[..2].to_vec());

        let short = RerankStage::available(FixedScorer(vec![1.0]));
        assert_eq!(short.rerank("q", candidates.clone(), 2).await, candidates[..2].to_vec());
    }

    #[tokio::test]
    async fn failed_load_yields_unavailable() {
        let stage = RerankStage::from_loaded(Err(RagError::ConfigError("no model".into())));
        assert!(!stage.is_available());
    }

    #[tokio::test]
    async fn embedding_similarity_prefers_matching_text() {
        let provider = Arc::new(HashingEmbeddingProvider::new(256).unwrap());
        let stage = RerankStage::available(EmbeddingSimilarityScorer::new(provider));
        let candidates = vec![
            candidate(0, "bread baking temperature and flour"),
            candidate(1, "engine oil change interval"),
        ];
        let reranked = stage.rerank("engine oil interval", candidates, 2).await;
        assert_eq!(ids(&reranked), vec![1, 0]);
    }
}
