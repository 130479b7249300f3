//! Semantic, lexical, and hybrid retrieval over a vector store collection.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use ragchat_telemetry::LogContext;
use tracing::{Instrument, debug, warn};

use crate::config::RagConfig;
use crate::document::{ChunkMetadata, RetrievalResult};
use crate::keyword::{extract_keywords, lexical_scan};
use crate::vectorstore::VectorStore;

/// Each hybrid path fetches this many times `top_k` candidates before fusion.
const HYBRID_CANDIDATE_FACTOR: usize = 2;

/// Weights used when fusing semantic and lexical candidate lists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    /// Weight of the semantic contribution; the lexical side gets `1 - alpha`.
    pub alpha: f32,
    /// Multiplier applied to every lexical match.
    pub lexical_weight: f32,
}

impl FusionWeights {
    /// Take `hybrid_alpha` and `lexical_weight` from `config`.
    pub fn from_config(config: &RagConfig) -> Self {
        Self { alpha: config.hybrid_alpha, lexical_weight: config.lexical_weight }
    }

    /// Contribution of a semantic candidate at `distance`, given the divisor
    /// used to bring distances into `[0, 1]`.
    fn semantic(&self, distance: f32, divisor: f32) -> f32 {
        self.alpha * (1.0 - distance / divisor)
    }

    fn lexical(&self) -> f32 {
        (1.0 - self.alpha) * self.lexical_weight
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

/// Merge a semantic list (ascending distance) and a lexical list into one
/// ranking of at most `top_k` results, highest fused score first.
///
/// Distances are divided by `max(largest distance, 1)` so that cosine
/// distances above one still map into `[0, 1]`, while ordinary distances are
/// used unchanged. A candidate present in both lists appears once with the
/// sum of both contributions. Equal scores keep first-seen order, semantic
/// candidates before lexical ones.
pub fn fuse(
    semantic: Vec<RetrievalResult>,
    lexical: Vec<RetrievalResult>,
    weights: FusionWeights,
    top_k: usize,
) -> Vec<RetrievalResult> {
    let divisor = semantic.iter().filter_map(|r| r.distance).fold(1.0_f32, f32::max);

    let mut fused: IndexMap<String, RetrievalResult> = IndexMap::new();
    for mut result in semantic {
        let key = result.metadata.identity_key();
        if fused.contains_key(&key) {
            continue;
        }
        result.score = Some(weights.semantic(result.distance.unwrap_or(0.0), divisor));
        fused.insert(key, result);
    }

    let mut seen_lexical = HashSet::new();
    for mut result in lexical {
        let key = result.metadata.identity_key();
        if !seen_lexical.insert(key.clone()) {
            continue;
        }
        match fused.get_mut(&key) {
            Some(existing) => {
                existing.score = Some(existing.score.unwrap_or(0.0) + weights.lexical());
            }
            None => {
                result.score = Some(weights.lexical());
                fused.insert(key, result);
            }
        }
    }

    let mut ranked: Vec<RetrievalResult> = fused.into_values().collect();
    ranked.sort_by(|a, b| b.score.unwrap_or(0.0).total_cmp(&a.score.unwrap_or(0.0)));
    ranked.truncate(top_k);
    ranked
}

/// Runs semantic and lexical searches against one collection and fuses them.
///
/// Failures on either path are logged and treated as an empty list for that
/// path, so a search never fails as a whole.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_rag::{RagConfig, RetrievalCoordinator};
///
/// let coordinator = RetrievalCoordinator::new(store, "rag_documents", &RagConfig::default());
/// let results = coordinator.search(&query_vector, Some("engine warranty"), 5, true).await;
/// ```
pub struct RetrievalCoordinator {
    store: Arc<dyn VectorStore>,
    collection: String,
    weights: FusionWeights,
    keyword_scan_limit: usize,
    max_keywords: usize,
    log: LogContext,
}

impl RetrievalCoordinator {
    /// Create a coordinator searching `collection` in `store`, with fusion
    /// weights and keyword limits taken from `config`.
    pub fn new(store: Arc<dyn VectorStore>, collection: impl Into<String>, config: &RagConfig) -> Self {
        Self {
            store,
            collection: collection.into(),
            weights: FusionWeights::from_config(config),
            keyword_scan_limit: config.keyword_scan_limit,
            max_keywords: config.max_keywords,
            log: LogContext::disabled(),
        }
    }

    /// Attach the logging context of the owning session.
    pub fn with_log_context(mut self, log: LogContext) -> Self {
        self.log = log;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Retrieve at most `top_k` results for a query.
    ///
    /// Without hybrid mode or query text, this is a plain nearest-neighbor
    /// query in index order. Otherwise both paths fetch `2 * top_k`
    /// candidates and the lists are combined with [`fuse`].
    pub async fn search(
        &self,
        query_vector: &[f32],
        query_text: Option<&str>,
        top_k: usize,
        use_hybrid: bool,
    ) -> Vec<RetrievalResult> {
        let span = self.log.span().clone();
        async move {
            if top_k == 0 {
                return Vec::new();
            }

            let query_text = match query_text {
                Some(text) if use_hybrid => text,
                _ => {
                    let results = self.semantic(query_vector, top_k).await;
                    debug!(result_count = results.len(), "semantic search complete");
                    return results;
                }
            };

            let candidates = top_k.saturating_mul(HYBRID_CANDIDATE_FACTOR);
            let semantic = self.semantic(query_vector, candidates).await;
            let lexical = self.lexical(query_text, candidates).await;
            let semantic_count = semantic.len();
            let lexical_count = lexical.len();

            let results = fuse(semantic, lexical, self.weights, top_k);
            debug!(
                semantic_count,
                lexical_count,
                result_count = results.len(),
                "hybrid search complete"
            );
            results
        }
        .instrument(span)
        .await
    }

    async fn semantic(&self, query_vector: &[f32], k: usize) -> Vec<RetrievalResult> {
        match self.store.query(&self.collection, query_vector, k).await {
            Ok(hits) => hits.into_iter().map(|hit| hit.into_result()).collect(),
            Err(e) => {
                warn!(collection = %self.collection, error = %e, "semantic search failed");
                Vec::new()
            }
        }
    }

    async fn lexical(&self, query_text: &str, k: usize) -> Vec<RetrievalResult> {
        let keywords = extract_keywords(query_text, self.max_keywords);
        if keywords.is_empty() {
            return Vec::new();
        }

        let snapshot = match self.store.get_all(&self.collection, Some(self.keyword_scan_limit)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(collection = %self.collection, error = %e, "keyword search failed");
                return Vec::new();
            }
        };
        if snapshot.len() >= self.keyword_scan_limit {
            debug!(
                scan_limit = self.keyword_scan_limit,
                "keyword scan reached its limit, later chunks are not searched"
            );
        }

        lexical_scan(&snapshot, &keywords, k)
            .into_iter()
            .filter_map(|found| {
                let content = snapshot.documents.get(found.index)?.clone();
                let metadata = snapshot.metadatas.get(found.index)?;
                Some(RetrievalResult {
                    content,
                    metadata: ChunkMetadata::from_index_metadata(metadata),
                    distance: None,
                    score: None,
                })
            })
            .collect()
    }
}
