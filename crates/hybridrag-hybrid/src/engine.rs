//! Dense + sparse retrieval fused by reciprocal rank.
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use hybridrag_core::config::{Bm25Settings, FuseBy, HybridSettings};
use hybridrag_core::document::payload_text;
use hybridrag_core::error::Result;
use hybridrag_core::traits::{Embedder, SparseScorer, VectorSearch};
use hybridrag_core::types::{Filter, FusedResult, Payload, SearchHit, SearchParams, SourceKind};
use hybridrag_text::build_sparse;

use crate::fusion::{reciprocal_rank_fusion, WeightedList};

/// A built sparse index plus the payloads of the points it covers.
///
/// Snapshots are immutable. A rebuild makes a new one and swaps it in, so a
/// query in flight keeps reading the snapshot it started with.
pub struct SparseSnapshot {
    scorer: Arc<dyn SparseScorer>,
    payloads: HashMap<String, Payload>,
}

impl SparseSnapshot {
    pub fn len(&self) -> usize {
        self.scorer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scorer.is_empty()
    }

    /// Positive-scoring points matching `filter`, best first, at most `limit`.
    fn hits(&self, query: &str, filter: Option<&Filter>, limit: usize) -> Vec<SearchHit> {
        let mut ranked = self.scorer.ranked(query, self.scorer.len());
        if let Some(f) = filter.filter(|f| !f.is_empty()) {
            ranked.retain(|(id, _)| self.payloads.get(id).is_some_and(|p| f.matches(p)));
        }
        ranked.truncate(limit);
        ranked
            .into_iter()
            .map(|(id, score)| SearchHit {
                payload: self.payloads.get(&id).cloned(),
                id,
                score,
                source: SourceKind::Text,
            })
            .collect()
    }
}

/// Per-call knobs for [`HybridSearchEngine::hybrid_search`].
#[derive(Debug, Clone, PartialEq)]
pub struct HybridQuery {
    pub top_k: usize,
    pub semantic_weight: f64,
    pub bm25_weight: f64,
    pub over_fetch_factor: usize,
    pub filter: Option<Filter>,
    /// Applies to the dense leg only; BM25 scores are not comparable.
    pub score_threshold: Option<f32>,
}

impl HybridQuery {
    pub fn from_settings(settings: &HybridSettings) -> Self {
        Self {
            top_k: settings.top_k,
            semantic_weight: settings.semantic_weight,
            bm25_weight: settings.bm25_weight,
            over_fetch_factor: settings.over_fetch_factor,
            filter: None,
            score_threshold: None,
        }
    }

    #[must_use]
    pub fn top(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    fn fetch_limit(&self) -> usize {
        self.top_k.saturating_mul(self.over_fetch_factor.max(1))
    }
}

pub struct HybridSearchEngine {
    pub(crate) embedder: Arc<dyn Embedder>,
    pub(crate) dense: Arc<dyn VectorSearch>,
    sparse: RwLock<Option<Arc<SparseSnapshot>>>,
    pub(crate) settings: HybridSettings,
    bm25: Bm25Settings,
}

impl HybridSearchEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        dense: Arc<dyn VectorSearch>,
        settings: HybridSettings,
        bm25: Bm25Settings,
    ) -> Self {
        Self { embedder, dense, sparse: RwLock::new(None), settings, bm25 }
    }

    pub fn settings(&self) -> &HybridSettings {
        &self.settings
    }

    /// Builds a fresh sparse index over `entries` and swaps it in.
    ///
    /// Entries without usable text are indexed as empty documents and can
    /// never score. Returns the number of indexed entries.
    #[tracing::instrument(skip_all, fields(entries = entries.len()))]
    pub fn rebuild_sparse(&self, entries: Vec<(String, Payload)>) -> Result<usize> {
        let corpus: Vec<(String, String)> = entries
            .iter()
            .map(|(id, p)| (id.clone(), payload_text(p).unwrap_or_default().to_string()))
            .collect();
        let scorer = build_sparse(&self.bm25, corpus)?;
        let snapshot = Arc::new(SparseSnapshot { scorer, payloads: entries.into_iter().collect() });
        let n = snapshot.len();
        *self.sparse.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        tracing::info!(docs = n, backend = ?self.bm25.backend, "sparse index rebuilt");
        Ok(n)
    }

    pub fn clear_sparse(&self) {
        *self.sparse.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn has_sparse(&self) -> bool {
        self.sparse.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn sparse_snapshot(&self) -> Option<Arc<SparseSnapshot>> {
        self.sparse.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Dense-only search.
    pub async fn search(&self, query: &str, params: &SearchParams) -> Result<Vec<SearchHit>> {
        if params.top_k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_one(query).await?;
        self.dense.search(&vector, params).await
    }

    /// BM25-only search. Empty until [`Self::rebuild_sparse`] has run.
    pub fn sparse_search(&self, query: &str, filter: Option<&Filter>, top_k: usize) -> Vec<SearchHit> {
        self.sparse_snapshot().map(|s| s.hits(query, filter, top_k)).unwrap_or_default()
    }

    /// Reciprocal rank fusion of a dense and a BM25 ranking.
    ///
    /// Without a sparse index the dense ranking is returned on its own,
    /// fused with an empty sparse list so scores stay on the same scale.
    #[tracing::instrument(skip(self, opts), fields(top_k = opts.top_k))]
    pub async fn hybrid_search(&self, query: &str, opts: &HybridQuery) -> Result<Vec<FusedResult>> {
        if opts.top_k == 0 {
            return Ok(Vec::new());
        }
        let fetch = opts.fetch_limit();
        let params = SearchParams { top_k: fetch, filter: opts.filter.clone(), score_threshold: opts.score_threshold };
        let dense = self.search(query, &params).await?;

        let sparse = match self.sparse_snapshot() {
            Some(s) => s.hits(query, opts.filter.as_ref(), fetch),
            None => {
                tracing::warn!("sparse index not built, falling back to dense-only ranking");
                Vec::new()
            }
        };
        tracing::debug!(dense = dense.len(), sparse = sparse.len(), "fusing rankings");

        let mut payloads: HashMap<String, Payload> = HashMap::new();
        let dense_keys = self.collect_keys(&dense, &mut payloads);
        let sparse_keys = self.collect_keys(&sparse, &mut payloads);

        let dense_rank = first_ranks(&dense_keys);
        let sparse_rank = first_ranks(&sparse_keys);
        let fused = reciprocal_rank_fusion(
            &[
                WeightedList::new(&dense_keys, opts.semantic_weight),
                WeightedList::new(&sparse_keys, opts.bm25_weight),
            ],
            self.settings.rrf_k,
        );

        Ok(fused
            .into_iter()
            .take(opts.top_k)
            .map(|(key, score)| FusedResult {
                dense_rank: dense_rank.get(&key).copied(),
                sparse_rank: sparse_rank.get(&key).copied(),
                payload: payloads.remove(&key),
                id: key,
                score,
            })
            .collect())
    }

    /// Fusion keys of `hits` in rank order, remembering the first payload
    /// seen for each key.
    fn collect_keys(&self, hits: &[SearchHit], payloads: &mut HashMap<String, Payload>) -> Vec<String> {
        hits.iter()
            .map(|hit| {
                let key = self.fusion_key(&hit.id, hit.payload.as_ref());
                if let Some(p) = &hit.payload {
                    payloads.entry(key.clone()).or_insert_with(|| p.clone());
                }
                key
            })
            .collect()
    }

    fn fusion_key(&self, point_id: &str, payload: Option<&Payload>) -> String {
        let key = match (&self.settings.fuse_by, payload) {
            (FuseBy::PointId, _) | (_, None) => None,
            (FuseBy::DocId, Some(p)) => Some(p.doc_id.clone()),
            (FuseBy::Field(name), Some(p)) => p.get(name).map(|v| v.into_owned()),
        };
        key.unwrap_or_else(|| point_id.to_string())
    }
}

/// 1-indexed rank of each key's first appearance.
fn first_ranks(keys: &[String]) -> HashMap<String, usize> {
    let mut out = HashMap::new();
    for (i, key) in keys.iter().enumerate() {
        out.entry(key.clone()).or_insert(i + 1);
    }
    out
}
