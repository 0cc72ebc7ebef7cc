//! Fan-out/fan-in over several sub-queries of one question.
use futures::future::try_join_all;
use std::collections::HashMap;

use hybridrag_core::error::Result;
use hybridrag_core::types::{SearchHit, SearchParams};

use crate::engine::HybridSearchEngine;

/// Keeps the best-scoring hit per id, best first. Equal scores order by id
/// so the merge does not depend on which branch finished first.
pub fn merge_best(branches: Vec<Vec<SearchHit>>) -> Vec<SearchHit> {
    let mut best: HashMap<String, SearchHit> = HashMap::new();
    for hit in branches.into_iter().flatten() {
        match best.get(&hit.id) {
            Some(old) if old.score >= hit.score => {}
            _ => {
                best.insert(hit.id.clone(), hit);
            }
        }
    }
    let mut merged: Vec<SearchHit> = best.into_values().collect();
    merged.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    merged
}

impl HybridSearchEngine {
    /// Dense search for every query at once.
    ///
    /// All queries are embedded concurrently, then all searches run
    /// concurrently with `limit` hits each; the merged list holds at most
    /// `limit * 2` rows. `limit` defaults to `initial_fetch_limit`.
    pub async fn multi_search(&self, queries: &[String], limit: Option<usize>) -> Result<Vec<SearchHit>> {
        let limit = limit.unwrap_or(self.settings.initial_fetch_limit);
        self.multi_search_with(queries, &SearchParams::top(limit)).await
    }

    /// [`Self::multi_search`] with every branch sharing `params`' filter and
    /// score threshold. `params.top_k` is the per-branch limit.
    #[tracing::instrument(skip_all, fields(queries = queries.len(), limit = params.top_k))]
    pub async fn multi_search_with(&self, queries: &[String], params: &SearchParams) -> Result<Vec<SearchHit>> {
        if queries.is_empty() || params.top_k == 0 {
            return Ok(Vec::new());
        }

        let vectors = try_join_all(queries.iter().map(|q| self.embedder.embed_one(q))).await?;
        let branches = try_join_all(vectors.iter().map(|v| self.dense.search(v, params))).await?;

        let mut merged = merge_best(branches);
        merged.truncate(params.top_k.saturating_mul(2));
        tracing::debug!(merged = merged.len(), "multi-query merge");
        Ok(merged)
    }
}
