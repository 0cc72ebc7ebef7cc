use async_trait::async_trait;
use std::collections::HashMap;

use crate::chunker::ChunkSpan;
use crate::error::{Error, Result};
use crate::types::{SearchHit, SearchParams};

/// Converts text into dense vectors, one per input and in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name recorded in point payloads.
    fn model(&self) -> &str;
    /// Provider name recorded in point payloads.
    fn provider(&self) -> &str;
    /// Fixed output dimensionality for this provider and model.
    fn dim(&self) -> usize;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::EmbeddingProvider {
                attempts: 1,
                rate_limited: false,
                message: "provider returned no embedding".into(),
            })
    }
}

/// Dense nearest-neighbour search by cosine similarity.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(&self, query: &[f32], params: &SearchParams) -> Result<Vec<SearchHit>>;
}

/// Splits text into ordered, possibly overlapping spans.
pub trait Chunker: Send + Sync {
    fn chunk_spans(&self, text: &str) -> Result<Vec<ChunkSpan>>;
}

/// A read-only keyword index over a fixed corpus.
///
/// `ids()` and `scores()` are parallel arrays in corpus order.
pub trait SparseScorer: Send + Sync {
    fn ids(&self) -> &[String];
    fn scores(&self, query: &str) -> Vec<f32>;

    fn len(&self) -> usize {
        self.ids().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scores keyed by corpus id. Duplicate ids keep their best score.
    fn score(&self, query: &str) -> HashMap<String, f32> {
        let mut out = HashMap::new();
        for (id, s) in self.ids().iter().zip(self.scores(query)) {
            out.entry(id.clone())
                .and_modify(|best: &mut f32| *best = best.max(s))
                .or_insert(s);
        }
        out
    }

    /// Positive-scoring entries by descending score, ties in corpus order.
    fn ranked(&self, query: &str, limit: usize) -> Vec<(String, f32)> {
        let mut hits: Vec<(usize, f32)> = self
            .scores(query)
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s > 0.0)
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.truncate(limit);
        let ids = self.ids();
        hits.into_iter().map(|(pos, s)| (ids[pos].clone(), s)).collect()
    }
}
