//! Recall@K and reciprocal rank over ranked answer identifiers.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 1-indexed rank of the first retrieved id that is an acceptable answer.
pub fn first_hit_rank(retrieved: &[String], expected: &[String]) -> Option<usize> {
    retrieved.iter().position(|id| expected.contains(id)).map(|i| i + 1)
}

/// Whether an acceptable answer appears within the first `k` results.
pub fn hit_at_k(retrieved: &[String], expected: &[String], k: usize) -> bool {
    first_hit_rank(retrieved, expected).is_some_and(|rank| rank <= k)
}

/// `1 / rank` of the first acceptable answer, or 0 when none is retrieved.
pub fn reciprocal_rank(retrieved: &[String], expected: &[String]) -> f64 {
    first_hit_rank(retrieved, expected).map_or(0.0, |rank| 1.0 / rank as f64)
}

/// Averages over one gold set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub total: usize,
    pub recall_at_k: BTreeMap<usize, f64>,
    pub hits_at_k: BTreeMap<usize, usize>,
    pub mrr: f64,
}

impl EvalMetrics {
    pub fn recall(&self, k: usize) -> Option<f64> {
        self.recall_at_k.get(&k).copied()
    }

    /// Recall used to rank configurations: recall@3, else the largest
    /// measured k below 3, else the smallest measured k.
    pub fn selection_recall(&self) -> f64 {
        let k = self
            .recall_at_k
            .range(..=3)
            .next_back()
            .or_else(|| self.recall_at_k.iter().next())
            .map(|(k, _)| *k);
        k.and_then(|k| self.recall(k)).unwrap_or_default()
    }
}

/// Outcome for one gold question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub id: String,
    pub question: String,
    pub expected: Vec<String>,
    pub retrieved: Vec<String>,
    pub first_hit_rank: Option<usize>,
}

/// Folds per-question outcomes into averages. An empty input yields zeros.
pub fn aggregate(details: &[QuestionResult], k_values: &[usize]) -> EvalMetrics {
    let total = details.len();
    let mut hits_at_k = BTreeMap::new();
    let mut recall_at_k = BTreeMap::new();
    for &k in k_values {
        let hits = details.iter().filter(|d| d.first_hit_rank.is_some_and(|r| r <= k)).count();
        hits_at_k.insert(k, hits);
        recall_at_k.insert(k, if total == 0 { 0.0 } else { hits as f64 / total as f64 });
    }
    let rr_sum: f64 = details.iter().filter_map(|d| d.first_hit_rank).map(|r| 1.0 / r as f64).sum();
    let mrr = if total == 0 { 0.0 } else { rr_sum / total as f64 };
    EvalMetrics { total, recall_at_k, hits_at_k, mrr }
}
