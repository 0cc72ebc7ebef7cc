//! Running a retrieval function over a gold set.
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;

use hybridrag_core::document::read_json_records;
use hybridrag_core::error::{Error, Result};
use hybridrag_core::types::{EvalRecord, Payload};

use crate::metrics::{aggregate, first_hit_rank, EvalMetrics, QuestionResult};

/// Summary plus per-question detail for one configuration.
///
/// Details are owned by the caller; nothing here caches them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalReport {
    pub metrics: EvalMetrics,
    pub details: Vec<QuestionResult>,
}

/// Loads gold records from a JSON array or JSON lines.
#[tracing::instrument(fields(path = %path.display()))]
pub fn load_gold(path: &Path) -> Result<Vec<EvalRecord>> {
    read_json_records(path)?
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            serde_json::from_value(serde_json::Value::Object(record))
                .map_err(|e| Error::InvalidRecord { line: i + 1, reason: e.to_string() })
        })
        .collect()
}

/// Answer identifier of one retrieved row: the payload's `id_field`, or the
/// row id when the payload lacks it.
pub fn answer_id(row_id: &str, payload: Option<&Payload>, id_field: &str) -> String {
    payload
        .and_then(|p| p.get(id_field))
        .map_or_else(|| row_id.to_string(), |v| v.into_owned())
}

/// Drops repeated identifiers, keeping first occurrences. Several chunks of
/// one document should not push other documents down the ranking.
pub fn dedupe_ranked(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

fn validate_k(k_values: &[usize]) -> Result<Vec<usize>> {
    if k_values.is_empty() {
        return Err(Error::config("evaluation needs at least one k value"));
    }
    if k_values.contains(&0) {
        return Err(Error::config("k values must be at least 1"));
    }
    let mut ks = k_values.to_vec();
    ks.sort_unstable();
    ks.dedup();
    Ok(ks)
}

/// Calls `retrieve` once per gold question, in order, and scores the
/// returned identifiers. `retrieve` owns its question string.
#[tracing::instrument(skip_all, fields(questions = gold.len()))]
pub async fn evaluate<F, Fut>(gold: &[EvalRecord], k_values: &[usize], mut retrieve: F) -> Result<EvalReport>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<String>>>,
{
    let ks = validate_k(k_values)?;
    let mut details = Vec::with_capacity(gold.len());
    for (i, record) in gold.iter().enumerate() {
        let retrieved = retrieve(record.question.clone()).await?;
        let rank = first_hit_rank(&retrieved, &record.expected);
        tracing::debug!(question = %record.id, ?rank, "evaluated question");
        details.push(QuestionResult {
            id: record.id.clone(),
            question: record.question.clone(),
            expected: record.expected.clone(),
            retrieved,
            first_hit_rank: rank,
        });
        if (i + 1) % 50 == 0 {
            tracing::info!(done = i + 1, total = gold.len(), "evaluation progress");
        }
    }
    let metrics = aggregate(&details, &ks);
    tracing::info!(total = metrics.total, mrr = metrics.mrr, "evaluation complete");
    Ok(EvalReport { metrics, details })
}
