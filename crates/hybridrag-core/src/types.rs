//! Domain types shared by the chunker, the indexes and the query engine.

use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

pub type PointId = String;
pub type Fields = BTreeMap<String, String>;

/// An immutable source record. Re-ingestion supersedes a document, it never
/// edits one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
    pub body: String,
}

/// A contiguous span of one document's body.
///
/// - `start`/`end`: character (not byte) offsets into the parent body,
///   `end - start` always equals the character length of `text`
/// - `index`/`total`: ordinal position among the parent's chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: String,
    pub index: usize,
    pub total: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Everything stored next to a vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub text: String,
    pub doc_id: String,
    /// Corpus tag used for provenance and scoped deletion.
    pub data_source: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub chunk_start: usize,
    pub chunk_end: usize,
    #[serde(default)]
    pub fields: Fields,
    #[serde(default)]
    pub embedding_model: String,
    #[serde(default)]
    pub embedding_provider: String,
    #[serde(default)]
    pub indexed_at: Option<String>,
}

impl Payload {
    /// Looks up a payload key. Built-in keys shadow document fields of the
    /// same name.
    pub fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        let value = match key {
            "text" => Cow::Borrowed(self.text.as_str()),
            "doc_id" => Cow::Borrowed(self.doc_id.as_str()),
            "data_source" => Cow::Borrowed(self.data_source.as_str()),
            "chunk_index" => Cow::Owned(self.chunk_index.to_string()),
            "total_chunks" => Cow::Owned(self.total_chunks.to_string()),
            "chunk_start" => Cow::Owned(self.chunk_start.to_string()),
            "chunk_end" => Cow::Owned(self.chunk_end.to_string()),
            "embedding_model" => Cow::Borrowed(self.embedding_model.as_str()),
            "embedding_provider" => Cow::Borrowed(self.embedding_provider.as_str()),
            _ => return self.fields.get(key).map(|v| Cow::Borrowed(v.as_str())),
        };
        Some(value)
    }
}

/// The unit stored in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

/// Exact-match conditions over payload keys, combined with logical AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub must: BTreeMap<String, String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_source(tag: impl Into<String>) -> Self {
        Self::new().eq("data_source", tag)
    }

    #[must_use]
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.must.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    pub fn matches(&self, payload: &Payload) -> bool {
        self.must
            .iter()
            .all(|(k, v)| payload.get(k).is_some_and(|actual| actual == v.as_str()))
    }
}

/// Parameters for a dense search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub top_k: usize,
    pub filter: Option<Filter>,
    /// Hits with a cosine similarity below this are dropped.
    pub score_threshold: Option<f32>,
}

impl SearchParams {
    pub fn top(top_k: usize) -> Self {
        Self { top_k, filter: None, score_threshold: None }
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
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Text,
}

/// A hit from a single index.
///
/// `score` is a cosine similarity in [-1, 1] for `Vector` hits and a
/// non-negative BM25 weight for `Text` hits. The two are never compared
/// directly; fusion only looks at rank positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: PointId,
    pub score: f32,
    pub source: SourceKind,
    pub payload: Option<Payload>,
}

/// One row of a fused ranking. Produced per query and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    /// Fusion key: the point id, or a payload field when fusing by document.
    pub id: String,
    /// Sum of the per-source reciprocal rank contributions.
    pub score: f64,
    pub payload: Option<Payload>,
    /// 1-indexed rank of the key's first appearance in the dense list.
    pub dense_rank: Option<usize>,
    /// 1-indexed rank of the key's first appearance in the sparse list.
    pub sparse_rank: Option<usize>,
}

/// A gold question with the identifiers that count as a correct answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub question: String,
    #[serde(alias = "expected_certs", alias = "expected_answers")]
    pub expected: Vec<String>,
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or number id, got {other}"))),
    }
}
