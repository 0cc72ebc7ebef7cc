//! In-memory Okapi BM25 over an inverted index.
//!
//! IDF follows the usual Okapi form `ln((N - n + 0.5) / (n + 0.5))`. Terms
//! occurring in more than half of the corpus would get a negative IDF; those
//! are floored to `epsilon * mean_idf` instead.

use std::collections::HashMap;

use hybridrag_core::config::Bm25Settings;
use hybridrag_core::traits::SparseScorer;

use crate::tokenize::tokenize;

/// Ranking parameters. Defaults: `k1 = 1.5`, `b = 0.75`, `epsilon = 0.25`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
    pub epsilon: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75, epsilon: 0.25 }
    }
}

impl From<&Bm25Settings> for Bm25Params {
    fn from(s: &Bm25Settings) -> Self {
        Self { k1: s.k1, b: s.b, epsilon: s.epsilon }
    }
}

#[derive(Debug, Clone, Copy)]
struct Posting {
    doc: u32,
    tf: u32,
}

/// Immutable after [`Bm25Index::build`]; rebuild to change the corpus.
#[derive(Debug, Clone)]
pub struct Bm25Index {
    params: Bm25Params,
    ids: Vec<String>,
    doc_len: Vec<u32>,
    avgdl: f32,
    idf: HashMap<String, f32>,
    postings: HashMap<String, Vec<Posting>>,
}

impl Bm25Index {
    /// Tokenizes and indexes `corpus` as `(id, text)` pairs.
    pub fn build<I, S, T>(corpus: I, params: Bm25Params) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: AsRef<str>,
    {
        let mut ids = Vec::new();
        let mut doc_len = Vec::new();
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();

        for (pos, (id, text)) in corpus.into_iter().enumerate() {
            let tokens = tokenize(text.as_ref());
            ids.push(id.into());
            doc_len.push(u32::try_from(tokens.len()).unwrap_or(u32::MAX));

            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_default() += 1;
            }
            let doc = u32::try_from(pos).unwrap_or(u32::MAX);
            for (term, tf) in tf {
                postings.entry(term).or_default().push(Posting { doc, tf });
            }
        }

        let n = ids.len() as f32;
        let total: f64 = doc_len.iter().map(|&l| f64::from(l)).sum();
        let avgdl = if ids.is_empty() { 0.0 } else { (total / ids.len() as f64) as f32 };

        let mut idf = HashMap::with_capacity(postings.len());
        let mut idf_sum = 0.0f32;
        let mut negative = Vec::new();
        for (term, list) in &postings {
            let df = list.len() as f32;
            let value = (n - df + 0.5).ln() - (df + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term.clone(), value);
        }
        if !idf.is_empty() {
            let floor = params.epsilon * idf_sum / idf.len() as f32;
            for term in negative {
                idf.insert(term, floor);
            }
        }

        tracing::debug!(docs = ids.len(), terms = postings.len(), avgdl, "built bm25 index");
        Self { params, ids, doc_len, avgdl, idf, postings }
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn idf(&self, term: &str) -> Option<f32> {
        self.idf.get(term).copied()
    }

    /// Scores already-tokenized query terms. Repeated terms count repeatedly.
    pub fn scores_for_tokens(&self, query: &[String]) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.ids.len()];
        if self.ids.is_empty() {
            return scores;
        }
        let Bm25Params { k1, b, .. } = self.params;
        let avgdl = self.avgdl.max(f32::EPSILON);
        for term in query {
            let (Some(&idf), Some(list)) = (self.idf.get(term), self.postings.get(term)) else {
                continue;
            };
            for p in list {
                let tf = p.tf as f32;
                let len = self.doc_len[p.doc as usize] as f32;
                let norm = tf + k1 * (1.0 - b + b * len / avgdl);
                scores[p.doc as usize] += idf * (tf * (k1 + 1.0)) / norm;
            }
        }
        scores
    }
}

impl SparseScorer for Bm25Index {
    fn ids(&self) -> &[String] {
        &self.ids
    }

    fn scores(&self, query: &str) -> Vec<f32> {
        self.scores_for_tokens(&tokenize(query))
    }
}
