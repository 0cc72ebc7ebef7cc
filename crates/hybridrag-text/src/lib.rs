//! hybridrag-text
//!
//! Keyword (sparse) retrieval: the shared tokenizer, an Okapi BM25 index and
//! a tantivy-backed alternative. Both implement
//! [`hybridrag_core::traits::SparseScorer`].
pub mod bm25;
pub mod tantivy_index;
pub mod tokenize;

use std::sync::Arc;

use hybridrag_core::config::{Bm25Settings, SparseBackend};
use hybridrag_core::error::Result;
use hybridrag_core::traits::SparseScorer;

pub use bm25::{Bm25Index, Bm25Params};
pub use tantivy_index::TantivyBm25;
pub use tokenize::tokenize;

/// Builds the configured backend over `(id, text)` pairs.
pub fn build_sparse<S, T>(settings: &Bm25Settings, corpus: Vec<(S, T)>) -> Result<Arc<dyn SparseScorer>>
where
    S: Into<String>,
    T: AsRef<str>,
{
    Ok(match settings.backend {
        SparseBackend::Okapi => Arc::new(Bm25Index::build(corpus, Bm25Params::from(settings))),
        SparseBackend::Tantivy => Arc::new(TantivyBm25::build(corpus)?),
    })
}
