//! Sparse index backed by an in-RAM tantivy index.
//!
//! Text is pre-tokenized with [`tokenize`] and indexed with a whitespace
//! tokenizer, so tokens match the Okapi backend exactly. Scoring uses
//! tantivy's own BM25 (`k1 = 1.2`, `b = 0.75`, non-negative IDF), so rankings
//! can differ from [`crate::Bm25Index`] on the same corpus.

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED};
use tantivy::tokenizer::{TextAnalyzer, WhitespaceTokenizer};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use hybridrag_core::error::{Error, Result};
use hybridrag_core::traits::SparseScorer;

use crate::tokenize::tokenize;

const TOKENIZER_NAME: &str = "hybridrag_ws";

fn build_schema() -> (Schema, Field, Field) {
    let mut schema_builder = Schema::builder();
    let pos_field = schema_builder.add_u64_field("pos", STORED);
    let indexing = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER_NAME)
        .set_index_option(IndexRecordOption::WithFreqs);
    let text_field = schema_builder.add_text_field("tokens", TextOptions::default().set_indexing_options(indexing));
    (schema_builder.build(), pos_field, text_field)
}

fn sparse_err(e: impl std::fmt::Display) -> Error {
    Error::SparseIndex(e.to_string())
}

pub struct TantivyBm25 {
    ids: Vec<String>,
    reader: IndexReader,
    pos_field: Field,
    text_field: Field,
}

impl TantivyBm25 {
    pub fn build<I, S, T>(corpus: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: AsRef<str>,
    {
        let (schema, pos_field, text_field) = build_schema();
        let index = Index::create_in_ram(schema);
        index
            .tokenizers()
            .register(TOKENIZER_NAME, TextAnalyzer::builder(WhitespaceTokenizer::default()).build());

        let mut writer: IndexWriter = index.writer(50_000_000).map_err(sparse_err)?;
        let mut ids = Vec::new();
        for (pos, (id, text)) in corpus.into_iter().enumerate() {
            ids.push(id.into());
            writer
                .add_document(doc!(
                    pos_field => pos as u64,
                    text_field => tokenize(text.as_ref()).join(" "),
                ))
                .map_err(sparse_err)?;
        }
        writer.commit().map_err(sparse_err)?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(sparse_err)?;
        tracing::debug!(docs = ids.len(), "built tantivy bm25 index");
        Ok(Self { ids, reader, pos_field, text_field })
    }

    fn try_scores(&self, query: &str) -> Result<Vec<f32>> {
        let mut scores = vec![0.0f32; self.ids.len()];
        let tokens = tokenize(query);
        if self.ids.is_empty() || tokens.is_empty() {
            return Ok(scores);
        }
        let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
            .iter()
            .map(|t| {
                let term = Term::from_field_text(self.text_field, t);
                (Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(self.ids.len())).map_err(sparse_err)?;
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr).map_err(sparse_err)?;
            if let Some(pos) = doc.get_first(self.pos_field).and_then(|v| v.as_u64()) {
                if let Some(slot) = scores.get_mut(pos as usize) {
                    *slot = score;
                }
            }
        }
        Ok(scores)
    }
}

impl SparseScorer for TantivyBm25 {
    fn ids(&self) -> &[String] {
        &self.ids
    }

    fn scores(&self, query: &str) -> Vec<f32> {
        match self.try_scores(query) {
            Ok(scores) => scores,
            Err(e) => {
                tracing::error!(error = %e, "tantivy scoring failed");
                vec![0.0; self.ids.len()]
            }
        }
    }
}
