//! Documents in, points out: chunk, embed, stamp and upsert.
use uuid::Uuid;

use hybridrag_core::chunker::chunk_document;
use hybridrag_core::config::IdStrategy;
use hybridrag_core::error::{Error, Result};
use hybridrag_core::traits::{Chunker, Embedder};
use hybridrag_core::types::{Chunk, Document, Filter, Payload, Point};

use crate::table::{CollectionSpec, CreateMode, VectorIndex};

/// Texts sent to the embedder per call; the provider may split further.
pub const EMBED_WINDOW: usize = 2048;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub data_source: String,
    pub id_strategy: IdStrategy,
    /// Delete every point of `data_source` before writing.
    pub replace_existing: bool,
    pub payload_fields: Vec<String>,
}

impl IngestOptions {
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            id_strategy: IdStrategy::Random,
            replace_existing: false,
            payload_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub replaced: usize,
    pub written: usize,
}

/// Point id for chunk `index` of `doc_id`.
///
/// Deterministic ids are stable across runs, so re-ingesting the same corpus
/// overwrites instead of duplicating.
pub fn point_id(strategy: IdStrategy, data_source: &str, doc_id: &str, index: usize) -> String {
    match strategy {
        IdStrategy::Random => Uuid::new_v4().to_string(),
        IdStrategy::Deterministic => {
            let mut hasher = blake3::Hasher::new();
            hasher.update(data_source.as_bytes());
            hasher.update(&[0]);
            hasher.update(doc_id.as_bytes());
            hasher.update(&[0]);
            hasher.update(&(index as u64).to_le_bytes());
            let digest = hasher.finalize();
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(&digest.as_bytes()[..16]);
            Uuid::from_bytes(bytes).to_string()
        }
    }
}

/// Counts points committed by earlier embed windows into a partial upsert.
fn rebase_partial(err: Error, earlier: usize) -> Error {
    match err {
        Error::PartialUpsert { committed, failed, message } => {
            Error::PartialUpsert { committed: earlier + committed, failed, message }
        }
        other => other,
    }
}

fn chunk_payload(doc: &Document, chunk: &Chunk, data_source: &str, embedder: &dyn Embedder, indexed_at: &str) -> Payload {
    Payload {
        text: chunk.text.clone(),
        doc_id: doc.id.clone(),
        data_source: data_source.to_string(),
        chunk_index: chunk.index,
        total_chunks: chunk.total,
        chunk_start: chunk.start,
        chunk_end: chunk.end,
        fields: doc.fields.clone(),
        embedding_model: embedder.model().to_string(),
        embedding_provider: embedder.provider().to_string(),
        indexed_at: Some(indexed_at.to_string()),
    }
}

impl VectorIndex {
    /// Chunks, embeds and writes `docs` into `collection`, creating it when
    /// missing with the embedder's dimensionality.
    #[tracing::instrument(skip_all, fields(collection = %collection, docs = docs.len(), data_source = %opts.data_source))]
    pub async fn ingest(
        &self,
        collection: &str,
        docs: &[Document],
        chunker: &dyn Chunker,
        embedder: &dyn Embedder,
        opts: &IngestOptions,
    ) -> Result<IngestReport> {
        if opts.data_source.trim().is_empty() {
            return Err(Error::config("ingest needs a non-empty data source tag"));
        }
        let mut pending: Vec<(&Document, Chunk)> = Vec::new();
        for doc in docs {
            for chunk in chunk_document(doc, chunker)? {
                pending.push((doc, chunk));
            }
        }
        tracing::info!(chunks = pending.len(), "chunked documents");

        let spec = CollectionSpec::new(collection, embedder.dim()).with_payload_fields(opts.payload_fields.clone());
        self.create_collection(&spec, CreateMode::IfMissing).await?;

        let mut report = IngestReport { documents: docs.len(), chunks: pending.len(), ..IngestReport::default() };
        if opts.replace_existing {
            report.replaced = self.delete_by_filter(collection, &Filter::data_source(&opts.data_source)).await?;
            tracing::info!(replaced = report.replaced, "removed previous points for data source");
        }

        let indexed_at = chrono::Utc::now().to_rfc3339();
        for window in pending.chunks(EMBED_WINDOW) {
            let texts: Vec<String> = window.iter().map(|(_, c)| c.text.clone()).collect();
            let vectors = embedder.embed(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(Error::EmbeddingProvider {
                    attempts: 1,
                    rate_limited: false,
                    message: format!("got {} vectors for {} chunks", vectors.len(), texts.len()),
                });
            }
            let points: Vec<Point> = window
                .iter()
                .zip(vectors)
                .map(|((doc, chunk), vector)| Point {
                    id: point_id(opts.id_strategy, &opts.data_source, &doc.id, chunk.index),
                    vector,
                    payload: chunk_payload(doc, chunk, &opts.data_source, embedder, &indexed_at),
                })
                .collect();
            match self.upsert(collection, &points).await {
                Ok(r) => report.written += r.written,
                Err(e) => return Err(rebase_partial(e, report.written)),
            }
        }
        tracing::info!(written = report.written, "ingest complete");
        Ok(report)
    }
}
