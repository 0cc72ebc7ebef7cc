//! Positional character chunking.
//!
//! Chunk `i` covers characters `[i * step, i * step + size)` with
//! `step = size - overlap`; the last chunk may be shorter. There is no
//! sentence awareness.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::traits::Chunker;
use crate::types::{Chunk, Document};

/// A chunk before it is attached to a document. Offsets count characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Checks a sliding window and returns its step.
///
/// `size` of `None` or `0` disables chunking and always validates.
pub fn window_step(size: Option<usize>, overlap: usize) -> Result<Option<usize>> {
    match size {
        None | Some(0) => Ok(None),
        Some(size) if overlap >= size => Err(Error::config(format!(
            "chunk overlap ({overlap}) must be smaller than chunk size ({size})"
        ))),
        Some(size) => Ok(Some(size - overlap)),
    }
}

/// Splits `text` into chunk strings. See [`chunk_spans`].
pub fn chunk(text: &str, size: Option<usize>, overlap: usize) -> Result<Vec<String>> {
    Ok(chunk_spans(text, size, overlap)?.into_iter().map(|s| s.text).collect())
}

/// Splits `text` into overlapping character spans.
///
/// Without a size the whole input comes back as one span, even when empty.
/// With a size, empty input yields no spans.
pub fn chunk_spans(text: &str, size: Option<usize>, overlap: usize) -> Result<Vec<ChunkSpan>> {
    let Some(step) = window_step(size, overlap)? else {
        return Ok(vec![ChunkSpan { start: 0, end: text.chars().count(), text: text.to_string() }]);
    };
    let size = size.unwrap_or_default();

    // byte offset of every char boundary, including the end of the string
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .collect();
    let n_chars = bounds.len() - 1;

    let mut spans = Vec::with_capacity(n_chars / step + 1);
    let mut start = 0;
    while start < n_chars {
        let end = (start + size).min(n_chars);
        spans.push(ChunkSpan { start, end, text: text[bounds[start]..bounds[end]].to_string() });
        start += step;
    }
    Ok(spans)
}

/// Character chunker with a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharChunker {
    size: Option<usize>,
    overlap: usize,
}

impl CharChunker {
    pub fn new(size: Option<usize>, overlap: usize) -> Result<Self> {
        window_step(size, overlap)?;
        Ok(Self { size, overlap })
    }

    /// A chunker that keeps each document whole.
    pub fn whole() -> Self {
        Self { size: None, overlap: 0 }
    }
}

impl Chunker for CharChunker {
    fn chunk_spans(&self, text: &str) -> Result<Vec<ChunkSpan>> {
        chunk_spans(text, self.size, self.overlap)
    }
}

/// Chunks a document body and numbers the pieces.
pub fn chunk_document(doc: &Document, chunker: &dyn Chunker) -> Result<Vec<Chunk>> {
    let spans = chunker.chunk_spans(&doc.body)?;
    let total = spans.len();
    Ok(spans
        .into_iter()
        .enumerate()
        .map(|(index, span)| Chunk {
            doc_id: doc.id.clone(),
            index,
            total,
            start: span.start,
            end: span.end,
            text: span.text,
        })
        .collect())
}
