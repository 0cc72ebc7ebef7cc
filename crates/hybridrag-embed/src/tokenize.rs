//! Token-count chunking with a HuggingFace `tokenizer.json`.
//!
//! Windows are counted in tokens (`size` per chunk, `overlap` shared) and
//! mapped back to character offsets through the encoding's offset table.
//! Each chunk runs from its first token to the start of the token after its
//! window, so consecutive chunks leave no gaps in the source text.

use std::path::Path;
use tokenizers::Tokenizer;

use hybridrag_core::chunker::{window_step, ChunkSpan};
use hybridrag_core::error::{Error, Result};
use hybridrag_core::traits::Chunker;

pub struct TokenChunker {
    tokenizer: Tokenizer,
    size: Option<usize>,
    overlap: usize,
}

impl TokenChunker {
    pub fn from_file(path: &Path, size: Option<usize>, overlap: usize) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| Error::config(format!("failed to load tokenizer {}: {e}", path.display())))?;
        Self::new(tokenizer, size, overlap)
    }

    pub fn new(tokenizer: Tokenizer, size: Option<usize>, overlap: usize) -> Result<Self> {
        window_step(size, overlap)?;
        Ok(Self { tokenizer, size, overlap })
    }

    pub fn count_tokens(&self, text: &str) -> Result<usize> {
        let enc = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| Error::config(format!("tokenization failed: {e}")))?;
        Ok(enc.len())
    }
}

impl Chunker for TokenChunker {
    fn chunk_spans(&self, text: &str) -> Result<Vec<ChunkSpan>> {
        let n_chars = text.chars().count();
        let Some(step) = window_step(self.size, self.overlap)? else {
            return Ok(vec![ChunkSpan { start: 0, end: n_chars, text: text.to_string() }]);
        };
        let size = self.size.unwrap_or_default();

        let enc = self
            .tokenizer
            .encode_char_offsets(text, false)
            .map_err(|e| Error::config(format!("tokenization failed: {e}")))?;
        let offsets = enc.get_offsets();
        let n_tokens = offsets.len();

        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(text.len()))
            .collect();

        let mut spans = Vec::new();
        let mut first = 0;
        while first < n_tokens {
            let last = (first + size).min(n_tokens);
            let start = if first == 0 { 0 } else { offsets[first].0 };
            let end = if last == n_tokens { n_chars } else { offsets[last].0 };
            spans.push(ChunkSpan { start, end, text: text[bounds[start]..bounds[end]].to_string() });
            first += step;
        }
        Ok(spans)
    }
}
