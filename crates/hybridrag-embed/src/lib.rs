//! Embedding providers and token-aware chunking.
//!
//! `provider_from_settings` is the single place a provider is chosen; callers
//! only ever see `Arc<dyn Embedder>`.
pub mod fake;
pub mod openai;
pub mod retry;
pub mod tokenize;

use std::path::Path;
use std::sync::Arc;

use hybridrag_core::chunker::CharChunker;
use hybridrag_core::config::{ChunkMode, ChunkingSettings, EmbeddingSettings, ProviderKind};
use hybridrag_core::error::{Error, Result};
use hybridrag_core::traits::{Chunker, Embedder};

pub use fake::FakeEmbedder;
pub use openai::OpenAiEmbedder;
pub use retry::Backoff;
pub use tokenize::TokenChunker;

pub fn provider_from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let provider: Arc<dyn Embedder> = match settings.provider {
        ProviderKind::Fake => Arc::new(FakeEmbedder::new(settings.resolved_dim())),
        ProviderKind::Openai => Arc::new(OpenAiEmbedder::new(settings)?),
    };
    tracing::info!(provider = provider.provider(), model = provider.model(), dim = provider.dim(), "embedding provider ready");
    Ok(provider)
}

/// Character or token chunker, as configured.
pub fn chunker_from_settings(settings: &ChunkingSettings) -> Result<Box<dyn Chunker>> {
    match settings.mode {
        ChunkMode::Chars => Ok(Box::new(CharChunker::new(settings.resolved_size(), settings.resolved_overlap())?)),
        ChunkMode::Tokens => {
            let path = settings
                .tokenizer_path
                .as_deref()
                .ok_or_else(|| Error::config("token chunking needs chunking.tokenizer_path"))?;
            Ok(Box::new(TokenChunker::from_file(Path::new(path), settings.resolved_size(), settings.resolved_overlap())?))
        }
    }
}
