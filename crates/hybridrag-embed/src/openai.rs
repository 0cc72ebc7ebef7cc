//! Embeddings over an OpenAI-compatible `/embeddings` endpoint.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use hybridrag_core::config::EmbeddingSettings;
use hybridrag_core::error::{Error, Result};
use hybridrag_core::traits::Embedder;

use crate::retry::Backoff;

/// Async client for OpenAI-compatible embedding APIs.
///
/// Inputs larger than `max_batch_size` are sent as sequential requests and
/// the results concatenated in input order. Only HTTP 429 is retried.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    dim: usize,
    max_batch_size: usize,
    backoff: Backoff,
}

impl OpenAiEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::config("missing embedding API key"))?;
        if settings.model.trim().is_empty() {
            return Err(Error::config("missing embedding model name"));
        }
        if settings.max_batch_size == 0 {
            return Err(Error::config("embedding.max_batch_size must be at least 1"));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| Error::config("embedding API key is not a valid header value"))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            dimensions: settings.dimensions,
            dim: settings.resolved_dim(),
            max_batch_size: settings.max_batch_size,
            backoff: Backoff::with_retries(settings.max_retries, Duration::from_millis(settings.base_delay_ms)),
        })
    }

    pub fn batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest { model: &self.model, input: inputs, dimensions: self.dimensions };
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let resp = self.client.post(&self.endpoint).json(&request).send().await.map_err(|e| {
                Error::EmbeddingProvider { attempts: attempt, rate_limited: false, message: e.to_string() }
            })?;

            let status = resp.status();
            if status.is_success() {
                let mut parsed: EmbeddingResponse = resp.json().await.map_err(|e| Error::EmbeddingProvider {
                    attempts: attempt,
                    rate_limited: false,
                    message: format!("failed to parse embedding response: {e}"),
                })?;
                return self.collect(&mut parsed, inputs.len(), attempt);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = resp
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                if let Some(delay) = self.backoff.next_delay(attempt, retry_after) {
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "embedding rate limited, backing off");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(Error::EmbeddingProvider {
                    attempts: attempt,
                    rate_limited: true,
                    message: "rate limit persisted after all retries".into(),
                });
            }

            let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::EmbeddingProvider {
                attempts: attempt,
                rate_limited: false,
                message: format!("request failed ({status}): {body}"),
            });
        }
    }

    fn collect(&self, parsed: &mut EmbeddingResponse, expected: usize, attempts: u32) -> Result<Vec<Vec<f32>>> {
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != expected {
            return Err(Error::EmbeddingProvider {
                attempts,
                rate_limited: false,
                message: format!("provider returned {} embeddings for {} inputs", parsed.data.len(), expected),
            });
        }
        let vectors: Vec<Vec<f32>> = parsed.data.drain(..).map(|entry| entry.embedding).collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: bad.len() });
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "openai"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    #[tracing::instrument(skip_all, fields(inputs = texts.len(), model = %self.model))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch_size) {
            out.extend(self.embed_batch(batch).await?);
            tracing::debug!(done = out.len(), total = texts.len(), "embedded batch");
        }
        Ok(out)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
