//! Embeddings from a remote HTTP endpoint (Ollama-compatible API).

use super::EmbeddingProvider;
use crate::error::EmbeddingError;
use async_trait::async_trait;
use cadkb_rs_config::EmbeddingConfig;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MODEL: &str = "all-minilm";

/// Calls `POST {endpoint}/api/embeddings` with `{model, prompt}`.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    pub fn new(
        endpoint: &str,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| EmbeddingError::Unavailable(err.to_string()))?;
        Ok(Self {
            client,
            url: format!("{}/api/embeddings", endpoint.trim_end_matches('/')),
            model: model.into(),
            dimension,
        })
    }

    /// Build from the `embedding` config block; `endpoint` is required.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .filter(|endpoint| !endpoint.trim().is_empty())
            .ok_or_else(|| {
                EmbeddingError::Unavailable("http provider needs an endpoint".to_string())
            })?;
        Self::new(
            endpoint,
            config.model.as_deref().unwrap_or(DEFAULT_MODEL),
            config.dimension,
            Duration::from_millis(config.timeout_ms),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(&self.url)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|err| EmbeddingError::Unavailable(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingError::Unavailable(format!(
                "embedding endpoint returned {status}"
            )));
        }
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingError::Unavailable(err.to_string()))?;
        if body.embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: body.embedding.len(),
            });
        }
        debug!(
            "embedded text via http (model={}, text_len={})",
            self.model,
            text.len()
        );
        Ok(body.embedding)
    }
}
