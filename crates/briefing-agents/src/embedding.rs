use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AgentError;

/// Text embedding backend. Mockable for testing.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn name(&self) -> &str;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AgentError>;

    /// Embed a search query. Backends that distinguish queries from
    /// documents override this.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| AgentError::EmptyResponse(self.name().to_string()))
    }

    fn is_quota_error(&self, err: &AgentError) -> bool {
        err.is_rate_limited()
    }
}

/// Deterministic hashed bag-of-words embeddings. No network.
pub struct LocalEmbedder {
    dimension: usize,
}

impl LocalEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = (fnv1a(&token.to_lowercase()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf29ce484222325u64, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl EmbeddingModel for LocalEmbedder {
    fn name(&self) -> &str {
        "local"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AgentError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiCompatEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiCompatEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiCompatEmbedder {
    fn name(&self) -> &str {
        "openai_embeddings"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AgentError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, count = texts.len(), "Requesting embeddings");

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AgentError::from_response("openai_embeddings", response).await);
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("embedding response: {e}")))?;
        if body.data.len() != texts.len() {
            return Err(AgentError::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    fn is_quota_error(&self, err: &AgentError) -> bool {
        err.is_rate_limited() || matches!(err.code(), Some("insufficient_quota"))
    }
}
