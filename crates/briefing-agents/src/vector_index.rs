use std::cmp::Ordering;
use std::sync::Arc;

use briefing_models::{ChunkSource, NewsItem, RetrievalResult};
use tracing::debug;

use crate::embedding::EmbeddingModel;
use crate::error::AgentError;

/// Cosine similarity. Returns 0 for mismatched lengths or zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

struct IndexedChunk {
    text: String,
    source: ChunkSource,
    embedding: Vec<f32>,
}

/// In-memory nearest-neighbour index over news chunks. Built per request.
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingModel>,
    chunks: Vec<IndexedChunk>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            embedder,
            chunks: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Embed and store `items` in the order given.
    pub async fn insert(&mut self, items: &[NewsItem]) -> Result<usize, AgentError> {
        if items.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = items.iter().map(NewsItem::chunk_text).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(AgentError::Parse(format!(
                "{} returned {} embeddings for {} chunks",
                self.embedder.name(),
                embeddings.len(),
                texts.len()
            )));
        }

        for ((item, text), embedding) in items.iter().zip(texts).zip(embeddings) {
            self.chunks.push(IndexedChunk {
                text,
                source: ChunkSource {
                    symbol: item.symbol.clone(),
                    headline: item.headline.clone(),
                    is_fallback: item.is_fallback,
                },
                embedding,
            });
        }
        debug!(chunks = self.chunks.len(), "Indexed news chunks");
        Ok(items.len())
    }

    /// Top `k` chunks by similarity to `text`, highest first. Ties keep
    /// insertion order.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievalResult>, AgentError> {
        if self.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed_one(text).await?;

        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .chunks
            .iter()
            .map(|chunk| {
                let score = cosine_similarity(&query_embedding, &chunk.embedding);
                let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
                (score, chunk)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, chunk)| RetrievalResult {
                chunk: chunk.text.clone(),
                score,
                source: chunk.source.clone(),
            })
            .collect())
    }

    pub fn is_quota_error(&self, err: &AgentError) -> bool {
        self.embedder.is_quota_error(err)
    }
}
