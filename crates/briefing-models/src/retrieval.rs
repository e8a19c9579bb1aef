use serde::{Deserialize, Serialize};

use crate::query::Symbol;

/// Where a retrieved chunk came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkSource {
    pub symbol: Symbol,
    pub headline: String,
    pub is_fallback: bool,
}

/// A single retrieved chunk with its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub chunk: String,
    /// Cosine similarity clamped to [0, 1].
    pub score: f32,
    pub source: ChunkSource,
}

/// Retrieval stage outcome as reported in a brief.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalSummary {
    /// Max score across `results`, 0.0 when empty.
    pub confidence: f32,
    pub low_confidence: bool,
    pub results: Vec<RetrievalResult>,
}

impl RetrievalSummary {
    pub fn from_results(results: Vec<RetrievalResult>, threshold: f32) -> Self {
        let confidence = results.iter().map(|r| r.score).fold(0.0f32, f32::max);
        let low_confidence = results.is_empty() || confidence < threshold;
        Self {
            confidence,
            low_confidence,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(score: f32) -> RetrievalResult {
        RetrievalResult {
            chunk: "chunk".to_string(),
            score,
            source: ChunkSource {
                symbol: Symbol::parse("AAPL").unwrap(),
                headline: "h".to_string(),
                is_fallback: false,
            },
        }
    }

    #[test]
    fn empty_results_are_low_confidence() {
        let summary = RetrievalSummary::from_results(vec![], 0.65);
        assert!(summary.low_confidence);
        assert_eq!(summary.confidence, 0.0);
    }

    #[test]
    fn confidence_is_max_score() {
        let summary = RetrievalSummary::from_results(vec![result(0.4), result(0.8)], 0.65);
        assert_eq!(summary.confidence, 0.8);
        assert!(!summary.low_confidence);
    }

    #[test]
    fn below_threshold_is_low_confidence() {
        let summary = RetrievalSummary::from_results(vec![result(0.64)], 0.65);
        assert!(summary.low_confidence);
    }
}
