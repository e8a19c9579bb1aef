use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chart::ChartPayload;
use crate::forecast::EarningsForecast;
use crate::query::Symbol;
use crate::retrieval::RetrievalSummary;
use crate::risk::RiskReport;

pub const BRIEF_SCHEMA_VERSION: u32 = 1;

/// Pipeline stages, used to tag errors, issues and status flags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SymbolExtraction,
    MarketData,
    News,
    Retrieval,
    Analysis,
    Prediction,
    Narrative,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::SymbolExtraction => "symbol_extraction",
            Stage::MarketData => "market_data",
            Stage::News => "news",
            Stage::Retrieval => "retrieval",
            Stage::Analysis => "analysis",
            Stage::Prediction => "prediction",
            Stage::Narrative => "narrative",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Ok,
    Degraded,
    Failed,
}

impl StageStatus {
    /// Ok when every part succeeded, Failed when none did, Degraded otherwise.
    pub fn from_counts(succeeded: usize, total: usize) -> Self {
        if succeeded == total {
            StageStatus::Ok
        } else if succeeded == 0 {
            StageStatus::Failed
        } else {
            StageStatus::Degraded
        }
    }
}

/// Status of every stage for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageReport {
    pub symbol_extraction: StageStatus,
    pub market_data: StageStatus,
    pub news: StageStatus,
    pub retrieval: StageStatus,
    pub analysis: StageStatus,
    pub prediction: StageStatus,
    pub narrative: StageStatus,
}

/// Per-symbol status flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolStatus {
    pub symbol: Symbol,
    pub market_data: StageStatus,
    pub news: StageStatus,
    pub earnings: StageStatus,
    pub overall: StageStatus,
}

impl SymbolStatus {
    pub fn new(
        symbol: Symbol,
        market_data: StageStatus,
        news: StageStatus,
        earnings: StageStatus,
    ) -> Self {
        let parts = [market_data, news, earnings];
        let overall = if parts.iter().all(|s| *s == StageStatus::Ok) {
            StageStatus::Ok
        } else if parts.iter().all(|s| *s == StageStatus::Failed) {
            StageStatus::Failed
        } else {
            StageStatus::Degraded
        };
        Self {
            symbol,
            market_data,
            news,
            earnings,
            overall,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Failed,
    Empty,
    QuotaExceeded,
    Timeout,
}

/// A non-fatal problem recorded while building the brief.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageIssue {
    pub stage: Stage,
    pub symbol: Option<Symbol>,
    pub kind: IssueKind,
    pub detail: String,
}

/// Why the template narrative was used instead of the language model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    LowRetrievalConfidence,
    NewsUnavailable,
    MarketDataUnavailable,
    QuotaExceeded,
    Timeout,
    GenerationFailed,
    EmptyResponse,
}

impl FallbackReason {
    pub fn describe(&self) -> &'static str {
        match self {
            FallbackReason::LowRetrievalConfidence => "retrieved context was not relevant enough",
            FallbackReason::NewsUnavailable => "no news articles could be retrieved",
            FallbackReason::MarketDataUnavailable => "no market data could be retrieved",
            FallbackReason::QuotaExceeded => "the language model quota was exhausted",
            FallbackReason::Timeout => "the language model timed out",
            FallbackReason::GenerationFailed => "the language model call failed",
            FallbackReason::EmptyResponse => "the language model returned no usable text",
        }
    }
}

/// Brief narrative with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provenance", rename_all = "snake_case")]
pub enum Narrative {
    Generated { text: String },
    Fallback { text: String, reason: FallbackReason },
}

impl Narrative {
    pub fn text(&self) -> &str {
        match self {
            Narrative::Generated { text } | Narrative::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Narrative::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            Narrative::Generated { .. } => None,
            Narrative::Fallback { reason, .. } => Some(*reason),
        }
    }
}

/// The synthesized market brief returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Brief {
    pub id: Uuid,
    pub schema_version: u32,
    pub query_id: Uuid,
    pub query: String,
    pub symbols: Vec<Symbol>,
    pub narrative: Narrative,
    pub risk: RiskReport,
    pub forecasts: Vec<EarningsForecast>,
    pub charts: Vec<ChartPayload>,
    pub symbol_status: Vec<SymbolStatus>,
    pub stages: StageReport,
    pub retrieval: RetrievalSummary,
    pub issues: Vec<StageIssue>,
    /// Symbols skipped by the earnings predictor for lack of history.
    pub insufficient_history: Vec<Symbol>,
    pub generated_at: DateTime<Utc>,
    pub processing_time_ms: u64,
}

impl Brief {
    pub fn status_of(&self, symbol: &Symbol) -> Option<&SymbolStatus> {
        self.symbol_status.iter().find(|s| &s.symbol == symbol)
    }
}
