pub mod brief;
pub mod chart;
pub mod config;
pub mod forecast;
pub mod market;
pub mod news;
pub mod query;
pub mod retrieval;
pub mod risk;

pub use brief::{
    Brief, FallbackReason, IssueKind, Narrative, Stage, StageIssue, StageReport, StageStatus,
    SymbolStatus, BRIEF_SCHEMA_VERSION,
};
pub use chart::{ChartKind, ChartPayload, ChartPoint, ChartSeries};
pub use config::{
    BriefConfig, EmbeddingBackend, EmbeddingConfig, LlmBackend, LlmConfig, LogFormat,
    LoggingConfig, MarketDataConfig, NewsConfig, PipelineConfig, PortfolioConfig,
    ProvidersConfig, ServerConfig, SymbolsConfig, VoiceConfig,
};
pub use forecast::{ConfidenceTier, EarningsForecast, ForecastStatus};
pub use market::{EarningsPoint, MarketSnapshot, PricePoint};
pub use news::{NewsDigest, NewsItem, NewsPath};
pub use query::{Query, Symbol, MAX_SYMBOL_LEN};
pub use retrieval::{ChunkSource, RetrievalResult, RetrievalSummary};
pub use risk::{Position, RiskReport, WEIGHT_TOLERANCE};
