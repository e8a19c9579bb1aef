pub mod charts;
pub mod claude_cli;
pub mod earnings;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod market_data;
pub mod narrative;
pub mod news;
pub mod orchestrator;
pub mod prompts;
pub mod risk;
pub mod symbols;
pub mod vector_index;
pub mod voice;

pub mod test_support;

pub use charts::ChartBuilder;
pub use claude_cli::{ClaudeCli, ClaudeCliConfig};
pub use earnings::EarningsPredictor;
pub use embedding::{EmbeddingModel, LocalEmbedder, OpenAiCompatEmbedder};
pub use error::{AgentError, OrchestrationError};
pub use llm::{LanguageModel, OpenAiCompatChat};
pub use market_data::{MarketDataClient, MarketDataSource, YahooMarketData};
pub use narrative::{NarrativeGenerator, NarrativeInput};
pub use news::{FinnhubNews, NewsClient, NewsSource};
pub use orchestrator::{Orchestrator, Providers};
pub use risk::RiskAnalyzer;
pub use symbols::SymbolExtractor;
pub use vector_index::{cosine_similarity, VectorIndex};
pub use voice::{HttpVoiceBridge, VoiceBridge};
