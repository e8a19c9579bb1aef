use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the briefing service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BriefConfig {
    pub pipeline: PipelineConfig,
    pub providers: ProvidersConfig,
    pub symbols: SymbolsConfig,
    pub portfolio: PortfolioConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Tunables for the orchestration pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Retrieval below this max similarity is treated as low confidence.
    pub confidence_threshold: f32,
    /// Number of periods the earnings predictor projects.
    pub forecast_horizon: usize,
    /// Top-k chunks returned by retrieval.
    pub retrieval_k: usize,
    /// Per-call timeout for market data, news and embedding calls.
    pub stage_timeout_seconds: u64,
    /// Timeout for the language model call.
    pub narrative_timeout_seconds: u64,
    /// Upper bound on the prompt handed to the language model.
    pub max_prompt_chars: usize,
    /// Days of price history fetched per symbol.
    pub history_days: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.65,
            forecast_horizon: 2,
            retrieval_k: 3,
            stage_timeout_seconds: 15,
            narrative_timeout_seconds: 45,
            max_prompt_chars: 6000,
            history_days: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProvidersConfig {
    pub market_data: MarketDataConfig,
    pub news: NewsConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub voice: VoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarketDataConfig {
    pub base_url: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NewsConfig {
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// How far back to look for articles.
    pub lookback_days: u32,
    /// Articles kept per symbol.
    pub max_articles: usize,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://finnhub.io/api/v1".to_string(),
            api_key_env: "FINNHUB_API_KEY".to_string(),
            lookback_days: 7,
            max_articles: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Hashed bag-of-words, no network.
    #[default]
    Local,
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    /// Dimension of local hashed embeddings.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Local,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            dimension: 256,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LlmBackend {
    #[default]
    Openai,
    ClaudeCli,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Openai,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 600,
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub transcription_model: String,
    pub speech_model: String,
    pub voice: String,
    /// Query used when speech-to-text yields nothing.
    pub default_query: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            transcription_model: "whisper-1".to_string(),
            speech_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            default_query: "What's our risk exposure in technology stocks?".to_string(),
        }
    }
}

/// Symbol resolution tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SymbolsConfig {
    /// Lowercase company name -> ticker.
    pub aliases: BTreeMap<String, String>,
    /// Uppercase tokens that look like tickers but are not.
    pub stop_tokens: Vec<String>,
    /// Ticker -> exposure category.
    pub categories: BTreeMap<String, String>,
}

impl Default for SymbolsConfig {
    fn default() -> Self {
        let aliases = [
            ("tsmc", "TSM"),
            ("taiwan semiconductor", "TSM"),
            ("samsung", "005930.KS"),
            ("samsung electronics", "005930.KS"),
            ("apple", "AAPL"),
            ("google", "GOOGL"),
            ("alphabet", "GOOGL"),
            ("microsoft", "MSFT"),
            ("amazon", "AMZN"),
            ("meta", "META"),
            ("facebook", "META"),
            ("netflix", "NFLX"),
            ("nvidia", "NVDA"),
            ("tesla", "TSLA"),
            ("intel", "INTC"),
            ("advanced micro devices", "AMD"),
            ("qualcomm", "QCOM"),
        ];
        let categories = [
            ("AAPL", "technology"),
            ("MSFT", "technology"),
            ("GOOGL", "technology"),
            ("AMZN", "technology"),
            ("META", "technology"),
            ("NFLX", "technology"),
            ("TSM", "semiconductors"),
            ("NVDA", "semiconductors"),
            ("INTC", "semiconductors"),
            ("AMD", "semiconductors"),
            ("QCOM", "semiconductors"),
            ("005930.KS", "semiconductors"),
            ("TSLA", "electric_vehicles"),
            ("RIVN", "electric_vehicles"),
            ("NIO", "electric_vehicles"),
            ("JPM", "finance"),
            ("BAC", "finance"),
            ("GS", "finance"),
        ];
        let stop_tokens = ["I", "A", "AI", "CEO", "CFO", "ETF", "IPO", "USA", "US", "USD", "EPS"];

        Self {
            aliases: aliases
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            stop_tokens: stop_tokens.into_iter().map(String::from).collect(),
            categories: categories
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Default holdings used when a query supplies none.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortfolioConfig {
    /// Ticker -> units held.
    pub holdings: BTreeMap<String, Decimal>,
    /// Units assumed for symbols with no configured holding.
    pub default_units: Decimal,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            holdings: BTreeMap::new(),
            default_units: Decimal::ONE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn roundtrip_brief_config() {
        let config = BriefConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: BriefConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn pipeline_defaults() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.confidence_threshold, 0.65);
        assert_eq!(pipeline.forecast_horizon, 2);
        assert_eq!(pipeline.retrieval_k, 3);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: BriefConfig = toml::from_str("").unwrap();
        assert_eq!(config, BriefConfig::default());
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[pipeline]
confidence_threshold = 0.7
forecast_horizon = 3

[providers.embedding]
backend = "openai"
model = "text-embedding-3-large"

[providers.llm]
backend = "claude_cli"
model = "claude-3-5-haiku-latest"

[symbols]
stop_tokens = ["I"]

[symbols.aliases]
"berkshire" = "BRK.B"

[portfolio]
default_units = "10"

[portfolio.holdings]
TSM = "120"
"005930.KS" = "40"

[logging]
format = "json"
"#;

        let config: BriefConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.pipeline.confidence_threshold, 0.7);
        assert_eq!(config.pipeline.forecast_horizon, 3);
        assert_eq!(config.pipeline.retrieval_k, 3);
        assert_eq!(config.providers.embedding.backend, EmbeddingBackend::Openai);
        assert_eq!(config.providers.llm.backend, LlmBackend::ClaudeCli);
        assert_eq!(config.symbols.aliases["berkshire"], "BRK.B");
        assert_eq!(config.symbols.stop_tokens, vec!["I"]);
        assert_eq!(config.portfolio.default_units, dec!(10));
        assert_eq!(config.portfolio.holdings["005930.KS"], dec!(40));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.server.bind, "0.0.0.0:8000");
    }
}
