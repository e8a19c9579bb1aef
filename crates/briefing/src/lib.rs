//! Market Brief: a multi-agent orchestrator that turns a free-text market
//! question into a structured brief.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use briefing::models::{BriefConfig, Query};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = BriefConfig::default();
//! let orchestrator = briefing::build_orchestrator(&config)?;
//! let brief = orchestrator.handle(&Query::new("How exposed are we to TSM?")).await?;
//! println!("{}", brief.narrative.text());
//! # Ok(())
//! # }
//! ```

pub use briefing_agents as agents;
pub use briefing_models as models;

pub mod server;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use briefing_agents::{
    ClaudeCli, ClaudeCliConfig, EmbeddingModel, FinnhubNews, HttpVoiceBridge, LanguageModel,
    LocalEmbedder, OpenAiCompatChat, OpenAiCompatEmbedder, Orchestrator, Providers,
    VoiceBridge, YahooMarketData,
};
use briefing_models::{BriefConfig, EmbeddingBackend, LlmBackend};
use tracing::warn;

/// Load configuration from a TOML file. Missing sections take defaults.
pub fn load_config(path: &Path) -> anyhow::Result<BriefConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Failed to parse config: {}", path.display()))
}

fn api_key(env_var: &str) -> Option<String> {
    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Some(key),
        _ => None,
    }
}

/// Build the live provider adapters selected by configuration.
pub fn build_providers(config: &BriefConfig) -> anyhow::Result<Providers> {
    let stage_timeout = Duration::from_secs(config.pipeline.stage_timeout_seconds);
    let narrative_timeout = Duration::from_secs(config.pipeline.narrative_timeout_seconds);
    let providers = &config.providers;

    let market_data = YahooMarketData::new(&providers.market_data.base_url, stage_timeout)
        .context("Failed to build market data client")?;

    let news_key = api_key(&providers.news.api_key_env);
    if news_key.is_none() {
        warn!(env = %providers.news.api_key_env, "News API key not set, every brief will use statistical news");
    }
    let news = FinnhubNews::new(
        &providers.news.base_url,
        news_key,
        providers.news.lookback_days,
        stage_timeout,
    )
    .context("Failed to build news client")?;

    let embedder: Arc<dyn EmbeddingModel> = match providers.embedding.backend {
        EmbeddingBackend::Local => Arc::new(LocalEmbedder::new(providers.embedding.dimension)),
        EmbeddingBackend::Openai => Arc::new(
            OpenAiCompatEmbedder::new(
                &providers.embedding.base_url,
                &providers.embedding.model,
                api_key(&providers.embedding.api_key_env),
                stage_timeout,
            )
            .context("Failed to build embedding client")?,
        ),
    };

    let llm: Arc<dyn LanguageModel> = match providers.llm.backend {
        LlmBackend::Openai => Arc::new(
            OpenAiCompatChat::new(
                &providers.llm.base_url,
                &providers.llm.model,
                api_key(&providers.llm.api_key_env),
                narrative_timeout,
            )
            .context("Failed to build language model client")?
            .with_sampling(providers.llm.max_tokens, providers.llm.temperature),
        ),
        LlmBackend::ClaudeCli => Arc::new(ClaudeCli::new(ClaudeCliConfig {
            model: providers.llm.model.clone(),
            timeout: narrative_timeout,
        })),
    };

    Ok(Providers {
        market_data: Arc::new(market_data),
        news: Arc::new(news),
        embedder,
        llm,
    })
}

/// Build an Orchestrator wired to the live providers.
pub fn build_orchestrator(config: &BriefConfig) -> anyhow::Result<Orchestrator> {
    Ok(Orchestrator::new(config, build_providers(config)?))
}

/// Speech-to-text and text-to-speech for the voice endpoint.
pub fn build_voice(config: &BriefConfig) -> anyhow::Result<Arc<dyn VoiceBridge>> {
    let voice = &config.providers.voice;
    let bridge = HttpVoiceBridge::new(
        &voice.base_url,
        api_key(&voice.api_key_env),
        &voice.transcription_model,
        &voice.speech_model,
        &voice.voice,
        Duration::from_secs(config.pipeline.narrative_timeout_seconds),
    )
    .context("Failed to build voice client")?;
    Ok(Arc::new(bridge))
}
