//! Scriptable fakes for every provider trait.
//!
//! The orchestrator only ever sees `Arc<dyn Trait>`, so these stand in for
//! Yahoo, Finnhub, the embedding API, the language model and the voice
//! services in unit and scenario tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use briefing_models::{
    ChunkSource, EarningsPoint, MarketSnapshot, NewsItem, PricePoint, RetrievalResult, Symbol,
};
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;

use crate::embedding::EmbeddingModel;
use crate::error::AgentError;
use crate::llm::LanguageModel;
use crate::market_data::MarketDataSource;
use crate::news::NewsSource;
use crate::voice::VoiceBridge;

fn symbol(raw: &str) -> Symbol {
    Symbol::parse(raw).unwrap_or_else(|| panic!("invalid test symbol {raw:?}"))
}

fn provider_error(provider: &str, status: u16, code: Option<&str>, message: &str) -> AgentError {
    AgentError::Provider {
        provider: provider.to_string(),
        status,
        code: code.map(String::from),
        message: message.to_string(),
    }
}

/// Snapshot with one daily close per entry in `closes`, oldest first.
pub fn snapshot(raw_symbol: &str, price: Decimal, closes: &[Decimal]) -> MarketSnapshot {
    let now = Utc::now();
    let days = closes.len() as i64;
    MarketSnapshot {
        symbol: symbol(raw_symbol),
        price,
        volume: 1_000_000,
        history: closes
            .iter()
            .enumerate()
            .map(|(i, close)| PricePoint {
                timestamp: now - ChronoDuration::days(days - i as i64),
                close: *close,
            })
            .collect(),
        fetched_at: now,
    }
}

pub fn news_item(raw_symbol: &str, headline: &str, body: &str) -> NewsItem {
    NewsItem {
        symbol: symbol(raw_symbol),
        headline: headline.to_string(),
        body: body.to_string(),
        source: "test_wire".to_string(),
        url: None,
        published_at: Utc::now(),
        is_fallback: false,
    }
}

pub fn retrieval_result(raw_symbol: &str, chunk: &str, score: f32) -> RetrievalResult {
    RetrievalResult {
        chunk: chunk.to_string(),
        score,
        source: ChunkSource {
            symbol: symbol(raw_symbol),
            headline: chunk.lines().next().unwrap_or_default().to_string(),
            is_fallback: false,
        },
    }
}

/// Market data from fixed tables. Unknown symbols fail with HTTP 404.
#[derive(Default)]
pub struct StaticMarketData {
    quotes: HashMap<Symbol, MarketSnapshot>,
    earnings: HashMap<Symbol, Vec<EarningsPoint>>,
    failing: HashSet<Symbol>,
    quota_exhausted: bool,
    delay: Option<Duration>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, raw_symbol: &str, price: Decimal, closes: &[Decimal]) -> Self {
        self.quotes
            .insert(symbol(raw_symbol), snapshot(raw_symbol, price, closes));
        self
    }

    pub fn with_earnings(mut self, raw_symbol: &str, points: &[(i32, f64)]) -> Self {
        self.earnings.insert(
            symbol(raw_symbol),
            points
                .iter()
                .map(|&(period, value)| EarningsPoint { period, value })
                .collect(),
        );
        self
    }

    /// Every call for this symbol fails with HTTP 503.
    pub fn with_failure(mut self, raw_symbol: &str) -> Self {
        self.failing.insert(symbol(raw_symbol));
        self
    }

    /// Every call fails with HTTP 429.
    pub fn quota_exhausted(mut self) -> Self {
        self.quota_exhausted = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn check(&self, symbol: &Symbol) -> Result<(), AgentError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.quota_exhausted {
            return Err(provider_error("static_market", 429, None, "rate limited"));
        }
        if self.failing.contains(symbol) {
            return Err(provider_error("static_market", 503, None, "upstream unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataSource for StaticMarketData {
    fn name(&self) -> &str {
        "static_market"
    }

    async fn snapshot(&self, symbol: &Symbol, _history_days: u32) -> Result<MarketSnapshot, AgentError> {
        self.check(symbol).await?;
        self.quotes
            .get(symbol)
            .cloned()
            .ok_or_else(|| provider_error("static_market", 404, None, "unknown symbol"))
    }

    async fn earnings(&self, symbol: &Symbol) -> Result<Vec<EarningsPoint>, AgentError> {
        self.check(symbol).await?;
        Ok(self.earnings.get(symbol).cloned().unwrap_or_default())
    }
}

/// News from a fixed table. Unknown symbols return no articles.
#[derive(Default)]
pub struct StaticNews {
    articles: HashMap<Symbol, Vec<NewsItem>>,
    failing: HashSet<Symbol>,
    quota_exhausted: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticNews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_article(mut self, raw_symbol: &str, headline: &str, body: &str) -> Self {
        self.articles
            .entry(symbol(raw_symbol))
            .or_default()
            .push(news_item(raw_symbol, headline, body));
        self
    }

    pub fn with_failure(mut self, raw_symbol: &str) -> Self {
        self.failing.insert(symbol(raw_symbol));
        self
    }

    pub fn quota_exhausted(mut self) -> Self {
        self.quota_exhausted = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NewsSource for StaticNews {
    fn name(&self) -> &str {
        "static_news"
    }

    async fn articles(&self, symbol: &Symbol) -> Result<Vec<NewsItem>, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.quota_exhausted {
            return Err(provider_error("static_news", 429, None, "API limit reached"));
        }
        if self.failing.contains(symbol) {
            return Err(provider_error("static_news", 500, None, "internal error"));
        }
        Ok(self.articles.get(symbol).cloned().unwrap_or_default())
    }
}

enum EmbedScript {
    Similarity(f32),
    Failing,
}

/// Every document scores exactly the configured similarity against any query.
pub struct ScriptedEmbedder {
    script: EmbedScript,
}

impl ScriptedEmbedder {
    pub fn with_similarity(score: f32) -> Self {
        Self {
            script: EmbedScript::Similarity(score.clamp(0.0, 1.0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            script: EmbedScript::Failing,
        }
    }
}

#[async_trait]
impl EmbeddingModel for ScriptedEmbedder {
    fn name(&self) -> &str {
        "scripted_embedder"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AgentError> {
        match self.script {
            EmbedScript::Similarity(score) => {
                let orthogonal = (1.0 - score * score).max(0.0).sqrt();
                Ok(texts.iter().map(|_| vec![score, orthogonal]).collect())
            }
            EmbedScript::Failing => Err(provider_error("scripted_embedder", 500, None, "embedding backend down")),
        }
    }

    async fn embed_one(&self, _text: &str) -> Result<Vec<f32>, AgentError> {
        match self.script {
            EmbedScript::Similarity(_) => Ok(vec![1.0, 0.0]),
            EmbedScript::Failing => Err(provider_error("scripted_embedder", 500, None, "embedding backend down")),
        }
    }
}

enum LlmScript {
    Reply(String),
    Quota,
    Fail,
    Slow(Duration),
}

/// Language model with a canned outcome. Records every prompt it receives.
pub struct ScriptedLanguageModel {
    script: LlmScript,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedLanguageModel {
    fn new(script: LlmScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn reply(text: &str) -> Self {
        Self::new(LlmScript::Reply(text.to_string()))
    }

    /// HTTP 429 with an `insufficient_quota` code.
    pub fn quota_exceeded() -> Self {
        Self::new(LlmScript::Quota)
    }

    pub fn failing() -> Self {
        Self::new(LlmScript::Fail)
    }

    /// Replies only after `delay`.
    pub fn slow(delay: Duration) -> Self {
        Self::new(LlmScript::Slow(delay))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    fn name(&self) -> &str {
        "scripted_llm"
    }

    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(user_prompt.to_string());
        }
        match &self.script {
            LlmScript::Reply(text) => Ok(text.clone()),
            LlmScript::Quota => Err(provider_error(
                "scripted_llm",
                429,
                Some("insufficient_quota"),
                "You exceeded your current quota",
            )),
            LlmScript::Fail => Err(provider_error("scripted_llm", 500, None, "server error")),
            LlmScript::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok("late reply".to_string())
            }
        }
    }
}

/// Voice bridge with a fixed transcript and a fake mp3 payload.
pub struct ScriptedVoice {
    transcript: Option<String>,
    speech_fails: bool,
    spoken: Mutex<Vec<String>>,
}

impl ScriptedVoice {
    pub fn new(transcript: &str) -> Self {
        Self {
            transcript: Some(transcript.to_string()),
            speech_fails: false,
            spoken: Mutex::new(Vec::new()),
        }
    }

    /// Speech-to-text fails for every upload.
    pub fn deaf() -> Self {
        Self {
            transcript: None,
            speech_fails: false,
            spoken: Mutex::new(Vec::new()),
        }
    }

    /// Text-to-speech fails.
    pub fn mute(mut self) -> Self {
        self.speech_fails = true;
        self
    }

    /// Texts passed to `synthesize`, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VoiceBridge for ScriptedVoice {
    async fn transcribe(&self, _audio: Vec<u8>) -> Result<String, AgentError> {
        self.transcript
            .clone()
            .ok_or_else(|| provider_error("scripted_voice", 400, None, "unreadable audio"))
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, AgentError> {
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(text.to_string());
        }
        if self.speech_fails {
            return Err(provider_error("scripted_voice", 500, None, "tts unavailable"));
        }
        Ok(b"ID3fake-mp3".to_vec())
    }
}
