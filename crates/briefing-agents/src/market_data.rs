use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use briefing_models::{EarningsPoint, MarketSnapshot, PricePoint, Symbol};
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::error::{with_timeout, AgentError};

/// Source of quotes, price history and earnings. Mockable for testing.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn name(&self) -> &str;

    async fn snapshot(&self, symbol: &Symbol, history_days: u32)
        -> Result<MarketSnapshot, AgentError>;

    /// Yearly earnings, any order.
    async fn earnings(&self, symbol: &Symbol) -> Result<Vec<EarningsPoint>, AgentError>;

    fn is_quota_error(&self, err: &AgentError) -> bool {
        err.is_rate_limited()
    }
}

/// Bounds every market data call with a timeout.
#[derive(Clone)]
pub struct MarketDataClient {
    source: Arc<dyn MarketDataSource>,
    timeout: Duration,
    history_days: u32,
}

impl MarketDataClient {
    pub fn new(source: Arc<dyn MarketDataSource>, timeout: Duration, history_days: u32) -> Self {
        Self {
            source,
            timeout,
            history_days,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn snapshot(&self, symbol: &Symbol) -> Result<MarketSnapshot, AgentError> {
        with_timeout(
            self.timeout,
            self.source.snapshot(symbol, self.history_days),
        )
        .await
    }

    /// Earnings ordered by period.
    pub async fn earnings(&self, symbol: &Symbol) -> Result<Vec<EarningsPoint>, AgentError> {
        let mut points = with_timeout(self.timeout, self.source.earnings(symbol)).await?;
        points.sort_by_key(|p| p.period);
        Ok(points)
    }

    pub fn is_quota_error(&self, err: &AgentError) -> bool {
        self.source.is_quota_error(err)
    }
}

/// Yahoo Finance chart and quoteSummary endpoints.
pub struct YahooMarketData {
    client: Client,
    base_url: Url,
}

impl YahooMarketData {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (compatible; market-brief)")
            .build()?;
        let base_url = base_url.into();
        let base_url = Url::parse(&base_url)
            .map_err(|e| AgentError::Config(format!("invalid yahoo base url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AgentError::Config(format!("yahoo base url {base_url} cannot take a path")));
        }
        Ok(Self { client, base_url })
    }

    /// `base_url` joined with `path` and the symbol as one percent-encoded segment.
    fn endpoint(&self, path: &[&str], symbol: &Symbol) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path).push(symbol.as_str());
        }
        url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, AgentError> {
        let response = self.client.get(url).query(query).send().await?;
        if !response.status().is_success() {
            return Err(AgentError::from_response("yahoo", response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AgentError::Parse(format!("yahoo response: {e}")))
    }
}

#[derive(Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
}

#[derive(Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    regular_market_volume: Option<u64>,
}

#[derive(Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryEnvelope {
    quote_summary: SummaryBody,
}

#[derive(Deserialize)]
struct SummaryBody {
    result: Option<Vec<SummaryResult>>,
}

#[derive(Deserialize)]
struct SummaryResult {
    earnings: Option<EarningsModule>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EarningsModule {
    financials_chart: Option<FinancialsChart>,
}

#[derive(Deserialize)]
struct FinancialsChart {
    #[serde(default)]
    yearly: Vec<YearlyEarnings>,
}

#[derive(Deserialize)]
struct YearlyEarnings {
    date: i32,
    earnings: RawValue,
}

#[derive(Deserialize)]
struct RawValue {
    raw: Option<f64>,
}

fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value).map(|d| d.round_dp(4))
}

fn parse_chart(symbol: &Symbol, envelope: ChartEnvelope) -> Result<MarketSnapshot, AgentError> {
    let result = envelope
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| AgentError::EmptyResponse(format!("yahoo chart for {symbol}")))?;

    let quote = result.indicators.quote.into_iter().next();
    let (closes, volumes) = quote
        .map(|q| (q.close, q.volume))
        .unwrap_or_default();

    let history: Vec<PricePoint> = result
        .timestamp
        .iter()
        .zip(closes.iter())
        .filter_map(|(ts, close)| {
            let close = to_decimal((*close)?)?;
            let timestamp = DateTime::<Utc>::from_timestamp(*ts, 0)?;
            Some(PricePoint { timestamp, close })
        })
        .collect();

    let price = result
        .meta
        .regular_market_price
        .and_then(to_decimal)
        .or_else(|| history.last().map(|p| p.close))
        .ok_or_else(|| AgentError::Parse(format!("no price for {symbol}")))?;

    let volume = result
        .meta
        .regular_market_volume
        .or_else(|| volumes.iter().rev().find_map(|v| *v))
        .unwrap_or(0);

    Ok(MarketSnapshot {
        symbol: symbol.clone(),
        price,
        volume,
        history,
        fetched_at: Utc::now(),
    })
}

fn parse_earnings(envelope: SummaryEnvelope) -> Vec<EarningsPoint> {
    envelope
        .quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .and_then(|r| r.earnings)
        .and_then(|e| e.financials_chart)
        .map(|chart| {
            chart
                .yearly
                .into_iter()
                .filter_map(|y| {
                    y.earnings.raw.map(|value| EarningsPoint {
                        period: y.date,
                        value,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl MarketDataSource for YahooMarketData {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn snapshot(
        &self,
        symbol: &Symbol,
        history_days: u32,
    ) -> Result<MarketSnapshot, AgentError> {
        let end = Utc::now();
        let start = end - chrono::Duration::days(i64::from(history_days));
        let url = self.endpoint(&["v8", "finance", "chart"], symbol);
        debug!(symbol = %symbol, history_days, "Fetching yahoo chart");

        let envelope: ChartEnvelope = self
            .get_json(
                url,
                &[
                    ("period1", start.timestamp().to_string()),
                    ("period2", end.timestamp().to_string()),
                    ("interval", "1d".to_string()),
                ],
            )
            .await?;
        parse_chart(symbol, envelope)
    }

    async fn earnings(&self, symbol: &Symbol) -> Result<Vec<EarningsPoint>, AgentError> {
        let url = self.endpoint(&["v10", "finance", "quoteSummary"], symbol);
        debug!(symbol = %symbol, "Fetching yahoo earnings");

        let envelope: SummaryEnvelope = self
            .get_json(url, &[("modules", "earnings".to_string())])
            .await?;
        Ok(parse_earnings(envelope))
    }
}
