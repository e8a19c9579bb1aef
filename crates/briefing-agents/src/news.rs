use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use briefing_models::{
    IssueKind, MarketSnapshot, NewsDigest, NewsItem, NewsPath, Stage, StageIssue, Symbol,
};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{with_timeout, AgentError};

/// Source of recent articles for a symbol. Mockable for testing.
#[async_trait]
pub trait NewsSource: Send + Sync {
    fn name(&self) -> &str;

    async fn articles(&self, symbol: &Symbol) -> Result<Vec<NewsItem>, AgentError>;

    fn is_quota_error(&self, err: &AgentError) -> bool {
        err.is_rate_limited()
    }
}

/// News client output plus the issue that forced a fallback, if any.
#[derive(Debug, Clone)]
pub struct NewsOutcome {
    pub digest: NewsDigest,
    pub issue: Option<StageIssue>,
}

/// Fetches news with a timeout and falls back to synthetic summaries built
/// from market statistics when the provider fails or returns nothing.
#[derive(Clone)]
pub struct NewsClient {
    source: Arc<dyn NewsSource>,
    timeout: Duration,
    max_articles: usize,
}

impl NewsClient {
    pub fn new(source: Arc<dyn NewsSource>, timeout: Duration, max_articles: usize) -> Self {
        Self {
            source,
            timeout,
            max_articles,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_quota_error(&self, err: &AgentError) -> bool {
        self.source.is_quota_error(err)
    }

    /// Provider articles only, newest first and capped.
    pub async fn articles(&self, symbol: &Symbol) -> Result<Vec<NewsItem>, AgentError> {
        let mut items = with_timeout(self.timeout, self.source.articles(symbol)).await?;
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        items.truncate(self.max_articles);
        Ok(items)
    }

    /// Turn a provider result into a digest, synthesizing fallback items when
    /// the provider failed or came back empty.
    pub fn resolve(
        &self,
        symbol: &Symbol,
        display_name: &str,
        fetched: Result<Vec<NewsItem>, AgentError>,
        snapshot: Option<&MarketSnapshot>,
    ) -> NewsOutcome {
        let (kind, detail, provider_error) = match fetched {
            Ok(items) if !items.is_empty() => {
                return NewsOutcome {
                    digest: NewsDigest {
                        symbol: symbol.clone(),
                        path: NewsPath::Provider,
                        items,
                        provider_error: None,
                    },
                    issue: None,
                };
            }
            Ok(_) => (
                IssueKind::Empty,
                format!("{} returned no articles", self.source.name()),
                None,
            ),
            Err(e) => {
                let kind = e.issue_kind(self.source.is_quota_error(&e));
                let message = e.to_string();
                (kind, message.clone(), Some(message))
            }
        };

        warn!(symbol = %symbol, kind = ?kind, detail = %detail, "News provider degraded, using fallback");

        NewsOutcome {
            digest: NewsDigest {
                symbol: symbol.clone(),
                path: NewsPath::Fallback,
                items: fallback_items(symbol, display_name, snapshot),
                provider_error,
            },
            issue: Some(StageIssue {
                stage: Stage::News,
                symbol: Some(symbol.clone()),
                kind,
                detail,
            }),
        }
    }

    pub async fn fetch(
        &self,
        symbol: &Symbol,
        display_name: &str,
        snapshot: Option<&MarketSnapshot>,
    ) -> NewsOutcome {
        let fetched = self.articles(symbol).await;
        self.resolve(symbol, display_name, fetched, snapshot)
    }
}

/// Synthetic news for a symbol. Uses price statistics when a snapshot is
/// available, otherwise a generic sentence.
pub fn fallback_items(
    symbol: &Symbol,
    display_name: &str,
    snapshot: Option<&MarketSnapshot>,
) -> Vec<NewsItem> {
    let (headline, body) = match snapshot {
        Some(snap) => {
            let mut body = format!(
                "{display_name} ({symbol}) last traded at ${:.2} on volume of {}.",
                snap.price, snap.volume
            );
            if let Some(pct) = snap.change_pct() {
                let direction = if pct >= 0.0 { "up" } else { "down" };
                body.push_str(&format!(
                    " The stock is {direction} {:.2}% over the last {} sessions.",
                    pct.abs(),
                    snap.history.len()
                ));
            }
            if let Some((low, high)) = snap.range() {
                body.push_str(&format!(
                    " It traded between ${low:.2} and ${high:.2} in that window."
                ));
            }
            (format!("{display_name} ({symbol}) market summary"), body)
        }
        None => (
            format!("{display_name} ({symbol}) update"),
            format!("{display_name} continues to be a key player in the technology market."),
        ),
    };

    vec![NewsItem {
        symbol: symbol.clone(),
        headline,
        body,
        source: "market_statistics".to_string(),
        url: None,
        published_at: Utc::now(),
        is_fallback: true,
    }]
}

/// Finnhub `company-news` endpoint.
pub struct FinnhubNews {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    lookback_days: u32,
}

#[derive(Debug, Deserialize)]
struct FinnhubArticle {
    #[serde(default)]
    datetime: i64,
    #[serde(default)]
    headline: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
}

impl FinnhubNews {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        lookback_days: u32,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            lookback_days,
        })
    }

    fn to_item(symbol: &Symbol, article: FinnhubArticle) -> Option<NewsItem> {
        if article.headline.trim().is_empty() {
            return None;
        }
        Some(NewsItem {
            symbol: symbol.clone(),
            headline: article.headline,
            body: article.summary,
            source: article.source,
            url: (!article.url.is_empty()).then_some(article.url),
            published_at: DateTime::<Utc>::from_timestamp(article.datetime, 0)
                .unwrap_or_else(Utc::now),
            is_fallback: false,
        })
    }
}

#[async_trait]
impl NewsSource for FinnhubNews {
    fn name(&self) -> &str {
        "finnhub"
    }

    async fn articles(&self, symbol: &Symbol) -> Result<Vec<NewsItem>, AgentError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AgentError::Config("finnhub API key not set".to_string()))?;

        let to = Utc::now().date_naive();
        let from = to - chrono::Duration::days(i64::from(self.lookback_days));
        debug!(symbol = %symbol, %from, %to, "Fetching finnhub company news");

        let response = self
            .client
            .get(format!("{}/company-news", self.base_url))
            .query(&[
                ("symbol", symbol.to_string()),
                ("from", from.to_string()),
                ("to", to.to_string()),
                ("token", api_key.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AgentError::from_response("finnhub", response).await);
        }

        let articles: Vec<FinnhubArticle> = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("finnhub response: {e}")))?;

        Ok(articles
            .into_iter()
            .filter_map(|a| Self::to_item(symbol, a))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{snapshot, StaticNews};
    use rust_decimal_macros::dec;

    fn client(source: StaticNews) -> NewsClient {
        NewsClient::new(Arc::new(source), Duration::from_secs(1), 5)
    }

    #[tokio::test]
    async fn provider_articles_take_provider_path() {
        let news = client(StaticNews::new().with_article("TSM", "TSMC Earnings", "Strong quarter"));
        let symbol = Symbol::parse("TSM").unwrap();
        let outcome = news.fetch(&symbol, "Taiwan Semiconductor", None).await;
        assert_eq!(outcome.digest.path, NewsPath::Provider);
        assert!(outcome.issue.is_none());
        assert!(!outcome.digest.items[0].is_fallback);
    }

    #[tokio::test]
    async fn empty_provider_falls_back_with_snapshot_stats() {
        let news = client(StaticNews::new());
        let symbol = Symbol::parse("TSM").unwrap();
        let snap = snapshot("TSM", dec!(110), &[dec!(100), dec!(105), dec!(110)]);
        let outcome = news.fetch(&symbol, "Taiwan Semiconductor", Some(&snap)).await;

        assert!(outcome.digest.is_fallback());
        assert!(outcome.digest.provider_error.is_none());
        let issue = outcome.issue.unwrap();
        assert_eq!(issue.kind, IssueKind::Empty);
        assert_eq!(issue.stage, Stage::News);

        let item = &outcome.digest.items[0];
        assert!(item.is_fallback);
        assert!(item.body.contains("$110.00"));
        assert!(item.body.contains("up 10.00%"));
    }

    #[tokio::test]
    async fn quota_error_falls_back_and_is_classified() {
        let news = client(StaticNews::new().quota_exhausted());
        let symbol = Symbol::parse("AAPL").unwrap();
        let outcome = news.fetch(&symbol, "Apple", None).await;

        assert!(outcome.digest.is_fallback());
        assert!(outcome.digest.provider_error.is_some());
        assert_eq!(outcome.issue.unwrap().kind, IssueKind::QuotaExceeded);
        assert_eq!(
            outcome.digest.items[0].body,
            "Apple continues to be a key player in the technology market."
        );
    }

    #[tokio::test]
    async fn articles_are_capped() {
        let mut source = StaticNews::new();
        for i in 0..8 {
            source = source.with_article("NVDA", &format!("Headline {i}"), "body");
        }
        let news = NewsClient::new(Arc::new(source), Duration::from_secs(1), 3);
        let items = news.articles(&Symbol::parse("NVDA").unwrap()).await.unwrap();
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn finnhub_article_without_headline_is_dropped() {
        let symbol = Symbol::parse("AAPL").unwrap();
        let article = FinnhubArticle {
            datetime: 1_700_000_000,
            headline: "  ".to_string(),
            source: "Reuters".to_string(),
            summary: String::new(),
            url: String::new(),
        };
        assert!(FinnhubNews::to_item(&symbol, article).is_none());
    }

    #[tokio::test]
    async fn finnhub_without_key_is_config_error() {
        let finnhub =
            FinnhubNews::new("https://finnhub.io/api/v1", None, 7, Duration::from_secs(5)).unwrap();
        let err = finnhub
            .articles(&Symbol::parse("AAPL").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }
}
