use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::Symbol;

/// A news article or, when `is_fallback` is set, a synthetic summary built
/// from market statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub symbol: Symbol,
    pub headline: String,
    pub body: String,
    pub source: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub is_fallback: bool,
}

impl NewsItem {
    /// Text used for embedding: headline and body joined.
    pub fn chunk_text(&self) -> String {
        if self.body.is_empty() {
            self.headline.clone()
        } else {
            format!("{}\n{}", self.headline, self.body)
        }
    }
}

/// Which branch the news client took for a symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NewsPath {
    /// Articles came from the news provider.
    Provider,
    /// The provider failed or returned nothing; items are synthetic.
    Fallback,
}

/// News client output for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsDigest {
    pub symbol: Symbol,
    pub path: NewsPath,
    pub items: Vec<NewsItem>,
    /// Provider error that forced the fallback, if any.
    pub provider_error: Option<String>,
}

impl NewsDigest {
    pub fn is_fallback(&self) -> bool {
        self.path == NewsPath::Fallback
    }
}
