use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest raw custom symbol accepted from an explicit symbol list.
pub const MAX_SYMBOL_LEN: usize = 12;

/// A validated ticker symbol.
///
/// Either an exchange-style ticker (`AAPL`, `005930.KS`) or a raw custom
/// symbol supplied explicitly by the caller. Always stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Accept a caller-supplied symbol. Trims and uppercases; rejects empty
    /// input, embedded whitespace and anything longer than [`MAX_SYMBOL_LEN`].
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.len() > MAX_SYMBOL_LEN
            || trimmed.chars().any(char::is_whitespace)
        {
            return None;
        }
        Some(Self(trimmed.to_ascii_uppercase()))
    }

    /// True when the symbol matches a known exchange pattern rather than
    /// being a raw custom symbol: 1-5 letters, optionally followed by a
    /// 1-3 letter exchange suffix, or a 1-6 char alphanumeric code with a suffix.
    pub fn is_exchange_pattern(&self) -> bool {
        match self.0.split_once('.') {
            None => (1..=5).contains(&self.0.len()) && self.0.chars().all(|c| c.is_ascii_uppercase()),
            Some((base, suffix)) => {
                (1..=6).contains(&base.len())
                    && base.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
                    && (1..=3).contains(&suffix.len())
                    && suffix.chars().all(|c| c.is_ascii_uppercase())
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An incoming brief request. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    pub id: Uuid,
    pub text: String,
    /// Explicit symbols, resolved ahead of anything found in `text`.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Caller-supplied holdings in units per symbol. Overrides configured holdings.
    #[serde(default)]
    pub holdings: BTreeMap<String, Decimal>,
    pub received_at: DateTime<Utc>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            symbols: Vec::new(),
            holdings: BTreeMap::new(),
            received_at: Utc::now(),
        }
    }

    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_holdings(mut self, holdings: BTreeMap<String, Decimal>) -> Self {
        self.holdings = holdings;
        self
    }
}
