use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::query::Symbol;

/// A single close in a price history series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub close: Decimal,
}

/// Quote plus recent history for one symbol, fetched fresh per request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub symbol: Symbol,
    pub price: Decimal,
    pub volume: u64,
    /// Oldest first.
    pub history: Vec<PricePoint>,
    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Percentage change from the first close in `history` to `price`.
    /// None when history is empty or starts at zero.
    pub fn change_pct(&self) -> Option<f64> {
        let first = self.history.first()?.close;
        if first.is_zero() {
            return None;
        }
        ((self.price - first) / first * Decimal::ONE_HUNDRED).to_f64()
    }

    /// Lowest and highest close over the history window.
    pub fn range(&self) -> Option<(Decimal, Decimal)> {
        let mut closes = self.history.iter().map(|p| p.close);
        let first = closes.next()?;
        Some(closes.fold((first, first), |(lo, hi), c| (lo.min(c), hi.max(c))))
    }
}

/// One reported earnings figure. `period` is typically a fiscal year.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EarningsPoint {
    pub period: i32,
    pub value: f64,
}
