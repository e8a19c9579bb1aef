use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::query::Symbol;

/// Tolerance used when checking that weights sum to one.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

/// A single holding in the risk report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: Symbol,
    /// Fraction of total market value, 0.0 to 1.0.
    pub weight: f64,
    pub units: Decimal,
    pub price: Decimal,
    pub market_value: Decimal,
    pub category: String,
}

/// Portfolio exposure over the symbols whose market data succeeded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RiskReport {
    /// Extraction order.
    pub positions: Vec<Position>,
    /// Category -> summed weight.
    pub exposure_by_category: BTreeMap<String, f64>,
    pub total_market_value: Decimal,
}

impl RiskReport {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.positions.iter().map(|p| p.weight).sum()
    }

    pub fn weight_of(&self, symbol: &Symbol) -> Option<f64> {
        self.positions
            .iter()
            .find(|p| &p.symbol == symbol)
            .map(|p| p.weight)
    }

    /// Weights sum to one within [`WEIGHT_TOLERANCE`], or the report is empty.
    pub fn is_normalized(&self) -> bool {
        self.is_empty() || (self.total_weight() - 1.0).abs() <= WEIGHT_TOLERANCE
    }
}
