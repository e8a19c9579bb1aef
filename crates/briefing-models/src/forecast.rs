use serde::{Deserialize, Serialize};

use crate::market::EarningsPoint;
use crate::query::Symbol;

/// Qualitative fit quality. Informational only, not a statistical interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ForecastStatus {
    Ok,
    InsufficientData,
}

/// Polynomial projection of a symbol's earnings history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EarningsForecast {
    pub symbol: Symbol,
    pub historical: Vec<EarningsPoint>,
    pub predicted: Vec<EarningsPoint>,
    /// Percent change: last historical -> first predicted, then between predictions.
    pub growth_rates: Vec<f64>,
    /// Polynomial degree used, 0 when no fit was made.
    pub degree: usize,
    pub confidence: Option<ConfidenceTier>,
    pub status: ForecastStatus,
}

impl EarningsForecast {
    /// An empty forecast flagged as insufficient data.
    pub fn insufficient(symbol: Symbol, historical: Vec<EarningsPoint>) -> Self {
        Self {
            symbol,
            historical,
            predicted: Vec::new(),
            growth_rates: Vec::new(),
            degree: 0,
            confidence: None,
            status: ForecastStatus::InsufficientData,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ForecastStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_forecast_is_empty() {
        let forecast = EarningsForecast::insufficient(
            Symbol::parse("NVDA").unwrap(),
            vec![EarningsPoint {
                period: 2024,
                value: 2.1,
            }],
        );
        assert!(!forecast.is_ok());
        assert!(forecast.predicted.is_empty());
        assert!(forecast.growth_rates.is_empty());
        assert_eq!(forecast.confidence, None);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ForecastStatus::InsufficientData).unwrap(),
            "\"insufficient_data\""
        );
    }
}
