use briefing_models::{
    ChartKind, ChartPayload, ChartPoint, ChartSeries, EarningsForecast, EarningsPoint,
    MarketSnapshot, RiskReport,
};
use rust_decimal::prelude::ToPrimitive;

/// Builds chart-ready series from whatever stages succeeded.
pub struct ChartBuilder;

impl ChartBuilder {
    pub fn build(
        snapshots: &[MarketSnapshot],
        forecasts: &[EarningsForecast],
        risk: &RiskReport,
    ) -> Vec<ChartPayload> {
        let mut charts: Vec<ChartPayload> = snapshots
            .iter()
            .filter(|s| !s.history.is_empty())
            .map(Self::price_history)
            .collect();
        charts.extend(forecasts.iter().filter(|f| f.is_ok()).map(Self::earnings));
        if let Some(allocation) = Self::allocation(risk) {
            charts.push(allocation);
        }
        charts
    }

    pub fn price_history(snapshot: &MarketSnapshot) -> ChartPayload {
        ChartPayload {
            kind: ChartKind::PriceHistory,
            title: format!("{} price history", snapshot.symbol),
            series: vec![ChartSeries {
                name: snapshot.symbol.to_string(),
                points: snapshot
                    .history
                    .iter()
                    .map(|p| ChartPoint {
                        x: p.timestamp.format("%Y-%m-%d").to_string(),
                        y: p.close.to_f64().unwrap_or_default(),
                    })
                    .collect(),
            }],
        }
    }

    pub fn earnings(forecast: &EarningsForecast) -> ChartPayload {
        let to_points = |points: &[EarningsPoint]| -> Vec<ChartPoint> {
            points
                .iter()
                .map(|p| ChartPoint {
                    x: p.period.to_string(),
                    y: p.value,
                })
                .collect()
        };
        ChartPayload {
            kind: ChartKind::Earnings,
            title: format!("{} earnings forecast", forecast.symbol),
            series: vec![
                ChartSeries {
                    name: "historical".to_string(),
                    points: to_points(&forecast.historical),
                },
                ChartSeries {
                    name: "predicted".to_string(),
                    points: to_points(&forecast.predicted),
                },
            ],
        }
    }

    /// Weights as percentages. None for an empty report.
    pub fn allocation(risk: &RiskReport) -> Option<ChartPayload> {
        if risk.is_empty() {
            return None;
        }
        Some(ChartPayload {
            kind: ChartKind::Allocation,
            title: "Portfolio allocation".to_string(),
            series: vec![ChartSeries {
                name: "weight_pct".to_string(),
                points: risk
                    .positions
                    .iter()
                    .map(|p| ChartPoint {
                        x: p.symbol.to_string(),
                        y: p.weight * 100.0,
                    })
                    .collect(),
            }],
        })
    }
}
