use std::collections::BTreeMap;

use briefing_models::{
    IssueKind, MarketSnapshot, PortfolioConfig, Position, RiskReport, Stage, StageIssue, Symbol,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

pub const DEFAULT_CATEGORY: &str = "uncategorized";

/// Computes portfolio weights and category exposure.
#[derive(Debug, Clone)]
pub struct RiskAnalyzer {
    categories: BTreeMap<String, String>,
    holdings: BTreeMap<Symbol, Decimal>,
    default_units: Decimal,
}

impl RiskAnalyzer {
    pub fn new(categories: &BTreeMap<String, String>, portfolio: &PortfolioConfig) -> Self {
        let (holdings, rejected) = normalize_holdings(&portfolio.holdings);
        for (symbol, units) in rejected {
            warn!(%symbol, %units, "Ignoring negative configured holding");
        }
        let default_units = if portfolio.default_units.is_sign_negative() {
            warn!(units = %portfolio.default_units, "Negative default_units, using zero");
            Decimal::ZERO
        } else {
            portfolio.default_units
        };
        Self {
            categories: categories
                .iter()
                .map(|(k, v)| (k.trim().to_ascii_uppercase(), v.clone()))
                .collect(),
            holdings,
            default_units,
        }
    }

    pub fn category_of(&self, symbol: &Symbol) -> &str {
        self.categories
            .get(symbol.as_str())
            .map(String::as_str)
            .unwrap_or(DEFAULT_CATEGORY)
    }

    /// [`RiskAnalyzer::assess`] without the issues.
    pub fn compute(
        &self,
        snapshots: &[MarketSnapshot],
        overrides: &BTreeMap<String, Decimal>,
    ) -> RiskReport {
        self.assess(snapshots, overrides).0
    }

    /// Units come from `overrides` first, then configured holdings, then the
    /// default. Weights are market value over total, or equal when the total
    /// is not positive.
    ///
    /// Negative overrides and overrides whose market value overflows are
    /// dropped in favour of the next source and reported as analysis issues.
    /// A total that overflows saturates at `Decimal::MAX` and weights are
    /// taken from the `f64` values instead.
    pub fn assess(
        &self,
        snapshots: &[MarketSnapshot],
        overrides: &BTreeMap<String, Decimal>,
    ) -> (RiskReport, Vec<StageIssue>) {
        let mut issues = Vec::new();
        if snapshots.is_empty() {
            return (RiskReport::default(), issues);
        }
        let (overrides, rejected) = normalize_holdings(overrides);
        for (symbol, units) in rejected {
            issues.push(holding_issue(&symbol, format!("negative holding {units} ignored")));
        }

        let valued: Vec<(&MarketSnapshot, Decimal, Decimal)> = snapshots
            .iter()
            .map(|snap| {
                if let Some(&units) = overrides.get(&snap.symbol) {
                    match snap.price.checked_mul(units) {
                        Some(value) => return (snap, units, value),
                        None => issues.push(holding_issue(
                            &snap.symbol,
                            format!("holding {units} overflows market value, ignored"),
                        )),
                    }
                }
                let (units, value) = self.fallback_value(snap);
                (snap, units, value)
            })
            .collect();

        let equal_weight = 1.0 / valued.len() as f64;
        let total = valued
            .iter()
            .try_fold(Decimal::ZERO, |acc, (_, _, value)| acc.checked_add(*value));

        let weights: Vec<f64> = match total {
            Some(total) if total > Decimal::ZERO => valued
                .iter()
                .map(|(_, _, value)| (*value / total).to_f64().unwrap_or(equal_weight))
                .collect(),
            Some(_) => vec![equal_weight; valued.len()],
            None => {
                issues.push(StageIssue {
                    stage: Stage::Analysis,
                    symbol: None,
                    kind: IssueKind::Failed,
                    detail: "total market value overflows".to_string(),
                });
                let values: Vec<f64> = valued
                    .iter()
                    .map(|(_, _, value)| value.to_f64().unwrap_or(0.0))
                    .collect();
                let sum: f64 = values.iter().sum();
                values
                    .into_iter()
                    .map(|v| if sum > 0.0 { v / sum } else { equal_weight })
                    .collect()
            }
        };

        let positions: Vec<Position> = valued
            .into_iter()
            .zip(weights)
            .map(|((snap, units, market_value), weight)| Position {
                symbol: snap.symbol.clone(),
                weight,
                units,
                price: snap.price,
                market_value,
                category: self.category_of(&snap.symbol).to_string(),
            })
            .collect();

        let mut exposure_by_category: BTreeMap<String, f64> = BTreeMap::new();
        for position in &positions {
            *exposure_by_category
                .entry(position.category.clone())
                .or_default() += position.weight;
        }

        let report = RiskReport {
            positions,
            exposure_by_category,
            total_market_value: total.unwrap_or(Decimal::MAX),
        };
        (report, issues)
    }

    /// Configured units, then the default, then zero, taking the first whose
    /// market value fits.
    fn fallback_value(&self, snap: &MarketSnapshot) -> (Decimal, Decimal) {
        self.holdings
            .get(&snap.symbol)
            .copied()
            .into_iter()
            .chain([self.default_units])
            .find_map(|units| snap.price.checked_mul(units).map(|value| (units, value)))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO))
    }
}

fn holding_issue(symbol: &Symbol, detail: String) -> StageIssue {
    StageIssue {
        stage: Stage::Analysis,
        symbol: Some(symbol.clone()),
        kind: IssueKind::Failed,
        detail,
    }
}

/// Parses symbol keys, splitting off negative unit counts.
fn normalize_holdings(
    raw: &BTreeMap<String, Decimal>,
) -> (BTreeMap<Symbol, Decimal>, Vec<(Symbol, Decimal)>) {
    let mut valid = BTreeMap::new();
    let mut rejected = Vec::new();
    for (symbol, units) in raw.iter().filter_map(|(k, v)| Symbol::parse(k).map(|s| (s, *v))) {
        if units.is_sign_negative() && !units.is_zero() {
            rejected.push((symbol, units));
        } else {
            valid.insert(symbol, units);
        }
    }
    (valid, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::snapshot;
    use briefing_models::SymbolsConfig;
    use rust_decimal_macros::dec;

    fn analyzer(holdings: &[(&str, Decimal)]) -> RiskAnalyzer {
        let portfolio = PortfolioConfig {
            holdings: holdings
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            default_units: Decimal::ONE,
        };
        RiskAnalyzer::new(&SymbolsConfig::default().categories, &portfolio)
    }

    #[test]
    fn empty_input_gives_empty_report() {
        let report = analyzer(&[]).compute(&[], &BTreeMap::new());
        assert!(report.is_empty());
        assert!(report.is_normalized());
    }

    #[test]
    fn weights_follow_market_value() {
        let snaps = vec![
            snapshot("AAPL", dec!(200), &[]),
            snapshot("MSFT", dec!(400), &[]),
        ];
        let report = analyzer(&[("AAPL", dec!(3)), ("MSFT", dec!(1))]).compute(&snaps, &BTreeMap::new());

        assert_eq!(report.total_market_value, dec!(1000));
        assert!((report.weight_of(&Symbol::parse("AAPL").unwrap()).unwrap() - 0.6).abs() < 1e-12);
        assert!((report.weight_of(&Symbol::parse("MSFT").unwrap()).unwrap() - 0.4).abs() < 1e-12);
        assert!(report.is_normalized());
        assert!((report.exposure_by_category["technology"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn query_holdings_override_config() {
        let snaps = vec![snapshot("TSM", dec!(100), &[]), snapshot("NVDA", dec!(100), &[])];
        let overrides = BTreeMap::from([("tsm".to_string(), dec!(3))]);
        let report = analyzer(&[("TSM", dec!(1))]).compute(&snaps, &overrides);

        assert_eq!(report.positions[0].units, dec!(3));
        assert_eq!(report.positions[1].units, dec!(1));
        assert!((report.positions[0].weight - 0.75).abs() < 1e-12);
        assert_eq!(report.exposure_by_category.len(), 1);
        assert!(report.is_normalized());
    }

    #[test]
    fn zero_total_gives_equal_weights() {
        let snaps = vec![
            snapshot("AAPL", dec!(0), &[]),
            snapshot("ZZZ", dec!(0), &[]),
            snapshot("TSLA", dec!(0), &[]),
        ];
        let report = analyzer(&[]).compute(&snaps, &BTreeMap::new());
        for position in &report.positions {
            assert!((position.weight - 1.0 / 3.0).abs() < 1e-12);
        }
        assert!(report.is_normalized());
        assert_eq!(report.positions[1].category, DEFAULT_CATEGORY);
    }

    #[test]
    fn compute_is_deterministic() {
        let snaps = vec![
            snapshot("AAPL", dec!(191.37), &[]),
            snapshot("005930.KS", dec!(71200), &[]),
            snapshot("TSM", dec!(142.11), &[]),
        ];
        let a = analyzer(&[]).compute(&snaps, &BTreeMap::new());
        let b = analyzer(&[]).compute(&snaps, &BTreeMap::new());
        assert_eq!(a, b);
        assert!(a.is_normalized());
        assert_eq!(a.positions[1].category, "semiconductors");
    }

    #[test]
    fn overflowing_override_falls_back_with_issue() {
        let snaps = vec![snapshot("AAPL", dec!(190), &[]), snapshot("MSFT", dec!(400), &[])];
        let overrides = BTreeMap::from([(
            "AAPL".to_string(),
            Decimal::from_str_exact("1000000000000000000000000000").unwrap(),
        )]);
        let (report, issues) = analyzer(&[("AAPL", dec!(2))]).assess(&snaps, &overrides);

        assert_eq!(report.positions[0].units, dec!(2));
        assert_eq!(report.total_market_value, dec!(780));
        assert!(report.is_normalized());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].stage, Stage::Analysis);
        assert_eq!(issues[0].symbol, Symbol::parse("AAPL"));
    }

    #[test]
    fn overflowing_total_saturates_and_stays_normalized() {
        let huge = Decimal::MAX / dec!(2);
        let snaps = vec![
            snapshot("AAPL", dec!(1), &[]),
            snapshot("MSFT", dec!(1), &[]),
            snapshot("TSM", dec!(1), &[]),
        ];
        let overrides = BTreeMap::from([
            ("AAPL".to_string(), huge),
            ("MSFT".to_string(), huge),
            ("TSM".to_string(), huge),
        ]);
        let (report, issues) = analyzer(&[]).assess(&snaps, &overrides);

        assert_eq!(report.total_market_value, Decimal::MAX);
        assert!(report.is_normalized());
        for position in &report.positions {
            assert!((position.weight - 1.0 / 3.0).abs() < 1e-9);
        }
        assert!(issues.iter().any(|i| i.symbol.is_none()));
    }

    #[test]
    fn negative_override_is_rejected() {
        let snaps = vec![snapshot("AAPL", dec!(100), &[]), snapshot("MSFT", dec!(100), &[])];
        let overrides = BTreeMap::from([
            ("AAPL".to_string(), dec!(-3)),
            ("MSFT".to_string(), dec!(4)),
        ]);
        let (report, issues) = analyzer(&[]).assess(&snaps, &overrides);

        assert_eq!(report.positions[0].units, dec!(1));
        assert!((report.positions[0].weight - 0.2).abs() < 1e-12);
        assert!((report.positions[1].weight - 0.8).abs() < 1e-12);
        for position in &report.positions {
            assert!((0.0..=1.0).contains(&position.weight));
        }
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].symbol, Symbol::parse("AAPL"));
        assert!(issues[0].detail.contains("negative"));
    }

    #[test]
    fn negative_configured_holding_is_ignored() {
        let snaps = vec![snapshot("AAPL", dec!(100), &[]), snapshot("MSFT", dec!(100), &[])];
        let report = analyzer(&[("AAPL", dec!(-5)), ("MSFT", dec!(3))]).compute(&snaps, &BTreeMap::new());

        assert_eq!(report.positions[0].units, dec!(1));
        assert!((report.positions[0].weight - 0.25).abs() < 1e-12);
        assert!(report.is_normalized());
    }
}
