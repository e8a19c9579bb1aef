use briefing_models::{ConfidenceTier, EarningsForecast, EarningsPoint, ForecastStatus, Symbol};

/// Minimum history length for a forecast.
pub const MIN_HISTORY: usize = 2;

/// Least-squares polynomial projection of earnings history.
#[derive(Debug, Clone)]
pub struct EarningsPredictor {
    horizon: usize,
}

impl EarningsPredictor {
    pub fn new(horizon: usize) -> Self {
        Self { horizon }
    }

    /// Fit over the point index and extrapolate `horizon` periods. Degree 2
    /// with four or more points, else linear.
    pub fn forecast(&self, symbol: &Symbol, history: &[EarningsPoint]) -> EarningsForecast {
        let mut historical = history.to_vec();
        historical.sort_by_key(|p| p.period);

        if historical.len() < MIN_HISTORY || self.horizon == 0 {
            return EarningsForecast::insufficient(symbol.clone(), historical);
        }

        let n = historical.len();
        let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let ys: Vec<f64> = historical.iter().map(|p| p.value).collect();

        let mut degree = if n >= 4 { 2 } else { 1 };
        let coefficients = loop {
            if let Some(c) = polyfit(&xs, &ys, degree) {
                break c;
            }
            if degree == 0 {
                return EarningsForecast::insufficient(symbol.clone(), historical);
            }
            degree -= 1;
        };

        let last = historical[n - 1];
        let step = (last.period - historical[n - 2].period).max(1);

        let predicted: Vec<EarningsPoint> = (1..=self.horizon)
            .map(|j| EarningsPoint {
                period: last.period + step * j as i32,
                value: polyval(&coefficients, (n - 1 + j) as f64),
            })
            .collect();

        let mut growth_rates = Vec::with_capacity(self.horizon);
        let mut base = last.value;
        for p in &predicted {
            growth_rates.push(pct_change(base, p.value));
            base = p.value;
        }

        let confidence = confidence_tier(&xs, &ys, &coefficients, degree);

        EarningsForecast {
            symbol: symbol.clone(),
            historical,
            predicted,
            growth_rates,
            degree,
            confidence: Some(confidence),
            status: ForecastStatus::Ok,
        }
    }
}

fn pct_change(base: f64, next: f64) -> f64 {
    if base == 0.0 {
        0.0
    } else {
        (next - base) / base.abs() * 100.0
    }
}

/// Coefficients lowest order first, or None when the system is singular.
fn polyfit(xs: &[f64], ys: &[f64], degree: usize) -> Option<Vec<f64>> {
    let m = degree + 1;
    if xs.len() < m {
        return None;
    }

    // Normal equations: (X^T X) c = X^T y, augmented.
    let mut a = vec![vec![0.0f64; m + 1]; m];
    for (x, y) in xs.iter().zip(ys) {
        let powers: Vec<f64> = (0..2 * m).map(|p| x.powi(p as i32)).collect();
        for (row, a_row) in a.iter_mut().enumerate() {
            for (col, cell) in a_row.iter_mut().take(m).enumerate() {
                *cell += powers[row + col];
            }
            a_row[m] += powers[row] * y;
        }
    }

    for col in 0..m {
        let pivot = (col..m).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        for row in 0..m {
            if row == col {
                continue;
            }
            let factor = a[row][col] / a[col][col];
            for k in col..=m {
                let delta = factor * a[col][k];
                a[row][k] -= delta;
            }
        }
    }

    Some((0..m).map(|i| a[i][m] / a[i][i]).collect())
}

fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Tier from RMSE normalized by mean absolute value. A fit with no residual
/// degrees of freedom is always low.
fn confidence_tier(xs: &[f64], ys: &[f64], coefficients: &[f64], degree: usize) -> ConfidenceTier {
    if xs.len() <= degree + 1 {
        return ConfidenceTier::Low;
    }
    let n = xs.len() as f64;
    let rmse = (xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - polyval(coefficients, *x)).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();
    let scale = ys.iter().map(|y| y.abs()).sum::<f64>() / n;

    let normalized = if scale == 0.0 {
        if rmse == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        rmse / scale
    };

    if normalized < 0.05 {
        ConfidenceTier::High
    } else if normalized < 0.15 {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(values: &[(i32, f64)]) -> Vec<EarningsPoint> {
        values
            .iter()
            .map(|&(period, value)| EarningsPoint { period, value })
            .collect()
    }

    fn sym() -> Symbol {
        Symbol::parse("TSM").unwrap()
    }

    #[test]
    fn short_history_is_insufficient() {
        let predictor = EarningsPredictor::new(2);
        for history in [vec![], points(&[(2023, 5.0)])] {
            let forecast = predictor.forecast(&sym(), &history);
            assert_eq!(forecast.status, ForecastStatus::InsufficientData);
            assert!(forecast.predicted.is_empty());
        }
    }

    #[test]
    fn linear_history_extrapolates_exactly() {
        let predictor = EarningsPredictor::new(2);
        let forecast = predictor.forecast(&sym(), &points(&[(2021, 1.0), (2022, 2.0), (2023, 3.0)]));

        assert!(forecast.is_ok());
        assert_eq!(forecast.degree, 1);
        assert_eq!(forecast.predicted.len(), 2);
        assert_eq!(forecast.predicted[0].period, 2024);
        assert_eq!(forecast.predicted[1].period, 2025);
        assert!((forecast.predicted[0].value - 4.0).abs() < 1e-9);
        assert!((forecast.predicted[1].value - 5.0).abs() < 1e-9);
        assert!((forecast.growth_rates[0] - 100.0 / 3.0).abs() < 1e-6);
        assert!((forecast.growth_rates[1] - 25.0).abs() < 1e-6);
        assert_eq!(forecast.confidence, Some(ConfidenceTier::High));
    }

    #[test]
    fn two_points_fit_with_low_confidence() {
        let predictor = EarningsPredictor::new(2);
        let forecast = predictor.forecast(&sym(), &points(&[(2022, 10.0), (2023, 12.0)]));
        assert!(forecast.is_ok());
        assert_eq!(forecast.predicted.len(), 2);
        assert!((forecast.predicted[0].value - 14.0).abs() < 1e-9);
        assert_eq!(forecast.confidence, Some(ConfidenceTier::Low));
    }

    #[test]
    fn quadratic_history_uses_degree_two() {
        let predictor = EarningsPredictor::new(2);
        let history = points(&[(2020, 1.0), (2021, 2.0), (2022, 5.0), (2023, 10.0)]);
        let forecast = predictor.forecast(&sym(), &history);

        assert_eq!(forecast.degree, 2);
        assert!((forecast.predicted[0].value - 17.0).abs() < 1e-6);
        assert!((forecast.predicted[1].value - 26.0).abs() < 1e-6);
        assert_eq!(forecast.confidence, Some(ConfidenceTier::High));
    }

    #[test]
    fn unsorted_history_and_period_gaps() {
        let predictor = EarningsPredictor::new(2);
        let history = points(&[(2024, 3.0), (2020, 1.0), (2022, 2.0)]);
        let forecast = predictor.forecast(&sym(), &history);
        assert_eq!(forecast.historical[0].period, 2020);
        assert_eq!(forecast.predicted[0].period, 2026);
        assert_eq!(forecast.predicted[1].period, 2028);
    }

    #[test]
    fn zero_base_growth_is_zero() {
        assert_eq!(pct_change(0.0, 5.0), 0.0);
        assert!((pct_change(-2.0, -1.0) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn forecast_is_idempotent() {
        let predictor = EarningsPredictor::new(2);
        let history = points(&[(2019, 3.1), (2020, 2.7), (2021, 4.4), (2022, 5.9), (2023, 5.2)]);
        assert_eq!(
            predictor.forecast(&sym(), &history),
            predictor.forecast(&sym(), &history)
        );
    }

    #[test]
    fn horizon_is_configurable() {
        let predictor = EarningsPredictor::new(4);
        let forecast = predictor.forecast(&sym(), &points(&[(2022, 1.0), (2023, 2.0)]));
        assert_eq!(forecast.predicted.len(), 4);
        assert_eq!(forecast.growth_rates.len(), 4);
    }
}
