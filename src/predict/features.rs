//! Feature engineering over the ML-ready subset.

use crate::error::{AnalysisError, Result};
use crate::schema::{KeyMetrics, MlReadyData};

/// The numeric inputs the forecasters and risk scoring work from. Years with
/// null revenue are dropped here; they were never usable for fitting.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    /// (year, revenue) ascending, nulls removed.
    pub revenue_series: Vec<(i32, f64)>,
    /// (year, net income) ascending, nulls removed.
    pub net_income_series: Vec<(i32, f64)>,
    /// Year-over-year revenue growth in percent, keyed by the later year.
    pub growth_deltas: Vec<(i32, f64)>,
    pub key_metrics: KeyMetrics,
    /// Net margin in percent for the latest year with both figures.
    pub profit_margin: Option<f64>,
    /// 0-100 composite; see `health_score`.
    pub health_score: f64,
    pub currency: String,
    pub industry: Option<String>,
}

impl FeatureSet {
    pub fn build(data: &MlReadyData) -> Result<Self> {
        // Corrupted ML-ready JSON (non-finite numbers) is an internal fault,
        // not an insufficient-data outcome.
        for yv in data
            .revenue_history
            .iter()
            .chain(data.net_income_history.iter())
        {
            if let Some(v) = yv.value {
                if !v.is_finite() {
                    return Err(AnalysisError::PredictionError(format!(
                        "non-finite value {} for year {} in ML-ready data",
                        v, yv.year
                    )));
                }
            }
        }

        let mut revenue_series: Vec<(i32, f64)> = data
            .revenue_history
            .iter()
            .filter_map(|yv| yv.value.map(|v| (yv.year, v)))
            .collect();
        revenue_series.sort_by_key(|(year, _)| *year);

        let mut net_income_series: Vec<(i32, f64)> = data
            .net_income_history
            .iter()
            .filter_map(|yv| yv.value.map(|v| (yv.year, v)))
            .collect();
        net_income_series.sort_by_key(|(year, _)| *year);

        let growth_deltas = growth_deltas(&revenue_series);

        let profit_margin = match (revenue_series.last(), net_income_series.last()) {
            (Some((ry, revenue)), Some((ny, income))) if ry == ny && *revenue != 0.0 => {
                Some(income / revenue * 100.0)
            }
            _ => None,
        };

        let latest_growth = growth_deltas.last().map(|(_, g)| *g);
        let health_score = health_score(&data.key_metrics, latest_growth, profit_margin);

        Ok(Self {
            revenue_series,
            net_income_series,
            growth_deltas,
            key_metrics: data.key_metrics.clone(),
            profit_margin,
            health_score,
            currency: data.currency.clone().unwrap_or_else(|| "USD".to_string()),
            industry: data.industry.clone(),
        })
    }

    pub fn usable_years(&self) -> usize {
        self.revenue_series.len()
    }

    pub fn latest_revenue(&self) -> Option<(i32, f64)> {
        self.revenue_series.last().copied()
    }

    pub fn historical_growth(&self) -> Option<f64> {
        self.growth_deltas.last().map(|(_, g)| *g)
    }

    /// Sample standard deviation of growth deltas, floored at 2 percentage
    /// points so a flat two-year history does not collapse the intervals.
    pub fn growth_volatility(&self) -> f64 {
        let n = self.growth_deltas.len();
        if n < 2 {
            let fallback = self
                .historical_growth()
                .map(|g| g.abs() * 0.2)
                .unwrap_or(5.0);
            return fallback.max(2.0);
        }
        let mean = self.growth_deltas.iter().map(|(_, g)| g).sum::<f64>() / n as f64;
        let var = self
            .growth_deltas
            .iter()
            .map(|(_, g)| (g - mean).powi(2))
            .sum::<f64>()
            / (n as f64 - 1.0);
        var.sqrt().max(2.0)
    }
}

pub fn growth_deltas(revenue_series: &[(i32, f64)]) -> Vec<(i32, f64)> {
    revenue_series
        .windows(2)
        .filter_map(|w| {
            let (_, prev) = w[0];
            let (year, curr) = w[1];
            if prev != 0.0 {
                Some((year, (curr - prev) / prev.abs() * 100.0))
            } else {
                None
            }
        })
        .collect()
}

/// Composite financial health score, 0-100, neutral at 50. Bands follow the
/// ROE / leverage / growth / margin scorecard of the upstream predictor.
pub fn health_score(
    metrics: &KeyMetrics,
    revenue_growth: Option<f64>,
    profit_margin: Option<f64>,
) -> f64 {
    let mut score: f64 = 50.0;

    if let Some(roe) = metrics.roe {
        score += match roe {
            r if r > 25.0 => 15.0,
            r if r > 20.0 => 12.0,
            r if r > 15.0 => 10.0,
            r if r > 10.0 => 5.0,
            r if r < 0.0 => -15.0,
            r if r < 5.0 => -10.0,
            _ => 0.0,
        };
    }

    if let Some(debt) = metrics.debt_to_equity {
        score += match debt {
            d if d < 0.3 => 10.0,
            d if d < 0.5 => 8.0,
            d if d < 1.0 => 5.0,
            d if d > 3.0 => -15.0,
            d if d > 2.0 => -10.0,
            d if d > 1.5 => -5.0,
            _ => 0.0,
        };
    }

    if let Some(growth) = revenue_growth {
        score += match growth {
            g if g > 30.0 => 15.0,
            g if g > 20.0 => 12.0,
            g if g > 10.0 => 10.0,
            g if g > 5.0 => 5.0,
            g if g < -5.0 => -15.0,
            g if g < 0.0 => -10.0,
            _ => 0.0,
        };
    }

    if let Some(margin) = profit_margin {
        score += match margin {
            m if m > 25.0 => 10.0,
            m if m > 20.0 => 8.0,
            m if m > 15.0 => 6.0,
            m if m > 10.0 => 3.0,
            m if m < 0.0 => -10.0,
            m if m < 5.0 => -5.0,
            _ => 0.0,
        };
    }

    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::YearValue;

    fn ml_data(revenue: &[(i32, Option<f64>)]) -> MlReadyData {
        MlReadyData {
            company_name: "Acme".to_string(),
            revenue_history: revenue
                .iter()
                .map(|(year, value)| YearValue {
                    year: *year,
                    value: *value,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn null_years_are_dropped_not_zeroed() {
        let data = ml_data(&[(2021, Some(100.0)), (2022, None), (2023, Some(120.0))]);
        let features = FeatureSet::build(&data).unwrap();
        assert_eq!(features.usable_years(), 2);
        assert_eq!(features.latest_revenue(), Some((2023, 120.0)));
    }

    #[test]
    fn growth_delta_is_exact_for_two_years() {
        let data = ml_data(&[(2022, Some(100.0)), (2023, Some(120.0))]);
        let features = FeatureSet::build(&data).unwrap();
        let growth = features.historical_growth().unwrap();
        assert!((growth - 20.0).abs() < 1e-9);
    }

    #[test]
    fn non_finite_values_are_internal_faults() {
        let data = ml_data(&[(2023, Some(f64::NAN))]);
        let err = FeatureSet::build(&data).unwrap_err();
        assert!(matches!(err, AnalysisError::PredictionError(_)));
    }

    #[test]
    fn health_score_stays_clamped() {
        let strong = KeyMetrics {
            roe: Some(30.0),
            debt_to_equity: Some(0.1),
            ..Default::default()
        };
        let score = health_score(&strong, Some(40.0), Some(30.0));
        assert!(score <= 100.0 && score > 80.0);

        let weak = KeyMetrics {
            roe: Some(-5.0),
            debt_to_equity: Some(4.0),
            ..Default::default()
        };
        let score = health_score(&weak, Some(-20.0), Some(-10.0));
        assert!((0.0..20.0).contains(&score));
    }

    #[test]
    fn volatility_floor_applies() {
        let data = ml_data(&[(2022, Some(100.0)), (2023, Some(100.0))]);
        let features = FeatureSet::build(&data).unwrap();
        assert!(features.growth_volatility() >= 2.0);
    }
}
