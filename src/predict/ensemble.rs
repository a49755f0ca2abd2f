//! The forecaster ensemble.
//!
//! Three strategies each produce a next-year revenue growth estimate from the
//! historical series; the blend is a weighted average and the confidence
//! interval comes from the spread between members. A strategy abstains (returns
//! `None`) when the series is too short for it rather than guessing.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{AnalysisError, Result};
use crate::predict::features::FeatureSet;

pub trait Forecaster: Send + Sync {
    fn name(&self) -> &'static str;

    /// Next-year revenue growth estimate in percent, or `None` if this
    /// strategy cannot be applied to the series.
    fn forecast_growth(&self, features: &FeatureSet, fit_deltas: &[(i32, f64)]) -> Option<f64>;
}

/// Ordinary least squares on the revenue levels; growth is the fitted line's
/// next step relative to the latest actual.
pub struct LinearTrendForecaster;

impl Forecaster for LinearTrendForecaster {
    fn name(&self) -> &'static str {
        "linear_trend"
    }

    fn forecast_growth(&self, features: &FeatureSet, _fit_deltas: &[(i32, f64)]) -> Option<f64> {
        let series = &features.revenue_series;
        if series.len() < 2 {
            return None;
        }
        let n = series.len() as f64;
        let mean_x = series.iter().map(|(y, _)| *y as f64).sum::<f64>() / n;
        let mean_y = series.iter().map(|(_, v)| v).sum::<f64>() / n;
        let mut num = 0.0;
        let mut den = 0.0;
        for (year, value) in series {
            let dx = *year as f64 - mean_x;
            num += dx * (value - mean_y);
            den += dx * dx;
        }
        if den == 0.0 {
            return None;
        }
        let slope = num / den;
        let intercept = mean_y - slope * mean_x;
        let (last_year, last_value) = *series.last()?;
        if last_value == 0.0 {
            return None;
        }
        let predicted = intercept + slope * (last_year as f64 + 1.0);
        Some((predicted - last_value) / last_value.abs() * 100.0)
    }
}

/// Holt double exponential smoothing on revenue levels. Reacts faster to a
/// recent change of direction than the OLS fit does.
pub struct ExponentialSmoothingForecaster {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for ExponentialSmoothingForecaster {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta: 0.3,
        }
    }
}

impl Forecaster for ExponentialSmoothingForecaster {
    fn name(&self) -> &'static str {
        "exponential_smoothing"
    }

    fn forecast_growth(&self, features: &FeatureSet, _fit_deltas: &[(i32, f64)]) -> Option<f64> {
        let series = &features.revenue_series;
        if series.len() < 2 {
            return None;
        }
        let mut level = series[0].1;
        let mut trend = series[1].1 - series[0].1;
        for (_, value) in &series[1..] {
            let prev_level = level;
            level = self.alpha * value + (1.0 - self.alpha) * (level + trend);
            trend = self.beta * (level - prev_level) + (1.0 - self.beta) * trend;
        }
        if level == 0.0 {
            return None;
        }
        Some(trend / level.abs() * 100.0)
    }
}

/// Recency-weighted average of the screened growth deltas. The most recent
/// delta carries the largest weight.
pub struct MomentumForecaster;

impl Forecaster for MomentumForecaster {
    fn name(&self) -> &'static str {
        "growth_momentum"
    }

    fn forecast_growth(&self, _features: &FeatureSet, fit_deltas: &[(i32, f64)]) -> Option<f64> {
        if fit_deltas.is_empty() {
            return None;
        }
        let mut weighted = 0.0;
        let mut total = 0.0;
        for (i, (_, growth)) in fit_deltas.iter().enumerate() {
            let w = (i + 1) as f64;
            weighted += w * growth;
            total += w;
        }
        Some(weighted / total)
    }
}

#[derive(Debug, Clone)]
pub struct EnsembleOutcome {
    pub predicted_growth: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    /// (strategy name, estimate) for every member that produced one.
    pub members: Vec<(&'static str, f64)>,
}

pub struct Ensemble {
    forecasters: Vec<Box<dyn Forecaster>>,
    weights: [f64; 3],
    confidence_level: f64,
}

impl Ensemble {
    pub fn new(weights: [f64; 3], confidence_level: f64) -> Self {
        Self {
            forecasters: vec![
                Box::new(LinearTrendForecaster),
                Box::new(ExponentialSmoothingForecaster::default()),
                Box::new(MomentumForecaster),
            ],
            weights,
            confidence_level,
        }
    }

    /// Blends the member estimates. The interval half-width is the normal
    /// quantile at the configured confidence level applied to the larger of
    /// member disagreement and historical growth volatility, so agreement
    /// between strategies on a noisy series still yields a wide interval.
    pub fn blend(&self, features: &FeatureSet, fit_deltas: &[(i32, f64)]) -> Result<EnsembleOutcome> {
        let mut members = Vec::new();
        let mut member_weights = Vec::new();
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for (forecaster, weight) in self.forecasters.iter().zip(self.weights) {
            if let Some(estimate) = forecaster.forecast_growth(features, fit_deltas) {
                if !estimate.is_finite() {
                    return Err(AnalysisError::PredictionError(format!(
                        "{} produced a non-finite growth estimate",
                        forecaster.name()
                    )));
                }
                members.push((forecaster.name(), estimate));
                member_weights.push(weight);
                weighted += weight * estimate;
                total_weight += weight;
            }
        }
        if members.is_empty() || total_weight == 0.0 {
            return Err(AnalysisError::PredictionError(
                "no forecaster could be applied to the series".to_string(),
            ));
        }
        let predicted = weighted / total_weight;

        let spread = if members.len() > 1 {
            let var = members
                .iter()
                .zip(&member_weights)
                .map(|(&(_, est), weight)| weight * (est - predicted).powi(2))
                .sum::<f64>()
                / total_weight;
            var.sqrt()
        } else {
            0.0
        };
        let sigma = spread.max(features.growth_volatility());

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| AnalysisError::PredictionError(format!("normal quantile: {e}")))?;
        let z = normal.inverse_cdf(0.5 + self.confidence_level / 2.0);
        let half_width = z * sigma;

        Ok(EnsembleOutcome {
            predicted_growth: predicted,
            confidence_lower: predicted - half_width,
            confidence_upper: predicted + half_width,
            members,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MlReadyData, YearValue};

    fn features(revenue: &[(i32, f64)]) -> FeatureSet {
        let data = MlReadyData {
            company_name: "Acme".to_string(),
            revenue_history: revenue
                .iter()
                .map(|(year, value)| YearValue {
                    year: *year,
                    value: Some(*value),
                })
                .collect(),
            ..Default::default()
        };
        FeatureSet::build(&data).unwrap()
    }

    #[test]
    fn linear_trend_recovers_constant_step() {
        let f = features(&[(2020, 100.0), (2021, 110.0), (2022, 120.0), (2023, 130.0)]);
        let growth = LinearTrendForecaster
            .forecast_growth(&f, &f.growth_deltas)
            .unwrap();
        // Next point on the fitted line is 140 against a latest of 130.
        assert!((growth - (10.0 / 130.0 * 100.0)).abs() < 1e-6);
    }

    #[test]
    fn momentum_weights_recent_deltas_heavier() {
        let f = features(&[(2021, 100.0), (2022, 110.0), (2023, 132.0)]);
        // Deltas are 10% then 20%; weights 1 and 2.
        let growth = MomentumForecaster
            .forecast_growth(&f, &f.growth_deltas)
            .unwrap();
        assert!((growth - (10.0 + 40.0) / 3.0).abs() < 1e-6);
    }

    #[test]
    fn blend_orders_the_interval() {
        let f = features(&[(2020, 100.0), (2021, 112.0), (2022, 121.0), (2023, 138.0)]);
        let ensemble = Ensemble::new([1.0, 1.0, 1.0], 0.90);
        let outcome = ensemble.blend(&f, &f.growth_deltas).unwrap();
        assert!(outcome.confidence_lower < outcome.predicted_growth);
        assert!(outcome.predicted_growth < outcome.confidence_upper);
        assert_eq!(outcome.members.len(), 3);
    }

    #[test]
    fn single_year_series_is_an_error_for_the_ensemble() {
        let f = features(&[(2023, 100.0)]);
        let ensemble = Ensemble::new([1.0, 1.0, 1.0], 0.90);
        assert!(ensemble.blend(&f, &f.growth_deltas).is_err());
    }

    #[test]
    fn two_year_series_straddles_observed_growth() {
        let f = features(&[(2022, 100.0), (2023, 120.0)]);
        let ensemble = Ensemble::new([1.0, 1.0, 1.0], 0.90);
        let outcome = ensemble.blend(&f, &f.growth_deltas).unwrap();
        assert!(outcome.confidence_lower < outcome.predicted_growth);
        assert!(outcome.predicted_growth < outcome.confidence_upper);
        // All members see the same 20% step; the blend stays near it.
        assert!((outcome.predicted_growth - 20.0).abs() < 10.0);
    }
}
