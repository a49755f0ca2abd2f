//! Revenue prediction engine.
//!
//! Turns the ML-ready subset of an extraction into a [`Predictions`] artifact:
//! a blended next-year growth estimate with a confidence interval, a
//! three-year Monte Carlo sales forecast, segment growth attribution, risk
//! scoring, scenario paths, and plain-language recommendations.
//!
//! Thin history is a normal outcome, not a failure: zero usable revenue years
//! yields a `success == false` artifact with remediation recommendations, and
//! exactly one usable year substitutes the industry benchmark profile.
//! `Err(PredictionError)` is reserved for internal faults such as non-finite
//! inputs.

pub mod anomaly;
pub mod benchmark;
pub mod ensemble;
pub mod features;
pub mod monte_carlo;

use chrono::Utc;
use log::{debug, info};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::config::PipelineConfig;
use crate::error::{AnalysisError, Result};
use crate::schema::{
    GrowthRate, MlReadyData, Predictions, ReportId, RiskMetrics, SalesForecast, ScenarioPath,
    Scenarios, SegmentBreakdown, SegmentSeries, YearValue,
};

use ensemble::Ensemble;
use features::FeatureSet;
use monte_carlo::MonteCarlo;

pub struct PredictionEngine {
    confidence_level: f64,
    iterations: usize,
    forecast_years: usize,
    weights: [f64; 3],
    rng_seed: Option<u64>,
}

impl PredictionEngine {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            confidence_level: config.confidence_level,
            iterations: config.monte_carlo_iterations,
            forecast_years: config.forecast_years,
            weights: config.ensemble_weights,
            rng_seed: config.rng_seed,
        }
    }

    pub fn predict(&self, report_id: ReportId, data: &MlReadyData) -> Result<Predictions> {
        let features = FeatureSet::build(data)?;

        if features.usable_years() == 0 {
            info!(
                "report {}: no usable revenue years, returning insufficient-data predictions",
                report_id
            );
            return Ok(Predictions::insufficient(
                report_id,
                "no usable revenue figures in the extracted data".to_string(),
                vec![
                    "Verify the uploaded document contains an income statement with revenue figures".to_string(),
                    "Re-run extraction; table regions may have been missed on a scanned document".to_string(),
                    "Upload a machine-readable annual report rather than a scanned image".to_string(),
                ],
            ));
        }

        let (outcome, anomalies, volatility, historical_growth, fallback_used) =
            if features.usable_years() == 1 {
                let profile = benchmark::profile_for(features.industry.as_deref());
                info!(
                    "report {}: single revenue year, using {} industry profile",
                    report_id, profile.name
                );
                let volatility = profile.volatility.max(2.0);
                let half_width = self.quantile()? * volatility;
                let outcome = ensemble::EnsembleOutcome {
                    predicted_growth: profile.growth,
                    confidence_lower: profile.growth - half_width,
                    confidence_upper: profile.growth + half_width,
                    members: vec![("industry_benchmark", profile.growth)],
                };
                (outcome, Vec::new(), volatility, None, true)
            } else {
                let (fit_deltas, anomalies) = anomaly::screen_growth(&features.growth_deltas);
                let ensemble = Ensemble::new(self.weights, self.confidence_level);
                let outcome = ensemble.blend(&features, &fit_deltas)?;
                debug!(
                    "report {}: ensemble members {:?} -> {:.2}%",
                    report_id, outcome.members, outcome.predicted_growth
                );
                let volatility = features.growth_volatility();
                let historical_growth = features.historical_growth();
                (outcome, anomalies, volatility, historical_growth, false)
            };

        let (base_year, base_revenue) = features
            .latest_revenue()
            .ok_or_else(|| AnalysisError::PredictionError("empty revenue series".to_string()))?;

        let seed = self.rng_seed.unwrap_or(report_id.0);
        let mut mc = MonteCarlo::new(self.iterations, seed);
        let distributions = mc.simulate(
            base_revenue,
            outcome.predicted_growth,
            volatility,
            self.forecast_years,
        )?;

        let mut sales_forecast = Vec::with_capacity(distributions.len());
        let mut prev_revenue = base_revenue;
        for dist in &distributions {
            let growth_rate = if prev_revenue != 0.0 {
                (dist.median - prev_revenue) / prev_revenue.abs() * 100.0
            } else {
                0.0
            };
            sales_forecast.push(SalesForecast {
                year: base_year + dist.offset as i32,
                predicted_revenue: dist.median,
                confidence_lower: dist.p10,
                confidence_upper: dist.p90,
                growth_rate,
                currency: features.currency.clone(),
            });
            prev_revenue = dist.median;
        }

        let segment_breakdown =
            segment_breakdown(&data.segment_history, outcome.predicted_growth);
        let risk_metrics = risk_metrics(&features, outcome.predicted_growth, volatility, fallback_used);
        let scenarios = scenarios(
            base_year,
            base_revenue,
            outcome.predicted_growth,
            volatility,
            self.forecast_years,
        );
        let recommendations = recommendations(
            &features,
            outcome.predicted_growth,
            &risk_metrics,
            fallback_used,
            !anomalies.is_empty(),
        );

        Ok(Predictions {
            success: true,
            report_id,
            generated_at: Utc::now(),
            growth_rate: Some(GrowthRate {
                predicted: outcome.predicted_growth,
                confidence_lower: outcome.confidence_lower,
                confidence_upper: outcome.confidence_upper,
                confidence_level: self.confidence_level,
                historical_growth,
            }),
            sales_forecast,
            segment_breakdown,
            recommendations,
            risk_metrics: Some(risk_metrics),
            scenarios: Some(scenarios),
            anomalies,
            fallback_used,
            error: None,
        })
    }

    fn quantile(&self) -> Result<f64> {
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| AnalysisError::PredictionError(format!("normal quantile: {e}")))?;
        Ok(normal.inverse_cdf(0.5 + self.confidence_level / 2.0))
    }
}

/// Attributes predicted growth across business segments. A segment with at
/// least two years of history blends its own trend with the company estimate;
/// a single-year segment inherits the company estimate.
fn segment_breakdown(history: &[SegmentSeries], company_growth: f64) -> Vec<SegmentBreakdown> {
    let latest: Vec<(&SegmentSeries, f64)> = history
        .iter()
        .filter_map(|series| {
            series
                .revenue_by_year
                .iter()
                .rev()
                .find_map(|yv| yv.value)
                .map(|v| (series, v))
        })
        .filter(|(_, v)| *v > 0.0)
        .collect();
    let total: f64 = latest.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    latest
        .into_iter()
        .map(|(series, current)| {
            let usable: Vec<f64> = series
                .revenue_by_year
                .iter()
                .filter_map(|yv| yv.value)
                .collect();
            let predicted_growth = if usable.len() >= 2 {
                let prev = usable[usable.len() - 2];
                let segment_trend = if prev != 0.0 {
                    (current - prev) / prev.abs() * 100.0
                } else {
                    company_growth
                };
                (segment_trend + company_growth) / 2.0
            } else {
                company_growth
            };
            SegmentBreakdown {
                segment: series.segment.clone(),
                current_revenue: current,
                proportion: current / total * 100.0,
                predicted_growth,
                predicted_revenue: current * (1.0 + predicted_growth / 100.0),
            }
        })
        .collect()
}

fn risk_metrics(
    features: &FeatureSet,
    predicted_growth: f64,
    volatility: f64,
    fallback_used: bool,
) -> RiskMetrics {
    let mut score = volatility * 2.5;
    score += (50.0 - features.health_score) * 0.6;
    if predicted_growth < 0.0 {
        score += 20.0;
    }
    if fallback_used {
        score += 10.0;
    }
    let risk_score = score.clamp(0.0, 100.0).round() as u32;
    let risk_level = match risk_score {
        0..=24 => "Low",
        25..=49 => "Moderate",
        50..=74 => "Elevated",
        _ => "High",
    };
    RiskMetrics {
        risk_level: risk_level.to_string(),
        risk_score,
        financial_health_score: features.health_score,
        volatility,
    }
}

fn scenarios(
    base_year: i32,
    base_revenue: f64,
    expected_growth: f64,
    volatility: f64,
    years: usize,
) -> Scenarios {
    let path = |description: &str, growth: f64, probability: f64| {
        let mut revenue = base_revenue;
        let projections = (1..=years)
            .map(|offset| {
                revenue *= 1.0 + growth / 100.0;
                YearValue {
                    year: base_year + offset as i32,
                    value: Some(revenue),
                }
            })
            .collect();
        ScenarioPath {
            description: description.to_string(),
            growth_rate: growth,
            probability,
            revenue_projections: projections,
        }
    };
    Scenarios {
        best_case: path(
            "Growth sustained one volatility band above the blended estimate",
            expected_growth + volatility,
            0.15,
        ),
        expected_case: path("Blended ensemble growth estimate", expected_growth, 0.70),
        worst_case: path(
            "Growth one volatility band below the blended estimate",
            expected_growth - volatility,
            0.15,
        ),
    }
}

fn recommendations(
    features: &FeatureSet,
    predicted_growth: f64,
    risk: &RiskMetrics,
    fallback_used: bool,
    has_anomalies: bool,
) -> Vec<String> {
    let mut recs = Vec::new();
    match predicted_growth {
        g if g > 15.0 => recs.push(
            "Strong growth trajectory projected; confirm capacity and working capital can scale with demand".to_string(),
        ),
        g if g > 5.0 => recs.push(
            "Moderate growth projected; consistent with a stable expansion phase".to_string(),
        ),
        g if g < -5.0 => recs.push(
            "Revenue contraction projected; review cost structure and segment performance for turnaround levers".to_string(),
        ),
        _ => recs.push(
            "Roughly flat revenue projected; look to margins and capital allocation for shareholder returns".to_string(),
        ),
    }
    if features.health_score < 40.0 {
        recs.push(
            "Financial health score is weak; examine leverage and profitability before relying on the forecast".to_string(),
        );
    } else if features.health_score > 70.0 {
        recs.push("Financial health score is strong, supporting the projected trajectory".to_string());
    }
    if risk.volatility > 10.0 {
        recs.push(format!(
            "Historical growth volatility of {:.1} percentage points widens the forecast range; treat point estimates with caution",
            risk.volatility
        ));
    }
    if fallback_used {
        recs.push(
            "Only one year of revenue history was available; projections use an industry benchmark profile".to_string(),
        );
    }
    if has_anomalies {
        recs.push(
            "One or more growth outliers were excluded from trend fitting; check for acquisitions or divestitures in those years".to_string(),
        );
    }
    recs
}
