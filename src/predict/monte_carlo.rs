//! Monte Carlo revenue simulation.
//!
//! Each iteration compounds the latest revenue forward, drawing each year's
//! growth from a normal distribution around the blended estimate with the
//! historical growth volatility. Per-year medians become the base case and
//! the 10th/90th percentiles bound the forecast.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone)]
pub struct YearDistribution {
    /// 1-based offset from the latest actual year.
    pub offset: usize,
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
}

pub struct MonteCarlo {
    iterations: usize,
    rng: StdRng,
}

impl MonteCarlo {
    pub fn new(iterations: usize, seed: u64) -> Self {
        Self {
            iterations,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Simulates `years` of compounded revenue. `growth_pct` and
    /// `volatility_pct` are both in percent.
    pub fn simulate(
        &mut self,
        base_revenue: f64,
        growth_pct: f64,
        volatility_pct: f64,
        years: usize,
    ) -> Result<Vec<YearDistribution>> {
        if volatility_pct < 0.0 || volatility_pct.is_nan() {
            return Err(AnalysisError::PredictionError(format!(
                "volatility must be a non-negative percentage, got {volatility_pct}"
            )));
        }
        let normal = Normal::new(growth_pct, volatility_pct).map_err(|e| {
            AnalysisError::PredictionError(format!(
                "growth distribution ({growth_pct}, {volatility_pct}): {e}"
            ))
        })?;

        let mut per_year: Vec<Vec<f64>> = vec![Vec::with_capacity(self.iterations); years];
        for _ in 0..self.iterations {
            let mut revenue = base_revenue;
            for samples in per_year.iter_mut() {
                let growth = normal.sample(&mut self.rng);
                // Bound a single draw so one extreme tail sample cannot wipe
                // out or quadruple revenue in a year.
                let growth = growth.clamp(-80.0, 300.0);
                revenue *= 1.0 + growth / 100.0;
                samples.push(revenue);
            }
        }

        let mut out = Vec::with_capacity(years);
        for (i, mut samples) in per_year.into_iter().enumerate() {
            samples.sort_by(|a, b| a.total_cmp(b));
            out.push(YearDistribution {
                offset: i + 1,
                median: percentile(&samples, 50.0),
                p10: percentile(&samples, 10.0),
                p90: percentile(&samples, 90.0),
            });
        }
        Ok(out)
    }

}

/// Linear-interpolated percentile over a sorted slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}
