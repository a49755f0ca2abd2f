use std::time::Duration;

use crate::error::{AnalysisError, Result};

/// Tunables for the whole pipeline. `Default` matches the documented
/// behavior; `from_env` picks up deployment overrides.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of reports processed concurrently.
    pub max_concurrent_jobs: usize,
    /// Deadline for a single externally-bound call (LLM request).
    pub llm_timeout: Duration,
    /// Retry budget for transient LLM failures.
    pub llm_max_retries: usize,
    /// Base delay for exponential backoff between retries.
    pub llm_backoff_base: Duration,
    /// Gemini model identifier used for all prompted calls.
    pub llm_model: String,
    /// Two-sided confidence level for growth-rate intervals.
    pub confidence_level: f64,
    /// Number of Monte Carlo iterations per forecast year.
    pub monte_carlo_iterations: usize,
    /// Forecast horizon in years. The sales forecast always has this many entries.
    pub forecast_years: usize,
    /// Per-forecaster blend weights (linear trend, exponential smoothing, momentum).
    pub ensemble_weights: [f64; 3],
    /// Fixed RNG seed for reproducible simulations. `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            llm_timeout: Duration::from_secs(45),
            llm_max_retries: 3,
            llm_backoff_base: Duration::from_millis(500),
            llm_model: "gemini-2.0-flash".to_string(),
            confidence_level: 0.90,
            monte_carlo_iterations: 1_000,
            forecast_years: 3,
            ensemble_weights: [1.0, 1.0, 1.0],
            rng_seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ANALYZER_MAX_CONCURRENT_JOBS") {
            config.max_concurrent_jobs = parse_env("ANALYZER_MAX_CONCURRENT_JOBS", &val)?;
        }
        if let Ok(val) = std::env::var("ANALYZER_LLM_TIMEOUT_SECS") {
            config.llm_timeout = Duration::from_secs(parse_env("ANALYZER_LLM_TIMEOUT_SECS", &val)?);
        }
        if let Ok(val) = std::env::var("ANALYZER_LLM_MODEL") {
            config.llm_model = val;
        }
        if let Ok(val) = std::env::var("ANALYZER_CONFIDENCE_LEVEL") {
            config.confidence_level = parse_env("ANALYZER_CONFIDENCE_LEVEL", &val)?;
        }
        if let Ok(val) = std::env::var("ANALYZER_MONTE_CARLO_ITERATIONS") {
            config.monte_carlo_iterations = parse_env("ANALYZER_MONTE_CARLO_ITERATIONS", &val)?;
        }
        if let Ok(val) = std::env::var("ANALYZER_RNG_SEED") {
            config.rng_seed = Some(parse_env("ANALYZER_RNG_SEED", &val)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(AnalysisError::ConfigError(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if !(0.5..1.0).contains(&self.confidence_level) {
            return Err(AnalysisError::ConfigError(format!(
                "confidence_level {} must be in [0.5, 1.0)",
                self.confidence_level
            )));
        }
        if self.monte_carlo_iterations < 100 {
            return Err(AnalysisError::ConfigError(format!(
                "monte_carlo_iterations {} is too low for stable percentiles",
                self.monte_carlo_iterations
            )));
        }
        if self.forecast_years == 0 {
            return Err(AnalysisError::ConfigError(
                "forecast_years must be at least 1".to_string(),
            ));
        }
        if self.ensemble_weights.iter().sum::<f64>() <= 0.0 {
            return Err(AnalysisError::ConfigError(
                "ensemble_weights must have a positive sum".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, val: &str) -> Result<T> {
    val.parse().map_err(|_| {
        AnalysisError::ConfigError(format!("{} has unparseable value '{}'", key, val))
    })
}
