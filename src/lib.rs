//! Annual report analysis backend.
//!
//! Takes a company's annual report (PDF or plain text), extracts a
//! structured financial snapshot (table heuristics first, LLM normalization
//! as a verified fallback), persists it as JSON artifacts, and derives
//! growth predictions, a Monte Carlo sales forecast, investment leads, and
//! an executive summary from the extracted figures.
//!
//! ```no_run
//! use std::sync::Arc;
//! use annual_report_analyzer::{
//!     AnalysisService, DataStore, GeminiClient, PipelineConfig,
//! };
//!
//! # async fn run() -> annual_report_analyzer::Result<()> {
//! let config = PipelineConfig::from_env()?;
//! let client = Arc::new(GeminiClient::from_env(
//!     config.llm_model.clone(),
//!     config.llm_timeout,
//! )?);
//! let store = Arc::new(DataStore::new("./data")?);
//! let service = AnalysisService::new(client, store, config)?;
//!
//! let report = service.register_report(
//!     "Acme Corp",
//!     Some(2023),
//!     "acme-2023.pdf",
//!     Some("Technology".to_string()),
//! )?;
//! let bytes = tokio::fs::read("acme-2023.pdf").await?;
//! service.extract(report.id, &bytes).await?;
//! let predictions = service.get_predictions(report.id).await?;
//! println!("{:#?}", predictions.growth_rate);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod extractor;
pub mod insight;
pub mod llm;
pub mod pipeline;
pub mod predict;
pub mod schema;
pub mod store;
pub mod tables;

pub use config::PipelineConfig;
pub use error::{AnalysisError, Result};
pub use extractor::DocumentExtractor;
pub use insight::InsightGenerator;
pub use llm::{GeminiClient, LlmClient, LlmRequest};
pub use pipeline::AnalysisService;
pub use predict::PredictionEngine;
pub use schema::{
    FinancialData, InvestmentLeads, MlReadyData, Predictions, Report, ReportId, ReportStatus,
    SummaryArtifact,
};
pub use store::DataStore;
