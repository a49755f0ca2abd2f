//! The `AnalysisService` facade: report registration, extraction, prediction,
//! and insight generation over a shared store and a bounded worker pool.
//!
//! Extraction is the only operation that mutates report status, and it is
//! guarded by a compare-and-set so two concurrent requests for the same
//! report cannot double-process. Predictions and the summary are cached on
//! disk and regenerated when absent, on explicit request, or after a
//! re-extraction; leads are regenerated on every `generate_leads` call with
//! the latest run overwriting the stored artifact.

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::Semaphore;

use crate::config::PipelineConfig;
use crate::error::{AnalysisError, Result};
use crate::export;
use crate::extractor::DocumentExtractor;
use crate::insight::InsightGenerator;
use crate::llm::LlmClient;
use crate::predict::PredictionEngine;
use crate::schema::{
    FinancialData, InvestmentLeads, MlReadyData, Predictions, Report, ReportId, ReportStatus,
    SummaryArtifact,
};
use crate::store::DataStore;

pub struct AnalysisService {
    store: Arc<DataStore>,
    extractor: DocumentExtractor,
    engine: PredictionEngine,
    insight: InsightGenerator,
    jobs: Arc<Semaphore>,
}

impl AnalysisService {
    pub fn new(
        client: Arc<dyn LlmClient>,
        store: Arc<DataStore>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            extractor: DocumentExtractor::new(client.clone(), &config),
            engine: PredictionEngine::new(&config),
            insight: InsightGenerator::new(client, &config),
            jobs: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            store,
        })
    }

    pub fn register_report(
        &self,
        company_name: impl Into<String>,
        report_year: Option<i32>,
        filename: impl Into<String>,
        industry: Option<String>,
    ) -> Result<Report> {
        self.store
            .register_report(company_name, report_year, filename, industry)
    }

    pub fn get_report(&self, id: ReportId) -> Result<Report> {
        self.store.get_report(id)
    }

    /// Runs the full extraction for a registered report's document bytes.
    ///
    /// Status walks `uploaded -> processing -> completed`; a report already
    /// processing loses the compare-and-set and gets `StatusConflict`. A
    /// failed report may be retried. Extraction-fatal document errors mark
    /// the report `failed` and surface unchanged.
    pub async fn extract(&self, id: ReportId, bytes: &[u8]) -> Result<FinancialData> {
        let _permit = self
            .jobs
            .acquire()
            .await
            .map_err(|_| AnalysisError::IoError(std::io::Error::other("worker pool closed")))?;

        let report = self.store.get_report(id)?;
        match report.status {
            ReportStatus::Uploaded | ReportStatus::Failed => {
                self.store
                    .compare_and_set_status(id, report.status, ReportStatus::Processing)?;
            }
            other => {
                return Err(AnalysisError::StatusConflict {
                    id: id.0,
                    expected: ReportStatus::Uploaded.to_string(),
                    actual: other.to_string(),
                });
            }
        }

        let (financial, ml) = match self.extractor.extract(&report, bytes).await {
            Ok(pair) => pair,
            Err(e) => {
                if e.is_extraction_fatal() {
                    warn!("report {}: document rejected: {}", id, e);
                } else {
                    warn!("report {}: extraction failed, retry possible: {}", id, e);
                }
                self.store.set_status(id, ReportStatus::Failed)?;
                return Err(e);
            }
        };
        if !financial.has_any_figures() {
            warn!("report {}: extraction yielded no usable figures", id);
        }

        if let Err(e) = self.persist_extraction(id, &financial, &ml).await {
            warn!("report {}: artifact persistence failed: {}", id, e);
            self.store.set_status(id, ReportStatus::Failed)?;
            return Err(e);
        }

        self.store
            .compare_and_set_status(id, ReportStatus::Processing, ReportStatus::Completed)?;
        info!("report {}: extraction completed", id);
        Ok(financial)
    }

    async fn persist_extraction(
        &self,
        id: ReportId,
        financial: &FinancialData,
        ml: &MlReadyData,
    ) -> Result<()> {
        let extracted_path = self.store.extracted_path(id);
        let ml_path = self.store.ml_path(id);
        self.store.write_json_atomic(&extracted_path, financial).await?;
        self.store.write_json_atomic(&ml_path, ml).await?;
        self.store.set_artifact_paths(id, extracted_path, ml_path)?;

        // Derived artifacts are snapshots of the previous extraction.
        self.drop_derived_artifacts(id).await;
        Ok(())
    }

    pub async fn get_financial_data(&self, id: ReportId) -> Result<FinancialData> {
        let report = self.completed(id)?;
        let path = report
            .extracted_data_path
            .unwrap_or_else(|| self.store.extracted_path(id));
        self.store.load_json(&path).await
    }

    /// Regenerates predictions from the stored ML-ready data.
    pub async fn predict(&self, id: ReportId) -> Result<Predictions> {
        let report = self.completed(id)?;
        let path = report
            .ml_data_path
            .unwrap_or_else(|| self.store.ml_path(id));
        let ml: MlReadyData = self.store.load_json(&path).await?;

        let predictions = self.engine.predict(id, &ml)?;
        self.store
            .write_json_atomic(&self.store.predictions_path(id), &predictions)
            .await?;
        Ok(predictions)
    }

    /// Cached predictions, computed on first request.
    pub async fn get_predictions(&self, id: ReportId) -> Result<Predictions> {
        let path = self.store.predictions_path(id);
        if self.store.artifact_exists(&path) {
            return self.store.load_json(&path).await;
        }
        self.predict(id).await
    }

    /// Produces fresh investment leads on every call. Leads are not
    /// versioned; the latest run overwrites the stored artifact.
    pub async fn generate_leads(&self, id: ReportId) -> Result<InvestmentLeads> {
        let financial = self.get_financial_data(id).await?;
        let predictions = self.get_predictions(id).await.ok();
        let leads = self
            .insight
            .generate_leads(&financial, predictions.as_ref())
            .await?;
        self.store
            .write_json_atomic(&self.store.leads_path(id), &leads)
            .await?;
        Ok(leads)
    }

    /// Renders the CSV export of figures and forecasts, regenerated on every
    /// call, and returns its on-disk location.
    pub async fn generate_export(&self, id: ReportId) -> Result<std::path::PathBuf> {
        let financial = self.get_financial_data(id).await?;
        let predictions = self.get_predictions(id).await.ok();
        let bytes = export::render_csv(&financial, predictions.as_ref())?;
        let path = self.store.export_path(id);
        self.store.write_bytes_atomic(&path, &bytes).await?;
        Ok(path)
    }

    /// Latest stored leads, generating them on first request.
    pub async fn get_leads(&self, id: ReportId) -> Result<InvestmentLeads> {
        let path = self.store.leads_path(id);
        if self.store.artifact_exists(&path) {
            return self.store.load_json(&path).await;
        }
        self.generate_leads(id).await
    }

    /// Cached executive summary, generated on first request. Call
    /// [`regenerate_summary`](Self::regenerate_summary) to discard it.
    pub async fn generate_summary(&self, id: ReportId) -> Result<SummaryArtifact> {
        let path = self.store.summary_path(id);
        if self.store.artifact_exists(&path) {
            return self.store.load_json(&path).await;
        }
        self.regenerate_summary(id).await
    }

    /// Replaces any cached summary with a freshly generated one.
    pub async fn regenerate_summary(&self, id: ReportId) -> Result<SummaryArtifact> {
        let financial = self.get_financial_data(id).await?;
        let predictions = self.get_predictions(id).await.ok();
        let summary_text = self
            .insight
            .generate_summary(&financial, predictions.as_ref())
            .await?;
        let artifact = SummaryArtifact {
            report_id: id,
            summary_text,
            pdf_ref: self.store.summary_pdf_ref(id),
            generated_at: chrono::Utc::now(),
        };
        self.store
            .write_json_atomic(&self.store.summary_path(id), &artifact)
            .await?;
        Ok(artifact)
    }

    fn completed(&self, id: ReportId) -> Result<Report> {
        let report = self.store.get_report(id)?;
        if report.status != ReportStatus::Completed {
            return Err(AnalysisError::StatusConflict {
                id: id.0,
                expected: ReportStatus::Completed.to_string(),
                actual: report.status.to_string(),
            });
        }
        Ok(report)
    }

    async fn drop_derived_artifacts(&self, id: ReportId) {
        for path in [
            self.store.predictions_path(id),
            self.store.leads_path(id),
            self.store.summary_path(id),
            self.store.export_path(id),
        ] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!("report {}: dropped stale {}", id, path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("report {}: could not drop {}: {}", id, path.display(), e),
            }
        }
    }
}
