//! Financial data store: the report registry plus on-disk JSON artifacts.
//!
//! Layout under the store root:
//! `reports/<id>/extracted.json` holds the full extraction (chat/agent
//! features), `reports/<id>/ml.json` the pruned ML-ready subset, and
//! `predictions.json`, `leads.json`, `summary.json` the derived artifacts.
//!
//! Artifacts are written to a temp file in the destination directory and
//! renamed into place, so concurrent readers observe either the previous
//! artifact or the complete new one, never a partial write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AnalysisError, Result};
use crate::schema::{Report, ReportId, ReportStatus};

pub struct DataStore {
    root: PathBuf,
    reports: Mutex<HashMap<ReportId, Report>>,
    next_id: AtomicU64,
    tmp_counter: AtomicU64,
}

impl DataStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("reports"))?;
        Ok(Self {
            root,
            reports: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            tmp_counter: AtomicU64::new(0),
        })
    }

    /// Creates the registry row for a fresh upload.
    pub fn register_report(
        &self,
        company_name: impl Into<String>,
        report_year: Option<i32>,
        filename: impl Into<String>,
        industry: Option<String>,
    ) -> Result<Report> {
        let id = ReportId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let report = Report {
            id,
            company_name: company_name.into(),
            report_year,
            filename: filename.into(),
            status: ReportStatus::Uploaded,
            created_at: Utc::now(),
            extracted_data_path: None,
            ml_data_path: None,
            industry,
        };

        std::fs::create_dir_all(self.report_dir(id))?;
        self.reports
            .lock()
            .map_err(poisoned)?
            .insert(id, report.clone());
        info!("registered report {} ({})", id, report.company_name);
        Ok(report)
    }

    pub fn get_report(&self, id: ReportId) -> Result<Report> {
        self.reports
            .lock()
            .map_err(poisoned)?
            .get(&id)
            .cloned()
            .ok_or(AnalysisError::NotFound(id.0))
    }

    /// Single compare-and-set status transition. The losing side of a race
    /// gets `StatusConflict`, which is how double-processing is prevented.
    pub fn compare_and_set_status(
        &self,
        id: ReportId,
        expected: ReportStatus,
        next: ReportStatus,
    ) -> Result<()> {
        let mut reports = self.reports.lock().map_err(poisoned)?;
        let report = reports.get_mut(&id).ok_or(AnalysisError::NotFound(id.0))?;
        if report.status != expected {
            return Err(AnalysisError::StatusConflict {
                id: id.0,
                expected: expected.to_string(),
                actual: report.status.to_string(),
            });
        }
        debug!("report {}: status {} -> {}", id, expected, next);
        report.status = next;
        Ok(())
    }

    /// Unconditional transition used on failure paths, where the report may
    /// be in either `uploaded` or `processing`.
    pub fn set_status(&self, id: ReportId, status: ReportStatus) -> Result<()> {
        let mut reports = self.reports.lock().map_err(poisoned)?;
        let report = reports.get_mut(&id).ok_or(AnalysisError::NotFound(id.0))?;
        report.status = status;
        Ok(())
    }

    pub fn set_artifact_paths(
        &self,
        id: ReportId,
        extracted_data_path: PathBuf,
        ml_data_path: PathBuf,
    ) -> Result<()> {
        let mut reports = self.reports.lock().map_err(poisoned)?;
        let report = reports.get_mut(&id).ok_or(AnalysisError::NotFound(id.0))?;
        report.extracted_data_path = Some(extracted_data_path);
        report.ml_data_path = Some(ml_data_path);
        Ok(())
    }

    pub fn report_dir(&self, id: ReportId) -> PathBuf {
        self.root.join("reports").join(id.to_string())
    }

    pub fn extracted_path(&self, id: ReportId) -> PathBuf {
        self.report_dir(id).join("extracted.json")
    }

    pub fn ml_path(&self, id: ReportId) -> PathBuf {
        self.report_dir(id).join("ml.json")
    }

    pub fn predictions_path(&self, id: ReportId) -> PathBuf {
        self.report_dir(id).join("predictions.json")
    }

    pub fn leads_path(&self, id: ReportId) -> PathBuf {
        self.report_dir(id).join("leads.json")
    }

    pub fn summary_path(&self, id: ReportId) -> PathBuf {
        self.report_dir(id).join("summary.json")
    }

    /// Reserved location the external PDF renderer writes to.
    pub fn summary_pdf_ref(&self, id: ReportId) -> PathBuf {
        self.report_dir(id).join("summary.pdf")
    }

    pub fn export_path(&self, id: ReportId) -> PathBuf {
        self.report_dir(id).join("export.csv")
    }

    /// All-or-nothing JSON write: temp file in the destination directory,
    /// then an atomic rename over the final path.
    pub async fn write_json_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes_atomic(path, &bytes).await
    }

    pub async fn write_bytes_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| AnalysisError::IoError(std::io::Error::other("path has no parent")))?;
        tokio::fs::create_dir_all(parent).await?;

        let tmp_name = format!(
            ".{}.{}.tmp",
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("artifact"),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed),
        );
        let tmp_path = parent.join(tmp_name);

        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        debug!("wrote artifact {}", path.display());
        Ok(())
    }

    pub async fn load_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn artifact_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> AnalysisError {
    AnalysisError::IoError(std::io::Error::other("report registry lock poisoned"))
}
