use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("No extractable tables: {0}")]
    NoExtractableTables(String),

    #[error("Corrupt file: {0}")]
    CorruptFile(String),

    #[error("LLM unavailable after {attempts} attempt(s): {reason}")]
    LlmUnavailable { attempts: usize, reason: String },

    #[error("LLM response did not match the expected schema: {0}")]
    LlmParseError(String),

    #[error("Prediction failure: {0}")]
    PredictionError(String),

    #[error("Report not found: {0}")]
    NotFound(u64),

    #[error("Report {id} is in status '{actual}', expected '{expected}'")]
    StatusConflict {
        id: u64,
        expected: String,
        actual: String,
    },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Export error: {0}")]
    ExportError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AnalysisError {
    /// Transient failures are worth retrying; schema and document faults are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalysisError::LlmUnavailable { .. })
    }

    pub fn is_extraction_fatal(&self) -> bool {
        matches!(
            self,
            AnalysisError::UnsupportedFormat(_)
                | AnalysisError::NoExtractableTables(_)
                | AnalysisError::CorruptFile(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
