use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Identifier of one uploaded report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct ReportId(pub u64);

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReportStatus::Uploaded => "uploaded",
            ReportStatus::Processing => "processing",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One uploaded document and its processing lifecycle. Created on upload,
/// mutated by the extractor, immutable once completed except for derived
/// artifact regeneration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub company_name: String,
    pub report_year: Option<i32>,
    pub filename: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub extracted_data_path: Option<PathBuf>,
    pub ml_data_path: Option<PathBuf>,
    /// Declared industry, used for the benchmark fallback when history is thin.
    pub industry: Option<String>,
}

/// Current-year/previous-year pair. `None` means the source document did not
/// state the figure, which is distinct from zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct YearOverYear {
    #[schemars(description = "Value for the fiscal year the report covers, or null if absent")]
    pub current_year: Option<f64>,
    #[schemars(description = "Comparative value for the prior fiscal year, or null if absent")]
    pub previous_year: Option<f64>,
}

impl YearOverYear {
    pub fn is_empty(&self) -> bool {
        self.current_year.is_none() && self.previous_year.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RevenueFigures {
    #[schemars(description = "Revenue for the reported fiscal year, or null if absent")]
    pub current_year: Option<f64>,
    #[schemars(description = "Revenue for the prior fiscal year, or null if absent")]
    pub previous_year: Option<f64>,
    #[schemars(
        description = "ISO 4217 code of the reporting currency. One currency applies to every monetary field of the record."
    )]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CashFlow {
    #[schemars(description = "Net cash from operating activities, or null")]
    pub operating: Option<f64>,
    #[schemars(description = "Net cash from investing activities, or null")]
    pub investing: Option<f64>,
    #[schemars(description = "Net cash from financing activities, or null")]
    pub financing: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct KeyMetrics {
    #[schemars(description = "Basic earnings per share, or null")]
    pub eps: Option<f64>,
    #[schemars(description = "Price-to-earnings ratio, or null")]
    pub pe_ratio: Option<f64>,
    #[schemars(description = "Return on equity as a percentage, or null")]
    pub roe: Option<f64>,
    #[schemars(description = "Total debt divided by shareholders' equity, or null")]
    pub debt_to_equity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SegmentRevenue {
    #[schemars(description = "Business segment name as reported")]
    pub segment: String,
    #[schemars(description = "Segment revenue for the reported fiscal year, or null")]
    pub revenue: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GeographicRevenue {
    #[schemars(description = "Geographic region name as reported")]
    pub region: String,
    #[schemars(description = "Regional revenue for the reported fiscal year, or null")]
    pub revenue: Option<f64>,
}

/// Canonical structured snapshot of one company-year, tied 1:1 to a report.
/// Absent source data stays null; nothing is zero-filled.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FinancialData {
    pub company_name: String,
    pub report_year: Option<i32>,
    pub revenue: RevenueFigures,
    pub net_income: YearOverYear,
    pub total_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub shareholders_equity: Option<f64>,
    pub cash_flow: CashFlow,
    pub key_metrics: KeyMetrics,
    #[serde(default)]
    pub segment_revenue: Vec<SegmentRevenue>,
    #[serde(default)]
    pub geographic_revenue: Vec<GeographicRevenue>,
}

impl FinancialData {
    /// A record with no income-statement, balance-sheet, or cash-flow figures
    /// at all carries nothing downstream consumers can use.
    pub fn has_any_figures(&self) -> bool {
        self.revenue.current_year.is_some()
            || self.revenue.previous_year.is_some()
            || !self.net_income.is_empty()
            || self.total_assets.is_some()
            || self.total_liabilities.is_some()
            || self.shareholders_equity.is_some()
            || self.cash_flow.operating.is_some()
            || self.cash_flow.investing.is_some()
            || self.cash_flow.financing.is_some()
    }
}

/// One year of a numeric series. `value: None` marks a year known to exist in
/// the source but whose figure could not be extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct YearValue {
    pub year: i32,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SegmentSeries {
    pub segment: String,
    /// Ascending by year.
    pub revenue_by_year: Vec<YearValue>,
}

/// Pruned numeric representation consumed by the prediction engine,
/// persisted separately from the full extraction (`ml_data_path`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MlReadyData {
    pub company_name: String,
    pub report_year: Option<i32>,
    pub industry: Option<String>,
    pub currency: Option<String>,
    /// Ascending by year.
    #[serde(default)]
    pub revenue_history: Vec<YearValue>,
    /// Ascending by year.
    #[serde(default)]
    pub net_income_history: Vec<YearValue>,
    #[serde(default)]
    pub segment_history: Vec<SegmentSeries>,
    pub total_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub shareholders_equity: Option<f64>,
    pub key_metrics: KeyMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthRate {
    /// Predicted year-over-year revenue growth in percent.
    pub predicted: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    pub confidence_level: f64,
    /// Latest observed year-over-year growth, when history allows it.
    pub historical_growth: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesForecast {
    pub year: i32,
    pub predicted_revenue: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    /// Growth in percent applied for this forecast year.
    pub growth_rate: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentBreakdown {
    pub segment: String,
    pub current_revenue: f64,
    /// Share of total segment revenue, in percent. Sums to ~100 across segments.
    pub proportion: f64,
    /// Predicted growth for this segment, in percent.
    pub predicted_growth: f64,
    pub predicted_revenue: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub risk_level: String,
    /// 0 (safest) to 100 (riskiest).
    pub risk_score: u32,
    /// 0-100 composite of ROE, leverage, growth, and margin bands.
    pub financial_health_score: f64,
    /// Growth volatility in percentage points.
    pub volatility: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioPath {
    pub description: String,
    /// Growth rate in percent under this scenario.
    pub growth_rate: f64,
    pub probability: f64,
    /// One revenue point per forecast year, ascending.
    pub revenue_projections: Vec<YearValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenarios {
    pub best_case: ScenarioPath,
    pub expected_case: ScenarioPath,
    pub worst_case: ScenarioPath,
}

/// A year-over-year delta excluded from trend fitting but kept for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthAnomaly {
    pub year: i32,
    /// Observed growth delta in percent.
    pub growth: f64,
    pub z_score: f64,
}

/// Derived, regenerable artifact keyed by report id. Written all-or-nothing.
///
/// `success == false` carries only `error` and remediation `recommendations`;
/// every other field stays empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predictions {
    pub success: bool,
    pub report_id: ReportId,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub growth_rate: Option<GrowthRate>,
    #[serde(default)]
    pub sales_forecast: Vec<SalesForecast>,
    #[serde(default)]
    pub segment_breakdown: Vec<SegmentBreakdown>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_metrics: Option<RiskMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenarios: Option<Scenarios>,
    #[serde(default)]
    pub anomalies: Vec<GrowthAnomaly>,
    /// True when the industry benchmark profile substituted for trend fitting.
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Predictions {
    pub fn insufficient(report_id: ReportId, error: String, recommendations: Vec<String>) -> Self {
        Self {
            success: false,
            report_id,
            generated_at: Utc::now(),
            growth_rate: None,
            sales_forecast: Vec::new(),
            segment_breakdown: Vec::new(),
            recommendations,
            risk_metrics: None,
            scenarios: None,
            anomalies: Vec::new(),
            fallback_used: false,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Rating {
    #[serde(rename = "Strong Buy")]
    StrongBuy,
    Buy,
    Hold,
    Sell,
    #[serde(rename = "Strong Sell")]
    StrongSell,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Opportunity {
    #[schemars(description = "Short opportunity title")]
    pub title: String,
    #[schemars(description = "Specific figures from the evidence supporting this opportunity")]
    pub evidence: String,
    #[schemars(description = "High, Medium or Low")]
    pub potential: String,
    #[schemars(description = "Short-term, Medium-term or Long-term")]
    pub timeframe: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RiskLead {
    #[schemars(description = "Short risk title")]
    pub title: String,
    #[schemars(description = "High, Medium or Low")]
    pub severity: String,
    #[schemars(description = "Specific figures from the evidence supporting this risk")]
    pub evidence: String,
    #[schemars(description = "How the risk could be mitigated, if apparent")]
    pub mitigation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Catalyst {
    #[schemars(description = "Growth catalyst title")]
    pub title: String,
    #[schemars(description = "High, Medium or Low")]
    pub impact: String,
    #[schemars(description = "Supporting data from the evidence")]
    pub evidence: String,
}

/// Investor-facing structured output. Regenerated on demand, latest overwrites.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InvestmentLeads {
    pub company: String,
    #[schemars(description = "Two to three sentence executive summary")]
    pub summary: String,
    pub rating: Rating,
    pub opportunities: Vec<Opportunity>,
    pub risks: Vec<RiskLead>,
    pub catalysts: Vec<Catalyst>,
    #[serde(default)]
    #[schemars(description = "Named scalar metrics such as investment_score or confidence")]
    pub key_metrics: BTreeMap<String, serde_json::Value>,
}

impl InvestmentLeads {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(InvestmentLeads)
    }
}

/// Output of `generate_summary`. The PDF itself is rendered by an external
/// collaborator; `pdf_ref` is the path that collaborator owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryArtifact {
    pub report_id: ReportId,
    pub summary_text: String,
    pub pdf_ref: PathBuf,
    pub generated_at: DateTime<Utc>,
}
