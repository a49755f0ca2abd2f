//! Document-to-structured-data extraction.
//!
//! Table heuristics run first and are free; the LLM normalizer is a fallback
//! invoked per statement only when the heuristics come up empty for that
//! statement's key rows. Every numeric the model returns is verified against
//! the source fragment before it is trusted. Statements fail independently on
//! parse errors: a balance sheet the model cannot shape leaves its fields
//! null without sinking the income statement. A model outage that survives
//! the retry budget aborts the whole document instead, so the report stays
//! retryable rather than completing with silent gaps.

use std::path::Path;
use std::sync::Arc;

use chrono::Datelike;
use log::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::document::{self, DocumentText};
use crate::error::{AnalysisError, Result};
use crate::llm::normalizer::{
    BalanceSheetFields, CashFlowFields, IncomeFields, Normalizer, SegmentFields,
};
use crate::llm::LlmClient;
use crate::schema::{
    CashFlow, FinancialData, GeographicRevenue, KeyMetrics, MlReadyData, Report, RevenueFigures,
    SegmentRevenue, SegmentSeries, YearOverYear, YearValue,
};
use crate::tables::{locate_statement, Statement, TableRegion};

const REVENUE_NEEDLES: &[&str] = &[
    "total revenue",
    "total net sales",
    "net sales",
    "revenue",
    "sales",
    "turnover",
];
const NET_INCOME_NEEDLES: &[&str] = &[
    "net income",
    "net earnings",
    "net profit",
    "profit for the year",
    "net loss",
];
const EPS_NEEDLES: &[&str] = &["earnings per share", "basic earnings", "basic eps"];
const ASSETS_NEEDLES: &[&str] = &["total assets"];
const LIABILITIES_NEEDLES: &[&str] = &["total liabilities"];
const EQUITY_NEEDLES: &[&str] = &[
    "total shareholders' equity",
    "total stockholders' equity",
    "shareholders' equity",
    "stockholders' equity",
    "shareholders equity",
    "stockholders equity",
    "total equity",
];
const OPERATING_NEEDLES: &[&str] = &["operating activities"];
const INVESTING_NEEDLES: &[&str] = &["investing activities"];
const FINANCING_NEEDLES: &[&str] = &["financing activities"];

pub struct DocumentExtractor {
    normalizer: Normalizer,
}

impl DocumentExtractor {
    pub fn new(client: Arc<dyn LlmClient>, config: &PipelineConfig) -> Self {
        Self {
            normalizer: Normalizer::new(client, config),
        }
    }

    /// Extracts both artifacts from raw document bytes.
    pub async fn extract(
        &self,
        report: &Report,
        bytes: &[u8],
    ) -> Result<(FinancialData, MlReadyData)> {
        let doc = document::read_document(Path::new(&report.filename), bytes)?;

        let regions: Vec<(Statement, Option<TableRegion>)> = Statement::ALL
            .iter()
            .map(|s| (*s, locate_statement(&doc, *s)))
            .collect();

        let any_region = regions.iter().any(|(_, r)| r.is_some());
        if !any_region && !document::contains_financial_keywords(&doc.full_text()) {
            return Err(AnalysisError::NoExtractableTables(format!(
                "{}: no statement tables or financial vocabulary found",
                report.filename
            )));
        }

        let region_for = |statement: Statement| {
            regions
                .iter()
                .find(|(s, _)| *s == statement)
                .and_then(|(_, r)| r.as_ref())
        };

        // Statements are independent; normalize them concurrently so one
        // slow model call does not serialize the rest. An exhausted model
        // outage aborts the whole document so it stays retryable.
        let (income, balance, cash, segments, geographic) = tokio::join!(
            self.income_fields(&report.company_name, region_for(Statement::Income)),
            self.balance_fields(&report.company_name, region_for(Statement::BalanceSheet)),
            self.cash_flow_fields(&report.company_name, region_for(Statement::CashFlow)),
            self.segment_fields(
                &report.company_name,
                region_for(Statement::Segments),
                Statement::Segments.name(),
            ),
            self.segment_fields(
                &report.company_name,
                region_for(Statement::Geographic),
                Statement::Geographic.name(),
            ),
        );
        let (income, balance, cash, segments, geographic) =
            (income?, balance?, cash?, segments?, geographic?);

        let report_year = report.report_year.or_else(|| detect_report_year(&doc));

        let roe = match (income.net_income_current, balance.shareholders_equity) {
            (Some(income), Some(equity)) if equity != 0.0 => Some(income / equity * 100.0),
            _ => None,
        };
        let debt_to_equity = match (balance.total_liabilities, balance.shareholders_equity) {
            (Some(liabilities), Some(equity)) if equity != 0.0 => Some(liabilities / equity),
            _ => None,
        };

        let key_metrics = KeyMetrics {
            eps: income.eps,
            pe_ratio: None,
            roe,
            debt_to_equity,
        };

        let financial = FinancialData {
            company_name: report.company_name.clone(),
            report_year,
            revenue: RevenueFigures {
                current_year: income.revenue_current,
                previous_year: income.revenue_previous,
                currency: income.currency.clone(),
            },
            net_income: YearOverYear {
                current_year: income.net_income_current,
                previous_year: income.net_income_previous,
            },
            total_assets: balance.total_assets,
            total_liabilities: balance.total_liabilities,
            shareholders_equity: balance.shareholders_equity,
            cash_flow: CashFlow {
                operating: cash.operating,
                investing: cash.investing,
                financing: cash.financing,
            },
            key_metrics: key_metrics.clone(),
            segment_revenue: segments
                .segments
                .iter()
                .map(|s| SegmentRevenue {
                    segment: s.name.clone(),
                    revenue: s.revenue_current,
                })
                .collect(),
            geographic_revenue: geographic
                .segments
                .iter()
                .map(|s| GeographicRevenue {
                    region: s.name.clone(),
                    revenue: s.revenue_current,
                })
                .collect(),
        };

        let ml = ml_ready(report, report_year, &financial, &segments, key_metrics);

        info!(
            "report {}: extracted {} segment(s), revenue {}",
            report.id,
            financial.segment_revenue.len(),
            financial
                .revenue
                .current_year
                .map(|v| format!("{v:.0}"))
                .unwrap_or_else(|| "null".to_string())
        );
        Ok((financial, ml))
    }

    async fn income_fields(
        &self,
        company: &str,
        region: Option<&TableRegion>,
    ) -> Result<IncomeFields> {
        let Some(region) = region else {
            return Ok(IncomeFields::default());
        };

        let mut fields = IncomeFields::default();
        if let Some(row) = region.find_row(REVENUE_NEEDLES) {
            fields.revenue_current = row.current();
            fields.revenue_previous = row.previous();
        }
        if let Some(row) = region.find_row(NET_INCOME_NEEDLES) {
            fields.net_income_current = row.current();
            fields.net_income_previous = row.previous();
        }
        if let Some(row) = region.find_row(EPS_NEEDLES) {
            fields.eps = row.current();
        }
        fields.currency = detect_currency(&region.raw_window);

        if fields.revenue_current.is_some() {
            debug!("income statement resolved by table heuristics");
            return Ok(fields);
        }

        match self
            .normalizer
            .normalize::<IncomeFields>(Statement::Income.name(), company, &region.raw_window)
            .await
        {
            Ok(llm) => Ok(IncomeFields {
                revenue_current: self.verify(Statement::Income, "revenue_current", llm.revenue_current, region),
                revenue_previous: self.verify(Statement::Income, "revenue_previous", llm.revenue_previous, region),
                net_income_current: self.verify(Statement::Income, "net_income_current", llm.net_income_current, region),
                net_income_previous: self.verify(Statement::Income, "net_income_previous", llm.net_income_previous, region),
                eps: self.verify(Statement::Income, "eps", llm.eps, region),
                currency: llm.currency.or(fields.currency),
            }),
            Err(e @ AnalysisError::LlmUnavailable { .. }) => Err(e),
            Err(e) => {
                warn!("income statement normalization failed, keeping nulls: {}", e);
                Ok(fields)
            }
        }
    }

    async fn balance_fields(
        &self,
        company: &str,
        region: Option<&TableRegion>,
    ) -> Result<BalanceSheetFields> {
        let Some(region) = region else {
            return Ok(BalanceSheetFields::default());
        };

        let mut fields = BalanceSheetFields {
            total_assets: region.find_row(ASSETS_NEEDLES).and_then(|r| r.current()),
            total_liabilities: region
                .find_row(LIABILITIES_NEEDLES)
                .and_then(|r| r.current()),
            shareholders_equity: region.find_row(EQUITY_NEEDLES).and_then(|r| r.current()),
        };
        if fields.total_assets.is_some() {
            return Ok(fields);
        }

        match self
            .normalizer
            .normalize::<BalanceSheetFields>(
                Statement::BalanceSheet.name(),
                company,
                &region.raw_window,
            )
            .await
        {
            Ok(llm) => {
                fields.total_assets = self.verify(Statement::BalanceSheet, "total_assets", llm.total_assets, region);
                fields.total_liabilities = self.verify(Statement::BalanceSheet, "total_liabilities", llm.total_liabilities, region);
                fields.shareholders_equity = self.verify(Statement::BalanceSheet, "shareholders_equity", llm.shareholders_equity, region);
                Ok(fields)
            }
            Err(e @ AnalysisError::LlmUnavailable { .. }) => Err(e),
            Err(e) => {
                warn!("balance sheet normalization failed, keeping nulls: {}", e);
                Ok(fields)
            }
        }
    }

    async fn cash_flow_fields(
        &self,
        company: &str,
        region: Option<&TableRegion>,
    ) -> Result<CashFlowFields> {
        let Some(region) = region else {
            return Ok(CashFlowFields::default());
        };

        let mut fields = CashFlowFields {
            operating: region.find_row(OPERATING_NEEDLES).and_then(|r| r.current()),
            investing: region.find_row(INVESTING_NEEDLES).and_then(|r| r.current()),
            financing: region.find_row(FINANCING_NEEDLES).and_then(|r| r.current()),
        };
        if fields.operating.is_some() {
            return Ok(fields);
        }

        match self
            .normalizer
            .normalize::<CashFlowFields>(Statement::CashFlow.name(), company, &region.raw_window)
            .await
        {
            Ok(llm) => {
                fields.operating = self.verify(Statement::CashFlow, "operating", llm.operating, region);
                fields.investing = self.verify(Statement::CashFlow, "investing", llm.investing, region);
                fields.financing = self.verify(Statement::CashFlow, "financing", llm.financing, region);
                Ok(fields)
            }
            Err(e @ AnalysisError::LlmUnavailable { .. }) => Err(e),
            Err(e) => {
                warn!("cash flow normalization failed, keeping nulls: {}", e);
                Ok(fields)
            }
        }
    }

    async fn segment_fields(
        &self,
        company: &str,
        region: Option<&TableRegion>,
        statement_name: &str,
    ) -> Result<SegmentFields> {
        let Some(region) = region else {
            return Ok(SegmentFields::default());
        };

        let heuristic: Vec<_> = region
            .rows
            .iter()
            .filter(|row| !row.label.to_lowercase().contains("total"))
            .map(|row| crate::llm::normalizer::SegmentField {
                name: row.label.clone(),
                revenue_current: row.current(),
                revenue_previous: row.previous(),
            })
            .collect();
        if !heuristic.is_empty() {
            return Ok(SegmentFields { segments: heuristic });
        }

        match self
            .normalizer
            .normalize::<SegmentFields>(statement_name, company, &region.raw_window)
            .await
        {
            Ok(llm) => Ok(SegmentFields {
                segments: llm
                    .segments
                    .into_iter()
                    .map(|mut s| {
                        s.revenue_current = self.verify_named(statement_name, &s.name, s.revenue_current, region);
                        s.revenue_previous = self.verify_named(statement_name, &s.name, s.revenue_previous, region);
                        s
                    })
                    .collect(),
            }),
            Err(e @ AnalysisError::LlmUnavailable { .. }) => Err(e),
            Err(e) => {
                warn!("{} normalization failed, keeping empty: {}", statement_name, e);
                Ok(SegmentFields::default())
            }
        }
    }

    fn verify(
        &self,
        statement: Statement,
        field: &str,
        value: Option<f64>,
        region: &TableRegion,
    ) -> Option<f64> {
        self.normalizer
            .verify_numeric(statement.name(), field, value, &region.raw_window)
    }

    fn verify_named(
        &self,
        statement_name: &str,
        field: &str,
        value: Option<f64>,
        region: &TableRegion,
    ) -> Option<f64> {
        self.normalizer
            .verify_numeric(statement_name, field, value, &region.raw_window)
    }
}

/// Assembles the pruned numeric subset the prediction engine consumes.
fn ml_ready(
    report: &Report,
    report_year: Option<i32>,
    financial: &FinancialData,
    segments: &SegmentFields,
    key_metrics: KeyMetrics,
) -> MlReadyData {
    let year = report_year.unwrap_or_else(|| chrono::Utc::now().year());

    let mut revenue_history = Vec::new();
    if financial.revenue.previous_year.is_some() {
        revenue_history.push(YearValue {
            year: year - 1,
            value: financial.revenue.previous_year,
        });
    }
    if financial.revenue.current_year.is_some() {
        revenue_history.push(YearValue {
            year,
            value: financial.revenue.current_year,
        });
    }

    let mut net_income_history = Vec::new();
    if financial.net_income.previous_year.is_some() {
        net_income_history.push(YearValue {
            year: year - 1,
            value: financial.net_income.previous_year,
        });
    }
    if financial.net_income.current_year.is_some() {
        net_income_history.push(YearValue {
            year,
            value: financial.net_income.current_year,
        });
    }

    let segment_history = segments
        .segments
        .iter()
        .filter(|s| s.revenue_current.is_some() || s.revenue_previous.is_some())
        .map(|s| {
            let mut by_year = Vec::new();
            if s.revenue_previous.is_some() {
                by_year.push(YearValue {
                    year: year - 1,
                    value: s.revenue_previous,
                });
            }
            if s.revenue_current.is_some() {
                by_year.push(YearValue {
                    year,
                    value: s.revenue_current,
                });
            }
            SegmentSeries {
                segment: s.name.clone(),
                revenue_by_year: by_year,
            }
        })
        .collect();

    MlReadyData {
        company_name: report.company_name.clone(),
        report_year,
        industry: report.industry.clone(),
        currency: financial.revenue.currency.clone(),
        revenue_history,
        net_income_history,
        segment_history,
        total_assets: financial.total_assets,
        total_liabilities: financial.total_liabilities,
        shareholders_equity: financial.shareholders_equity,
        key_metrics,
    }
}

/// Latest plausible fiscal year mentioned in the opening pages.
fn detect_report_year(doc: &DocumentText) -> Option<i32> {
    let mut best: Option<i32> = None;
    for page in doc.pages.iter().take(3) {
        for token in page.split(|c: char| !c.is_ascii_digit()) {
            if token.len() == 4 {
                if let Ok(year) = token.parse::<i32>() {
                    if (1990..=2100).contains(&year) && best.map_or(true, |b| year > b) {
                        best = Some(year);
                    }
                }
            }
        }
    }
    best
}

fn detect_currency(window: &str) -> Option<String> {
    let lower = window.to_lowercase();
    if lower.contains("eur") || window.contains('€') {
        Some("EUR".to_string())
    } else if lower.contains("gbp") || window.contains('£') {
        Some("GBP".to_string())
    } else if lower.contains("jpy") || window.contains('¥') {
        Some("JPY".to_string())
    } else if lower.contains("usd") || window.contains('$') {
        Some("USD".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::llm::{LlmClient, LlmRequest};
    use crate::schema::{ReportId, ReportStatus};
    use async_trait::async_trait;
    use chrono::Utc;

    /// A model double that must never be reached; table heuristics should
    /// satisfy these fixtures on their own.
    struct UnreachableLlm;

    #[async_trait]
    impl LlmClient for UnreachableLlm {
        async fn generate(&self, request: LlmRequest) -> crate::error::Result<String> {
            panic!("unexpected model call: {}", request.user_prompt);
        }
    }

    /// A model double standing in for a provider outage.
    struct DownLlm {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for DownLlm {
        async fn generate(&self, _request: LlmRequest) -> crate::error::Result<String> {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(AnalysisError::LlmUnavailable {
                attempts: 1,
                reason: "503 from provider".to_string(),
            })
        }
    }

    fn report(filename: &str) -> Report {
        Report {
            id: ReportId(1),
            company_name: "Acme Corp".to_string(),
            report_year: Some(2023),
            filename: filename.to_string(),
            status: ReportStatus::Processing,
            created_at: Utc::now(),
            extracted_data_path: None,
            ml_data_path: None,
            industry: Some("Technology".to_string()),
        }
    }

    fn extractor() -> DocumentExtractor {
        DocumentExtractor::new(
            Arc::new(UnreachableLlm),
            &crate::config::PipelineConfig::default(),
        )
    }

    const FIXTURE: &str = "\
Acme Corp Annual Report 2023
(in millions)

Consolidated Statements of Operations
Total revenue                61,858    51,728
Cost of sales                30,000    26,000
Net income                   12,100     9,800
Basic earnings per share      4.21      3.40

Consolidated Balance Sheet
Total assets                120,500   110,000
Total liabilities            70,400    66,300
Total shareholders' equity   50,100    43,700

Consolidated Statements of Cash Flows
Net cash from operating activities    18,200    15,100
Net cash from investing activities    -6,400    -5,900
Net cash from financing activities    -9,100    -7,200

Operating Segments
Cloud                        40,000    32,000
Hardware                     21,858    19,728
";

    #[tokio::test]
    async fn heuristics_extract_a_clean_text_report() {
        let (financial, ml) = extractor()
            .extract(&report("acme-2023.txt"), FIXTURE.as_bytes())
            .await
            .unwrap();

        // "(in millions)" applies to every figure.
        assert_eq!(financial.revenue.current_year, Some(61_858_000_000.0));
        assert_eq!(financial.revenue.previous_year, Some(51_728_000_000.0));
        assert_eq!(financial.net_income.current_year, Some(12_100_000_000.0));
        assert_eq!(financial.total_assets, Some(120_500_000_000.0));
        assert_eq!(financial.cash_flow.operating, Some(18_200_000_000.0));
        assert!(financial.cash_flow.investing.unwrap() < 0.0);
        assert_eq!(financial.segment_revenue.len(), 2);

        assert_eq!(ml.revenue_history.len(), 2);
        assert_eq!(ml.revenue_history[0].year, 2022);
        assert_eq!(ml.revenue_history[1].year, 2023);
        assert_eq!(ml.segment_history.len(), 2);
        assert!(ml.key_metrics.roe.is_some());
        assert!(ml.key_metrics.debt_to_equity.is_some());
    }

    #[tokio::test]
    async fn an_exhausted_model_outage_fails_the_document() {
        let down = Arc::new(DownLlm {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let config = crate::config::PipelineConfig {
            llm_backoff_base: std::time::Duration::from_millis(1),
            ..Default::default()
        };
        let extractor = DocumentExtractor::new(down.clone(), &config);

        // Income anchor with no revenue row, so the model fallback must run.
        let text = "Consolidated Statements of Operations\n\
                    Cost of sales    30,000    26,000\n";
        let err = extractor
            .extract(&report("sparse.txt"), text.as_bytes())
            .await
            .unwrap_err();

        match err {
            AnalysisError::LlmUnavailable { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected LlmUnavailable, got {:?}", other),
        }
        assert_eq!(down.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn prose_without_tables_or_vocabulary_is_rejected() {
        let text = "A pleasant story about gardening.\nNothing numeric happens.\n";
        let err = extractor()
            .extract(&report("garden.txt"), text.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoExtractableTables(_)));
    }

    #[tokio::test]
    async fn docx_bytes_are_unsupported() {
        let bytes = b"PK\x03\x04rest-of-zip";
        let err = extractor()
            .extract(&report("report.docx"), bytes)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedFormat(_)));
    }

    #[test]
    fn report_year_detection_prefers_the_latest_plausible_year() {
        let doc = DocumentText {
            pages: vec!["Annual Report 2023 covering fiscal 2022 and 2023".to_string()],
        };
        assert_eq!(detect_report_year(&doc), Some(2023));
    }

    #[test]
    fn currency_detection_prefers_explicit_codes() {
        assert_eq!(detect_currency("amounts in EUR millions"), Some("EUR".to_string()));
        assert_eq!(detect_currency("$ in millions"), Some("USD".to_string()));
        assert_eq!(detect_currency("plain numbers"), None);
    }
}
