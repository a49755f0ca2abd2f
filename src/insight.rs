//! LLM-backed insight generation: investment leads and executive summaries.
//!
//! Both calls inject only extracted figures and prediction output as
//! evidence, never raw document text, so the model cannot quote numbers the
//! pipeline has not verified. A leads response that fails to parse gets
//! exactly one repair re-prompt carrying the bad output and the parse error
//! before the failure is surfaced.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;

use crate::config::PipelineConfig;
use crate::error::{AnalysisError, Result};
use crate::llm::client::{clean_json_output, LlmClient, LlmRequest};
use crate::llm::prompts::{
    leads_repair_prompt, leads_user_prompt, summary_user_prompt, LEADS_SYSTEM_PROMPT,
    SUMMARY_SYSTEM_PROMPT,
};
use crate::llm::retry::with_retries;
use crate::schema::{FinancialData, InvestmentLeads, Predictions};

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    summary: String,
}

pub struct InsightGenerator {
    client: Arc<dyn LlmClient>,
    max_retries: usize,
    backoff_base: Duration,
}

impl InsightGenerator {
    pub fn new(client: Arc<dyn LlmClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            max_retries: config.llm_max_retries,
            backoff_base: config.llm_backoff_base,
        }
    }

    pub async fn generate_leads(
        &self,
        financial: &FinancialData,
        predictions: Option<&Predictions>,
    ) -> Result<InvestmentLeads> {
        let evidence = build_evidence(financial, predictions);
        let schema = serde_json::to_value(InvestmentLeads::generate_json_schema())?;
        let request = LlmRequest {
            system_prompt: LEADS_SYSTEM_PROMPT.to_string(),
            user_prompt: leads_user_prompt(&financial.company_name, &evidence),
            response_schema: Some(schema.clone()),
        };

        let raw = with_retries("generate leads", self.max_retries, self.backoff_base, || {
            self.client.generate(request.clone())
        })
        .await?;
        let cleaned = clean_json_output(&raw);

        let first_error = match serde_json::from_str::<InvestmentLeads>(&cleaned) {
            Ok(leads) => return Ok(leads),
            Err(e) => e,
        };
        warn!(
            "leads response failed to parse ({}), issuing one repair prompt",
            first_error
        );

        let repair = LlmRequest {
            system_prompt: LEADS_SYSTEM_PROMPT.to_string(),
            user_prompt: leads_repair_prompt(
                &financial.company_name,
                &evidence,
                &cleaned,
                &first_error.to_string(),
            ),
            response_schema: Some(schema),
        };
        let raw = with_retries("repair leads", self.max_retries, self.backoff_base, || {
            self.client.generate(repair.clone())
        })
        .await?;
        let cleaned = clean_json_output(&raw);
        serde_json::from_str(&cleaned).map_err(|e| {
            AnalysisError::LlmParseError(format!(
                "leads response unparseable after repair prompt: {}",
                e
            ))
        })
    }

    /// Executive summary with SWOT as markdown prose. A response that is not
    /// the expected JSON envelope but still reads as text is used as-is;
    /// analyst prose is the payload here, not structure.
    pub async fn generate_summary(
        &self,
        financial: &FinancialData,
        predictions: Option<&Predictions>,
    ) -> Result<String> {
        let evidence = build_evidence(financial, predictions);
        let request = LlmRequest {
            system_prompt: SUMMARY_SYSTEM_PROMPT.to_string(),
            user_prompt: summary_user_prompt(&financial.company_name, &evidence),
            response_schema: None,
        };

        let raw = with_retries(
            "generate summary",
            self.max_retries,
            self.backoff_base,
            || self.client.generate(request.clone()),
        )
        .await?;
        let cleaned = clean_json_output(&raw);

        match serde_json::from_str::<SummaryResponse>(&cleaned) {
            Ok(response) if !response.summary.trim().is_empty() => Ok(response.summary),
            Ok(_) => Err(AnalysisError::LlmParseError(
                "summary response was empty".to_string(),
            )),
            Err(e) => {
                let text = raw.trim();
                if text.is_empty() || text.starts_with('{') {
                    return Err(AnalysisError::LlmParseError(format!(
                        "summary response unparseable: {}",
                        e
                    )));
                }
                debug!("summary arrived as plain prose, using it directly");
                Ok(text.to_string())
            }
        }
    }
}

/// Flattens extracted figures and prediction output into labelled evidence
/// lines. Null figures are omitted entirely rather than printed as zero.
pub fn build_evidence(financial: &FinancialData, predictions: Option<&Predictions>) -> String {
    let mut lines = Vec::new();
    if let Some(year) = financial.report_year {
        lines.push(format!("Fiscal year: {year}"));
    }
    if let Some(currency) = &financial.revenue.currency {
        lines.push(format!("Reporting currency: {currency}"));
    }

    let mut push = |label: &str, value: Option<f64>| {
        if let Some(v) = value {
            lines.push(format!("{label}: {v:.2}"));
        }
    };
    push("Revenue (current year)", financial.revenue.current_year);
    push("Revenue (prior year)", financial.revenue.previous_year);
    push("Net income (current year)", financial.net_income.current_year);
    push("Net income (prior year)", financial.net_income.previous_year);
    push("Total assets", financial.total_assets);
    push("Total liabilities", financial.total_liabilities);
    push("Shareholders' equity", financial.shareholders_equity);
    push("Operating cash flow", financial.cash_flow.operating);
    push("Investing cash flow", financial.cash_flow.investing);
    push("Financing cash flow", financial.cash_flow.financing);
    push("EPS", financial.key_metrics.eps);
    push("ROE (%)", financial.key_metrics.roe);
    push("Debt-to-equity", financial.key_metrics.debt_to_equity);

    for segment in &financial.segment_revenue {
        if let Some(revenue) = segment.revenue {
            lines.push(format!("Segment {}: {revenue:.2}", segment.segment));
        }
    }
    for region in &financial.geographic_revenue {
        if let Some(revenue) = region.revenue {
            lines.push(format!("Region {}: {revenue:.2}", region.region));
        }
    }

    if let Some(predictions) = predictions.filter(|p| p.success) {
        if let Some(growth) = &predictions.growth_rate {
            lines.push(format!(
                "Predicted revenue growth: {:.1}% ({:.0}% CI {:.1}% to {:.1}%)",
                growth.predicted,
                growth.confidence_level * 100.0,
                growth.confidence_lower,
                growth.confidence_upper
            ));
        }
        for forecast in &predictions.sales_forecast {
            lines.push(format!(
                "Forecast {}: {:.0} ({:.0} to {:.0})",
                forecast.year,
                forecast.predicted_revenue,
                forecast.confidence_lower,
                forecast.confidence_upper
            ));
        }
        if let Some(risk) = &predictions.risk_metrics {
            lines.push(format!(
                "Risk: {} (score {}), financial health {:.0}/100, growth volatility {:.1}pp",
                risk.risk_level, risk.risk_score, risk.financial_health_score, risk.volatility
            ));
        }
        if predictions.fallback_used {
            lines.push("Note: growth projections use an industry benchmark profile".to_string());
        }
    }

    lines.join("\n")
}
