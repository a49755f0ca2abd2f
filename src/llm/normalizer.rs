//! Field-group normalization of raw statement text via prompted LLM calls.
//!
//! Each statement is normalized independently (stateless per field-group),
//! which bounds prompt size and lets one group's failure stay local. The
//! model is never trusted with arithmetic: every numeric it returns must be
//! verifiable against the source fragment or it is discarded to null.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{AnalysisError, Result};
use crate::llm::client::{clean_json_output, LlmClient, LlmRequest};
use crate::llm::prompts::{normalizer_user_prompt, NORMALIZER_SYSTEM_PROMPT};
use crate::llm::retry::with_retries;
use crate::tables::parse_money;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct IncomeFields {
    #[schemars(description = "Total revenue for the current fiscal year, or null")]
    pub revenue_current: Option<f64>,
    #[schemars(description = "Total revenue for the prior fiscal year, or null")]
    pub revenue_previous: Option<f64>,
    #[schemars(description = "Net income for the current fiscal year, or null")]
    pub net_income_current: Option<f64>,
    #[schemars(description = "Net income for the prior fiscal year, or null")]
    pub net_income_previous: Option<f64>,
    #[schemars(description = "Basic earnings per share, or null")]
    pub eps: Option<f64>,
    #[schemars(description = "ISO 4217 currency code of the statement, or null")]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BalanceSheetFields {
    #[schemars(description = "Total assets at fiscal year end, or null")]
    pub total_assets: Option<f64>,
    #[schemars(description = "Total liabilities at fiscal year end, or null")]
    pub total_liabilities: Option<f64>,
    #[schemars(description = "Total shareholders' equity at fiscal year end, or null")]
    pub shareholders_equity: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CashFlowFields {
    #[schemars(description = "Net cash from operating activities, or null")]
    pub operating: Option<f64>,
    #[schemars(description = "Net cash from investing activities, or null")]
    pub investing: Option<f64>,
    #[schemars(description = "Net cash from financing activities, or null")]
    pub financing: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SegmentField {
    #[schemars(description = "Segment or region name exactly as printed")]
    pub name: String,
    #[schemars(description = "Revenue for the current fiscal year, or null")]
    pub revenue_current: Option<f64>,
    #[schemars(description = "Revenue for the prior fiscal year, or null")]
    pub revenue_previous: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SegmentFields {
    pub segments: Vec<SegmentField>,
}

pub struct Normalizer {
    client: Arc<dyn LlmClient>,
    max_retries: usize,
    backoff_base: Duration,
}

impl Normalizer {
    pub fn new(client: Arc<dyn LlmClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            max_retries: config.llm_max_retries,
            backoff_base: config.llm_backoff_base,
        }
    }

    /// Normalizes one statement fragment into typed fields.
    ///
    /// Transient model failures are retried here; a response that cannot be
    /// coerced to the schema is an `LlmParseError` the caller downgrades to
    /// null fields rather than a document failure.
    pub async fn normalize<T>(
        &self,
        statement_name: &str,
        company: &str,
        fragment: &str,
    ) -> Result<T>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T))?;
        let request = LlmRequest {
            system_prompt: NORMALIZER_SYSTEM_PROMPT.to_string(),
            user_prompt: normalizer_user_prompt(statement_name, company, fragment),
            response_schema: Some(schema),
        };

        let label = format!("normalize {}", statement_name);
        let raw = with_retries(&label, self.max_retries, self.backoff_base, || {
            self.client.generate(request.clone())
        })
        .await?;

        let cleaned = clean_json_output(&raw);
        serde_json::from_str(&cleaned).map_err(|e| {
            AnalysisError::LlmParseError(format!(
                "{}: response not coercible to schema: {}",
                statement_name, e
            ))
        })
    }

    /// Nulls out any numeric field whose value cannot be located in the
    /// source fragment. The normalizer reports what the document says, not
    /// what the model believes.
    pub fn verify_numeric(
        &self,
        statement_name: &str,
        field: &str,
        value: Option<f64>,
        fragment: &str,
    ) -> Option<f64> {
        let v = value?;
        if number_in_text(v, fragment) {
            Some(v)
        } else {
            warn!(
                "{}: discarding unverifiable {}={} (not present in source fragment)",
                statement_name, field, v
            );
            None
        }
    }
}

/// True when `value` appears among the fragment's numeric tokens, allowing
/// for thousands separators, sign conventions, and the magnitude scaling a
/// "(in millions)" header implies.
pub fn number_in_text(value: f64, fragment: &str) -> bool {
    if !value.is_finite() {
        return false;
    }
    let candidates: Vec<f64> = fragment
        .split_whitespace()
        .filter_map(parse_money)
        .collect();

    debug!("verifying {} against {} numeric tokens", value, candidates.len());
    candidates.iter().any(|&token| scaled_match(value, token))
}

fn scaled_match(value: f64, token: f64) -> bool {
    const SCALES: [f64; 4] = [1.0, 1e3, 1e6, 1e9];
    SCALES.iter().any(|&s| {
        approx_eq(value.abs(), token.abs() * s) || approx_eq(value.abs() * s, token.abs())
    })
}

fn approx_eq(a: f64, b: f64) -> bool {
    if a == 0.0 && b == 0.0 {
        return true;
    }
    let scale = a.abs().max(b.abs());
    (a - b).abs() <= scale * 1e-6
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CannedLlm {
        response: String,
    }

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn generate(&self, _request: LlmRequest) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    fn normalizer(response: &str) -> Normalizer {
        Normalizer::new(
            Arc::new(CannedLlm {
                response: response.to_string(),
            }),
            &PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn parses_income_fields_from_fenced_json() {
        let n = normalizer(
            "```json\n{\"revenue_current\": 61858000000.0, \"revenue_previous\": null, \
             \"net_income_current\": null, \"net_income_previous\": null, \
             \"eps\": null, \"currency\": \"USD\"}\n```",
        );
        let fields: IncomeFields = n
            .normalize("income statement", "Acme", "Revenue 61,858")
            .await
            .unwrap();
        assert_eq!(fields.revenue_current, Some(61_858_000_000.0));
        assert!(fields.net_income_current.is_none());
    }

    #[tokio::test]
    async fn garbage_response_is_a_parse_error() {
        let n = normalizer("the revenue was very strong this year");
        let err = n
            .normalize::<IncomeFields>("income statement", "Acme", "Revenue 100")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::LlmParseError(_)));
    }

    #[test]
    fn fabricated_numbers_are_discarded() {
        let n = normalizer("{}");
        let fragment = "Total revenue 61,858  51,728 (in millions)";
        // Present, directly.
        assert_eq!(
            n.verify_numeric("income", "revenue", Some(61_858.0), fragment),
            Some(61_858.0)
        );
        // Present through the millions scale.
        assert_eq!(
            n.verify_numeric("income", "revenue", Some(61_858_000_000.0), fragment),
            Some(61_858_000_000.0)
        );
        // Fabricated: nowhere in the fragment at any scale.
        assert_eq!(
            n.verify_numeric("income", "revenue", Some(42_000.0), fragment),
            None
        );
        // Null stays null.
        assert_eq!(n.verify_numeric("income", "revenue", None, fragment), None);
    }

    #[test]
    fn negative_parenthesised_values_verify() {
        assert!(number_in_text(-7_890.0, "Net cash used (7,890)"));
        assert!(number_in_text(-7_890_000.0, "Net cash used (7,890) in thousands"));
    }
}
