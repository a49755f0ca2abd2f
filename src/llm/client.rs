use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// One stateless prompted call. Field-group normalization and insight
/// generation both go through this shape.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// JSON schema the response must conform to, when structured output is wanted.
    pub response_schema: Option<serde_json::Value>,
}

/// Seam for prompted model calls. Injected into the extractor, normalizer,
/// and insight generator so tests can substitute a scripted double.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the model's raw text response (JSON when a schema was given).
    async fn generate(&self, request: LlmRequest) -> Result<String>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<Part>,
}

/// Google Gemini client. Cheap to clone; holds only the pooled HTTP client.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AnalysisError::ConfigError(format!("HTTP client construction failed: {}", e))
        })?;
        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    /// Reads GEMINI_API_KEY from the environment.
    pub fn from_env(model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| AnalysisError::ConfigError("GEMINI_API_KEY is not set".to_string()))?;
        Self::new(api_key, model, timeout)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, request: LlmRequest) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part::Text {
                    text: request.user_prompt,
                }],
            }],
            system_instruction: Some(Content {
                role: "user".to_string(),
                parts: vec![Part::Text {
                    text: request.system_prompt,
                }],
            }),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: request.response_schema,
            },
        };

        let res = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AnalysisError::LlmUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;

        let status = res.status();
        if !status.is_success() {
            let err_text = res.text().await.unwrap_or_default();
            // Rate limits and server faults are transient; anything else is a
            // request we built wrong and retrying will not help.
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(AnalysisError::LlmUnavailable {
                    attempts: 1,
                    reason: format!("Gemini API status {}: {}", status, err_text),
                });
            }
            return Err(AnalysisError::LlmParseError(format!(
                "Gemini API rejected the request (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse =
            res.json().await.map_err(|e| AnalysisError::LlmUnavailable {
                attempts: 1,
                reason: format!("response body read failed: {}", e),
            })?;

        let part = body
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content.parts.into_iter().next())
            .ok_or_else(|| {
                AnalysisError::LlmParseError("no candidates in model response".to_string())
            })?;

        let Part::Text { text } = part;
        Ok(text)
    }
}

/// Trims markdown fences and leading prose around the first JSON value.
pub fn clean_json_output(raw: &str) -> String {
    let obj_start = raw.find('{');
    let arr_start = raw.find('[');

    let span = match (obj_start, arr_start) {
        (Some(o), Some(a)) if a < o => raw.find('[').zip(raw.rfind(']')),
        (Some(_), _) => obj_start.zip(raw.rfind('}')),
        (None, Some(_)) => arr_start.zip(raw.rfind(']')),
        (None, None) => None,
    };

    match span {
        Some((start, end)) if end > start => raw[start..=end].to_string(),
        _ => raw.trim().to_string(),
    }
}
