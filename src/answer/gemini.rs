//! Gemini `generateContent` client.

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AnswerService;
use crate::config::{api_key_from_env, AnswerConfig};
use crate::error::{Error, Result};
use crate::http::{client_with_timeout, send_json_with_retry, RetryPolicy};

const BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Client for `POST /v1beta/models/{model}:generateContent`.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    base_url: String,
    policy: RetryPolicy,
}

impl GeminiClient {
    /// Create a client reading the API key from `GOOGLE_API_KEY` or
    /// `GEMINI_API_KEY`.
    pub fn new(config: &AnswerConfig) -> anyhow::Result<Self> {
        let api_key = api_key_from_env(&["GOOGLE_API_KEY", "GEMINI_API_KEY"])?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &AnswerConfig, api_key: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: client_with_timeout(config.timeout_secs)?,
            api_key,
            model: config.model.trim_start_matches("models/").to_string(),
            temperature: config.temperature,
            base_url: config.url.clone().unwrap_or_else(|| BASE_URL.to_string()),
            policy: RetryPolicy::new(config.max_retries, config.backoff_ms),
        })
    }

    fn request_body(&self, prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl AnswerService for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = self.request_body(prompt);

        let json = send_json_with_retry("Gemini API", &self.policy, || {
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await
        .map_err(|e| Error::AnswerService(format!("{:#}", e)))?;

        let text = extract_text(json).map_err(|e| Error::AnswerService(e.to_string()))?;
        debug!(model = %self.model, chars = text.chars().count(), "gemini answered");
        Ok(text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Concatenate the text parts of the first candidate.
fn extract_text(json: serde_json::Value) -> anyhow::Result<String> {
    let response: GenerateContentResponse = serde_json::from_value(json)
        .map_err(|e| anyhow!("malformed Gemini response: {}", e))?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(anyhow!("Gemini blocked the prompt: {}", reason));
    }

    let text: String = response
        .candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(anyhow!("Gemini API returned no text in the response candidates"));
    }
    Ok(text)
}
