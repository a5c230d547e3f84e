//! OpenAI-compatible `/v1/chat/completions` client.

use anyhow::anyhow;
use async_trait::async_trait;

use super::AnswerService;
use crate::config::{api_key_from_env, AnswerConfig};
use crate::error::{Error, Result};
use crate::http::{client_with_timeout, send_json_with_retry, RetryPolicy};

const BASE_URL: &str = "https://api.openai.com";

pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    base_url: String,
    policy: RetryPolicy,
}

impl OpenAIClient {
    /// Create a client reading the API key from `OPENAI_API_KEY`.
    pub fn new(config: &AnswerConfig) -> anyhow::Result<Self> {
        let api_key = api_key_from_env(&["OPENAI_API_KEY"])?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &AnswerConfig, api_key: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: client_with_timeout(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            base_url: config.url.clone().unwrap_or_else(|| BASE_URL.to_string()),
            policy: RetryPolicy::new(config.max_retries, config.backoff_ms),
        })
    }
}

#[async_trait]
impl AnswerService for OpenAIClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let json = send_json_with_retry("OpenAI API", &self.policy, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await
        .map_err(|e| Error::AnswerService(format!("{:#}", e)))?;

        parse_chat_response(&json).map_err(|e| Error::AnswerService(e.to_string()))
    }
}

/// Extracts `choices[0].message.content`.
fn parse_chat_response(json: &serde_json::Value) -> anyhow::Result<String> {
    let content = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))?;

    if content.trim().is_empty() {
        return Err(anyhow!("OpenAI API returned an empty answer"));
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_choice() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "answer" } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "answer");
    }

    #[test]
    fn missing_choices_is_error() {
        let json = serde_json::json!({ "error": "nope" });
        assert!(parse_chat_response(&json).is_err());
    }
}
