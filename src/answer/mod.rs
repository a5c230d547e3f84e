//! Answer service clients.
//!
//! An [`AnswerService`] turns an assembled prompt into generated text with a
//! single logical call to a hosted chat-completion API. Transient failures
//! (HTTP 429/5xx, transport errors, timeouts) are retried inside the client
//! according to `answer.max_retries`; everything that remains is reported as
//! [`Error::AnswerService`](crate::error::Error::AnswerService).
//!
//! | Config Value | Client | Credentials |
//! |-------------|--------|-------------|
//! | `"gemini"` | [`GeminiClient`] | `GOOGLE_API_KEY` or `GEMINI_API_KEY` |
//! | `"openai"` | [`OpenAIClient`] | `OPENAI_API_KEY` |

mod gemini;
mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAIClient;

use anyhow::bail;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::AnswerConfig;
use crate::error::Result;
use crate::models::{AnswerResult, RetrievedDocument};

#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Remote model identifier.
    fn model_name(&self) -> &str;

    /// Send `prompt` and return the generated text.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate an answer and attach the documents the prompt was built from.
    ///
    /// The source documents are returned as given, in retrieval order; the
    /// remote service does not re-rank them.
    async fn answer(&self, prompt: &str, documents: &[RetrievedDocument]) -> Result<AnswerResult> {
        let result = self.generate(prompt).await?;
        Ok(AnswerResult {
            result,
            source_documents: documents.to_vec(),
        })
    }
}

/// Create the [`AnswerService`] named by `config.provider`, reading
/// credentials from the environment.
pub fn create_answer_service(config: &AnswerConfig) -> anyhow::Result<Arc<dyn AnswerService>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiClient::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIClient::new(config)?)),
        other => bail!("Unknown answer provider: {}", other),
    }
}
