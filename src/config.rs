//! TOML configuration parsing and validation.
//!
//! Every section except `[index]` is optional and falls back to the defaults
//! of the SFC syllabus advisor deployment (Gemini for both embeddings and
//! answers, top-10 retrieval, Japanese UI strings).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::prompt::{PromptTemplate, DEFAULT_TEMPLATE};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory containing `index.sqlite`.
    pub path: PathBuf,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Operator opt-in: the index at `path` comes from a trusted origin.
    #[serde(default)]
    pub trusted: bool,
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama host, proxies, test servers).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_embedding_provider() -> String {
    "gemini".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    2
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_backoff_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default = "default_answer_provider")]
    pub provider: String,
    #[serde(default = "default_answer_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_answer_retries")]
    pub max_retries: u32,
    #[serde(default = "default_answer_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            provider: default_answer_provider(),
            model: default_answer_model(),
            temperature: 0.0,
            max_retries: default_answer_retries(),
            timeout_secs: default_answer_timeout(),
            backoff_ms: default_backoff_ms(),
            url: None,
        }
    }
}

fn default_answer_provider() -> String {
    "gemini".to_string()
}
fn default_answer_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_answer_retries() -> u32 {
    2
}
fn default_answer_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_template")]
    pub template: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: default_template(),
        }
    }
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct UiConfig {
    #[serde(default = "default_page_title")]
    pub page_title: String,
    #[serde(default = "default_page_icon")]
    pub page_icon: String,
    #[serde(default = "default_input_placeholder")]
    pub input_placeholder: String,
    #[serde(default = "default_typing_indicator")]
    pub typing_indicator: String,
    #[serde(default = "default_citation_prefix")]
    pub citation_prefix: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            page_title: default_page_title(),
            page_icon: default_page_icon(),
            input_placeholder: default_input_placeholder(),
            typing_indicator: default_typing_indicator(),
            citation_prefix: default_citation_prefix(),
        }
    }
}

fn default_page_title() -> String {
    "オリジナルチャットボット".to_string()
}
fn default_page_icon() -> String {
    "🧑‍💻".to_string()
}
fn default_input_placeholder() -> String {
    "質問しよう！".to_string()
}
fn default_typing_indicator() -> String {
    "Gemini is typing ...".to_string()
}
fn default_citation_prefix() -> String {
    "参考元：".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Sessions idle for longer than this are dropped.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}
fn default_session_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// The validated prompt template.
    pub fn prompt_template(&self) -> Result<PromptTemplate> {
        PromptTemplate::new(&self.prompt.template)
    }
}

/// Read the first non-empty credential among `vars` from the environment.
pub fn api_key_from_env(vars: &[&str]) -> Result<String> {
    vars.iter()
        .find_map(|v| std::env::var(v).ok().filter(|k| !k.trim().is_empty()))
        .ok_or_else(|| anyhow::anyhow!("{} environment variable not set", vars.join(" or ")))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

/// Upper bound for `backoff_ms`; larger values would stall a turn for hours.
const MAX_BACKOFF_MS: u64 = 600_000;

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate retrieval
    if config.index.top_k == 0 {
        anyhow::bail!("index.top_k must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "gemini" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be gemini, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.backoff_ms > MAX_BACKOFF_MS {
        anyhow::bail!("embedding.backoff_ms must be <= {}", MAX_BACKOFF_MS);
    }

    // Validate answer service
    match config.answer.provider.as_str() {
        "gemini" | "openai" => {}
        other => anyhow::bail!(
            "Unknown answer provider: '{}'. Must be gemini or openai.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.answer.temperature) {
        anyhow::bail!("answer.temperature must be in [0.0, 2.0]");
    }
    if config.answer.model.trim().is_empty() {
        anyhow::bail!("answer.model must not be empty");
    }
    if config.answer.backoff_ms > MAX_BACKOFF_MS {
        anyhow::bail!("answer.backoff_ms must be <= {}", MAX_BACKOFF_MS);
    }

    if config.server.session_ttl_secs == 0 {
        anyhow::bail!("server.session_ttl_secs must be > 0");
    }

    config
        .prompt_template()
        .with_context(|| "Invalid prompt.template")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[index]
path = "./faiss_store"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.index.top_k, 10);
        assert!(!cfg.index.trusted);
        assert_eq!(cfg.answer.provider, "gemini");
        assert_eq!(cfg.answer.model, "gemini-1.5-flash");
        assert_eq!(cfg.answer.temperature, 0.0);
        assert_eq!(cfg.answer.max_retries, 2);
        assert_eq!(cfg.embedding.provider, "gemini");
        assert_eq!(cfg.ui.citation_prefix, "参考元：");
        assert_eq!(cfg.prompt.template, DEFAULT_TEMPLATE);
        assert_eq!(cfg.server.session_ttl_secs, 3600);
    }

    #[test]
    fn rejects_zero_top_k() {
        let err = parse_config(
            r#"
[index]
path = "./idx"
top_k = 0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn rejects_unknown_answer_provider() {
        let err = parse_config(
            r#"
[index]
path = "./idx"

[answer]
provider = "palm"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown answer provider"));
    }

    #[test]
    fn rejects_template_without_question() {
        let err = parse_config(
            r#"
[index]
path = "./idx"

[prompt]
template = "only {context}"
"#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("{question}"));
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let err = parse_config(
            r#"
[index]
path = "./idx"

[answer]
temperature = 3.5
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn rejects_huge_backoff() {
        for section in ["embedding", "answer"] {
            let err = parse_config(&format!(
                "[index]\npath = \"./idx\"\n\n[{}]\nbackoff_ms = 9223372036854775807\n",
                section
            ))
            .unwrap_err();
            assert!(
                err.to_string().contains(&format!("{}.backoff_ms", section)),
                "{:#}",
                err
            );
        }
    }

    #[test]
    fn rejects_zero_session_ttl() {
        let err = parse_config(
            r#"
[index]
path = "./idx"

[server]
session_ttl_secs = 0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("session_ttl_secs"));
    }
}
