//! One conversation turn, end to end.
//!
//! ```text
//! input ──blank──▶ Ignored
//!   │
//!   └─▶ push user msg ─▶ retrieve(top_k) ─▶ assemble ─▶ answer
//!                             │                          │
//!                             └──── error ──▶ Failed ◀───┤
//!                                                        ▼
//!                                     push assistant msg, Answered
//! ```
//!
//! The session context handed to the prompt is rebuilt from the transcript
//! *before* the current question is appended, so it describes the previous
//! exchange only. A failed turn leaves the user message in the transcript
//! and adds no assistant message.

use anyhow::Context;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::answer::{self, AnswerService};
use crate::config::Config;
use crate::embedding;
use crate::error::Error;
use crate::models::{Role, RetrievedDocument};
use crate::prompt::PromptTemplate;
use crate::session::Session;
use crate::store::{Retriever, VectorStore};

/// Result of [`Orchestrator::handle_turn`].
#[derive(Debug)]
pub enum TurnOutcome {
    /// Blank input; the session was not touched.
    Ignored,
    Answered {
        answer: String,
        /// Source URLs, deduplicated in first-seen order.
        citations: Vec<String>,
    },
    Failed { error: Error },
}

pub struct Orchestrator {
    retriever: Arc<dyn Retriever>,
    answer: Arc<dyn AnswerService>,
    template: PromptTemplate,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        answer: Arc<dyn AnswerService>,
        template: PromptTemplate,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            answer,
            template,
            top_k,
        }
    }

    /// Wire up the configured embedding provider, index, and answer
    /// service.
    ///
    /// The index is loaded before the answer service is created, so an
    /// unavailable store aborts startup before any turn is accepted.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = embedding::create_provider(&config.embedding)
            .context("Failed to create embedding provider")?;
        let store = VectorStore::load(&config.index.path, embedder, config.index.trusted).await?;
        let answer = answer::create_answer_service(&config.answer)
            .context("Failed to create answer service")?;
        info!(
            documents = store.len(),
            answer_model = answer.model_name(),
            top_k = config.index.top_k,
            "advisor ready"
        );

        Ok(Self::new(
            Arc::new(store),
            answer,
            config.prompt_template()?,
            config.index.top_k,
        ))
    }

    pub async fn handle_turn(&self, session: &mut Session, input: &str) -> TurnOutcome {
        if input.trim().is_empty() {
            return TurnOutcome::Ignored;
        }

        let session_id = session.id;
        let context = session.context();
        session.push(Role::User, input);

        let result = async {
            let documents = self.retriever.retrieve(input, self.top_k).await?;
            let prompt = self.template.assemble(&context, &documents, input);
            debug!(
                session = %session_id,
                documents = documents.len(),
                prompt_chars = prompt.chars().count(),
                "prompt assembled"
            );
            self.answer.answer(&prompt, &documents).await
        }
        .await;

        match result {
            Ok(answer) => {
                let citations = dedup_citations(&answer.source_documents);
                session.push(Role::Assistant, answer.result.clone());
                TurnOutcome::Answered {
                    answer: answer.result,
                    citations,
                }
            }
            Err(e) => {
                error!(session = %session_id, code = e.code(), error = %e, "turn failed");
                TurnOutcome::Failed { error: e }
            }
        }
    }
}

/// Source URLs of `documents` with repeats removed, first occurrence wins.
pub fn dedup_citations(documents: &[RetrievedDocument]) -> Vec<String> {
    let mut seen = HashSet::new();
    documents
        .iter()
        .map(|d| d.metadata.source_url.as_str())
        .filter(|url| seen.insert(*url))
        .map(str::to_string)
        .collect()
}
