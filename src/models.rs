//! Core data models used throughout the advisor.
//!
//! These types represent the chat messages, retrieved documents, and answers
//! that flow through a single conversation turn.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Author of a chat message.
///
/// Ordering is significant: [`SessionContext`] renders roles in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in a session's transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Last-seen content per role, replayed from the transcript each turn.
///
/// Only used as auxiliary prompt context; the transcript itself stays
/// authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    entries: BTreeMap<Role, String>,
}

impl SessionContext {
    /// Replay `messages` in order; later messages overwrite earlier ones
    /// for the same role.
    pub fn from_messages(messages: &[Message]) -> Self {
        let mut entries = BTreeMap::new();
        for m in messages {
            entries.insert(m.role, m.content.clone());
        }
        Self { entries }
    }

    pub fn get(&self, role: Role) -> Option<&str> {
        self.entries.get(&role).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as `role: content` lines, user first.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(role, content)| format!("{}: {}", role, content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Metadata attached to an indexed document.
///
/// `source_url` is mandatory; any other fields from the corpus are kept
/// verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source_url: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A document returned by top-k retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub metadata: DocumentMetadata,
    /// Cosine similarity to the query embedding.
    pub score: f32,
}

/// The three values substituted into the prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPayload {
    pub session_context: String,
    pub context: String,
    pub question: String,
}

/// Generated answer plus the documents that were supplied to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResult {
    pub result: String,
    pub source_documents: Vec<RetrievedDocument>,
}
