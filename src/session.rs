//! Per-conversation state.
//!
//! A [`Session`] owns the transcript of one chat. It is created on the first
//! turn and dropped (or [`reset`](Session::reset)) on teardown; nothing about
//! it is global, so the HTTP server can hold many at once.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Message, Role, SessionContext};

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    messages: Vec<Message>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// The transcript in insertion order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Per-role context replayed from the current transcript.
    pub fn context(&self) -> SessionContext {
        SessionContext::from_messages(&self.messages)
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
        });
    }

    /// Clear the transcript. The session keeps its id.
    pub fn reset(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_empty() {
        let s = Session::new();
        assert!(s.is_empty());
        assert!(s.context().is_empty());
    }

    #[test]
    fn push_and_reset() {
        let mut s = Session::new();
        let id = s.id;
        s.push(Role::User, "q");
        s.push(Role::Assistant, "a");
        assert_eq!(s.len(), 2);
        assert_eq!(s.messages()[0], Message::user("q"));
        assert_eq!(s.context().get(Role::Assistant), Some("a"));

        s.reset();
        assert!(s.is_empty());
        assert_eq!(s.id, id);
    }

    #[test]
    fn sessions_have_distinct_ids() {
        assert_ne!(Session::new().id, Session::new().id);
    }
}
