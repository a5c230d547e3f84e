//! Error taxonomy for the retrieval and answer pipeline.
//!
//! | Variant | Raised by | Severity |
//! |---------|-----------|----------|
//! | [`Error::StoreUnavailable`] | [`crate::store`] at load time | fatal at startup |
//! | [`Error::Embedding`] | [`crate::embedding`] during a query | recoverable per turn |
//! | [`Error::AnswerService`] | [`crate::answer`] | recoverable per turn |
//! | [`Error::InvalidQuery`] | [`crate::store::VectorStore::retrieve`] | caller bug |
//!
//! Blank chat input is not an error; the orchestrator treats it as a no-op.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The on-disk index is missing, corrupt, untrusted, or schema-incompatible.
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// Embedding the query (or corpus) failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The remote answer service failed after exhausting its retries,
    /// rejected the credentials, or returned a malformed response.
    #[error("answer service error: {0}")]
    AnswerService(String),

    /// Retrieval was called with a blank query or `k == 0`.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl Error {
    /// Machine-readable code used by the HTTP API error body.
    pub fn code(&self) -> &'static str {
        match self {
            Error::StoreUnavailable(_) => "store_unavailable",
            Error::Embedding(_) => "embedding_error",
            Error::AnswerService(_) => "answer_service_error",
            Error::InvalidQuery(_) => "bad_request",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category() {
        let e = Error::StoreUnavailable("index.sqlite not found".to_string());
        assert_eq!(
            e.to_string(),
            "vector store unavailable: index.sqlite not found"
        );
        assert_eq!(e.code(), "store_unavailable");
    }

    #[test]
    fn answer_service_code() {
        let e = Error::AnswerService("HTTP 401".to_string());
        assert_eq!(e.code(), "answer_service_error");
        assert!(e.to_string().contains("HTTP 401"));
    }
}
