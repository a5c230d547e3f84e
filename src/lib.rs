//! # Syllabus Advisor
//!
//! A single-turn retrieval-augmented chat interface over a precomputed
//! vector index of course syllabi.
//!
//! Each turn embeds the question, retrieves the top-k most similar
//! documents, fills a prompt template with the previous exchange, the
//! retrieved text, and the question, and asks a hosted LLM for the answer.
//! The answer is shown with the deduplicated source URLs of the documents it
//! was grounded on.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Shell        │──▶│ Orchestrator │──▶│ VectorStore   │
//! │ chat/ask/API │   │ (one turn)   │   │ SQLite+cosine │
//! └──────────────┘   └──────┬───────┘   └──────────────┘
//!                           │
//!                ┌──────────┴──────────┐
//!                ▼                     ▼
//!          ┌──────────┐          ┌──────────┐
//!          │  Prompt  │          │  Answer  │
//!          │ template │          │ (Gemini) │
//!          └──────────┘          └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Pipeline error taxonomy |
//! | [`models`] | Core data types |
//! | [`http`] | Retry and timeout policy for remote APIs |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`db`] | Index database connection |
//! | [`migrate`] | Index schema |
//! | [`store`] | Index loading and top-k retrieval |
//! | [`index_build`] | Corpus ingestion and index inspection |
//! | [`prompt`] | Prompt template assembly |
//! | [`answer`] | Answer service clients |
//! | [`session`] | Per-conversation transcript |
//! | [`orchestrator`] | One conversation turn |
//! | [`chat`] | Terminal shell |
//! | [`server`] | HTTP chat API |

pub mod answer;
pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod http;
pub mod index_build;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod server;
pub mod session;
pub mod store;
