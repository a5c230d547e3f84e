//! # Syllabus Advisor CLI (`advisor`)
//!
//! Chat with a retrieval-augmented assistant over a precomputed vector
//! index of course syllabi.
//!
//! ## Usage
//!
//! ```bash
//! advisor --config ./config/advisor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `advisor chat` | Interactive terminal chat |
//! | `advisor ask "<question>"` | Answer one question and exit |
//! | `advisor serve` | Start the HTTP chat API |
//! | `advisor index build --input corpus.jsonl` | Embed a JSONL corpus into the index |
//! | `advisor index info` | Show what the index contains |
//!
//! ## Examples
//!
//! ```bash
//! # Build the index from a scraped corpus
//! advisor index build --input ./data/syllabus.jsonl
//!
//! # Ask a single question
//! advisor ask "慶應SFCの良さは何ですか？"
//!
//! # Start the chat API for a browser front end
//! advisor serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use syllabus_advisor::chat;
use syllabus_advisor::config::{self, LoggingConfig};
use syllabus_advisor::index_build;
use syllabus_advisor::orchestrator::Orchestrator;
use syllabus_advisor::server;

/// Syllabus Advisor: answers questions about courses from an indexed
/// corpus, citing the pages it used.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/advisor.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "advisor",
    about = "Syllabus Advisor: retrieval-augmented chat over a precomputed vector index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/advisor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Interactive chat in the terminal.
    ///
    /// Each line is one question. `/reset` clears the conversation,
    /// `/exit` or end of input quits.
    Chat,

    /// Answer a single question and exit.
    ///
    /// Exits non-zero if the answer could not be produced.
    Ask {
        /// The question to ask.
        question: String,
    },

    /// Start the HTTP chat API on `[server].bind`.
    Serve,

    /// Build or inspect the vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Embed a JSONL corpus into the index at `[index].path`.
    ///
    /// Each line is an object with `content`, `source_url`, and optional
    /// extra metadata fields. Content already in the index is skipped.
    Build {
        /// Corpus file (JSON Lines).
        #[arg(long)]
        input: PathBuf,

        /// Discard the existing index first. Required when the embedding
        /// model or width changes.
        #[arg(long)]
        rebuild: bool,
    },

    /// Show index metadata and document counts.
    Info,
}

/// Install the tracing subscriber. `RUST_LOG` wins over `[logging].level`;
/// logs go to stderr so chat output on stdout stays clean.
fn init_logging(logging: &LoggingConfig) {
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match logging.level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: logging.level='{}' is not a valid tracing filter ({}); falling back to 'warn'",
                    logging.level, e
                );
                tracing_subscriber::EnvFilter::new("warn")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    init_logging(&cfg.logging);

    match cli.command {
        Commands::Chat => {
            let orchestrator = Orchestrator::from_config(&cfg).await?;
            chat::run_chat(&cfg.ui, &orchestrator).await?;
        }
        Commands::Ask { question } => {
            let orchestrator = Orchestrator::from_config(&cfg).await?;
            if !chat::run_ask(&cfg.ui, &orchestrator, &question).await? {
                std::process::exit(1);
            }
        }
        Commands::Serve => {
            let orchestrator = Orchestrator::from_config(&cfg).await?;
            server::run_server(&cfg, Arc::new(orchestrator)).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::Build { input, rebuild } => {
                index_build::run_index_build(&cfg, &input, rebuild).await?;
            }
            IndexAction::Info => {
                index_build::run_index_info(&cfg).await?;
            }
        },
    }

    Ok(())
}
