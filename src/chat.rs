//! Terminal chat shell.
//!
//! A line-oriented REPL over one [`Session`]: each line is a turn, the
//! answer is printed followed by one citation line per source URL. Output
//! goes to stdout; the typing indicator and the input prompt are only shown
//! when the corresponding stream is a terminal, so piped use stays clean.
//!
//! | Input | Effect |
//! |-------|--------|
//! | `/reset` | Clear the transcript |
//! | `/exit` or EOF | End the chat |
//! | anything else | One turn |

use anyhow::Result;
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::UiConfig;
use crate::orchestrator::{Orchestrator, TurnOutcome};
use crate::session::Session;

pub fn render_banner(out: &mut impl Write, ui: &UiConfig) -> io::Result<()> {
    writeln!(out, "{} {}", ui.page_icon, ui.page_title)?;
    writeln!(out, "(/reset clears the conversation, /exit quits)")?;
    writeln!(out)
}

/// Write the result of one turn. Ignored turns print nothing.
pub fn render_outcome(out: &mut impl Write, ui: &UiConfig, outcome: &TurnOutcome) -> io::Result<()> {
    match outcome {
        TurnOutcome::Ignored => Ok(()),
        TurnOutcome::Answered { answer, citations } => {
            writeln!(out, "{}", answer)?;
            for url in citations {
                writeln!(out, "{}{}", ui.citation_prefix, url)?;
            }
            writeln!(out)
        }
        TurnOutcome::Failed { error } => {
            writeln!(out, "error: {}", error)?;
            writeln!(out)
        }
    }
}

/// Shown while a turn is in flight.
struct TypingIndicator {
    active: bool,
}

impl TypingIndicator {
    fn show(text: &str) -> Self {
        let active = atty::is(atty::Stream::Stderr);
        if active {
            eprint!("{}", text);
            let _ = io::stderr().flush();
        }
        Self { active }
    }
}

impl Drop for TypingIndicator {
    fn drop(&mut self) {
        if self.active {
            eprint!("\r\x1b[2K");
            let _ = io::stderr().flush();
        }
    }
}

/// Run the REPL until `/exit` or end of input.
pub async fn run_chat(ui: &UiConfig, orchestrator: &Orchestrator) -> Result<()> {
    let interactive = atty::is(atty::Stream::Stdin);
    let mut stdout = io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session = Session::new();

    render_banner(&mut stdout, ui)?;

    loop {
        if interactive {
            write!(stdout, "{} > ", ui.input_placeholder)?;
            stdout.flush()?;
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "/exit" => break,
            "/reset" => {
                session.reset();
                writeln!(stdout, "(conversation cleared)")?;
                writeln!(stdout)?;
                continue;
            }
            _ => {}
        }

        let outcome = {
            let _typing = TypingIndicator::show(&ui.typing_indicator);
            orchestrator.handle_turn(&mut session, &line).await
        };
        render_outcome(&mut stdout, ui, &outcome)?;
        stdout.flush()?;
    }

    Ok(())
}

/// Run a single turn in a fresh session. Returns `false` if the turn
/// failed.
pub async fn run_ask(ui: &UiConfig, orchestrator: &Orchestrator, question: &str) -> Result<bool> {
    let mut session = Session::new();
    let outcome = {
        let _typing = TypingIndicator::show(&ui.typing_indicator);
        orchestrator.handle_turn(&mut session, question).await
    };

    let mut stdout = io::stdout();
    match &outcome {
        TurnOutcome::Failed { error } => {
            eprintln!("error: {}", error);
            Ok(false)
        }
        _ => {
            render_outcome(&mut stdout, ui, &outcome)?;
            Ok(true)
        }
    }
}
