//! Terminal input and the operator that answers from it

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;

use fc_chat::{AgentEvent, Operator, OperatorPrompt, UserDecision};

/// Line reader shared by the REPL and every operator question
pub struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Console {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Show `prompt` and read one line; None once stdin is closed
    pub async fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        print!("{}", prompt);
        std::io::stdout().flush().context("Failed to flush stdout")?;
        self.lines.next_line().await.context("Failed to read stdin")
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

/// Operator backed by the terminal
pub struct TerminalOperator<'a> {
    console: &'a mut Console,
}

impl<'a> TerminalOperator<'a> {
    pub fn new(console: &'a mut Console) -> Self {
        Self { console }
    }
}

#[async_trait]
impl<'a> Operator for TerminalOperator<'a> {
    async fn decide(&mut self, prompt: OperatorPrompt) -> UserDecision {
        match self.console.read_line(&prompt.to_string()).await {
            Ok(Some(reply)) => prompt.interpret(&reply),
            Ok(None) => prompt.fallback_decision(),
            Err(e) => {
                warn!("Could not read operator reply: {:#}", e);
                prompt.fallback_decision()
            }
        }
    }

    async fn notify(&mut self, event: AgentEvent) {
        println!("{}", event);
    }
}
