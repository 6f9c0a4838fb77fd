//! Operator decision boundary
//!
//! The repair loop never reads input itself. It asks an [`Operator`] for a
//! [`UserDecision`] at each suspension point and reports progress through
//! [`AgentEvent`]s, so the same state machine runs behind a terminal, a
//! channel-driven frontend or a scripted test.

use async_trait::async_trait;
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use fc_sandbox::InstallOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDecision {
    /// Run the proposed code
    Execute,
    /// Abandon the turn at the confirmation prompt
    Quit,
    /// Reply was neither; ask again
    Undecided,
    InstallPackages,
    DeclineInstall,
    /// Repair produced no code: run the previous code again
    RetrySameCode,
    /// Repair produced no code: start the turn over
    RestartTurn,
    Cancel,
}

/// A question the loop is blocked on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorPrompt {
    ConfirmExecution {
        attempt: u32,
        code: String,
        explanation: Option<String>,
    },
    InstallPackages {
        missing: Vec<String>,
    },
    RepairFallback,
}

impl OperatorPrompt {
    /// Map a free-text reply onto a decision
    pub fn interpret(&self, reply: &str) -> UserDecision {
        let reply = reply.trim().to_lowercase();
        match self {
            OperatorPrompt::ConfirmExecution { .. } => match reply.as_str() {
                "yes" => UserDecision::Execute,
                "quit" => UserDecision::Quit,
                _ => UserDecision::Undecided,
            },
            OperatorPrompt::InstallPackages { .. } => match reply.as_str() {
                "yes" => UserDecision::InstallPackages,
                _ => UserDecision::DeclineInstall,
            },
            OperatorPrompt::RepairFallback => match reply.as_str() {
                "2" => UserDecision::RestartTurn,
                "3" => UserDecision::Cancel,
                _ => UserDecision::RetrySameCode,
            },
        }
    }

    /// Decision taken when no operator answers
    pub fn fallback_decision(&self) -> UserDecision {
        match self {
            OperatorPrompt::ConfirmExecution { .. } => UserDecision::Quit,
            OperatorPrompt::InstallPackages { .. } => UserDecision::DeclineInstall,
            OperatorPrompt::RepairFallback => UserDecision::Cancel,
        }
    }
}

impl fmt::Display for OperatorPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorPrompt::ConfirmExecution {
                attempt,
                code,
                explanation,
            } => {
                writeln!(f, "\nAttempt {}", attempt)?;
                writeln!(f, "\nGenerated Code:\n```python\n{}\n```", code)?;
                writeln!(
                    f,
                    "\nCode Explanation: {}",
                    explanation.as_deref().unwrap_or("None")
                )?;
                write!(f, "\nWould you like to execute this code? (yes/no/quit): ")
            }
            OperatorPrompt::InstallPackages { missing } => {
                writeln!(f, "\nMissing required packages: {}", missing.join(", "))?;
                write!(f, "Would you like to install them? (yes/no): ")
            }
            OperatorPrompt::RepairFallback => {
                writeln!(f, "Would you like to:")?;
                writeln!(f, "1. Retry with the same code")?;
                writeln!(f, "2. Try a different approach")?;
                writeln!(f, "3. Quit")?;
                write!(f, "Enter choice (1/2/3): ")
            }
        }
    }
}

/// Progress notifications from the repair loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    ExecutionFailed { attempt: u32, error: String },
    RepairAnalysis {
        error_analysis: String,
        proposed_fixes: String,
    },
    NoCodeInRepair,
    Installed(InstallOutcome),
}

impl fmt::Display for AgentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentEvent::ExecutionFailed { attempt, error } => {
                writeln!(f, "\nExecution failed (Attempt {})", attempt)?;
                writeln!(f, "Error details:\n{}", error.trim_end())?;
                write!(f, "\nAsking LLM to fix the code...")
            }
            AgentEvent::RepairAnalysis {
                error_analysis,
                proposed_fixes,
            } => {
                if !error_analysis.is_empty() {
                    writeln!(f, "\nError Analysis:\n{}", error_analysis)?;
                }
                if !proposed_fixes.is_empty() {
                    write!(f, "\nProposed Fixes:\n{}", proposed_fixes)?;
                }
                Ok(())
            }
            AgentEvent::NoCodeInRepair => write!(f, "Error: Could not find code in LLM response"),
            AgentEvent::Installed(outcome) => f.write_str(&outcome.message),
        }
    }
}

#[async_trait]
pub trait Operator: Send {
    async fn decide(&mut self, prompt: OperatorPrompt) -> UserDecision;

    async fn notify(&mut self, event: AgentEvent);
}

/// Message delivered to a channel-driven frontend
pub enum OperatorMessage {
    Decide {
        prompt: OperatorPrompt,
        respond_to: oneshot::Sender<UserDecision>,
    },
    Notify(AgentEvent),
}

/// Operator whose answers come back over a channel
pub struct ChannelOperator {
    sender: mpsc::Sender<OperatorMessage>,
}

impl ChannelOperator {
    /// Operator plus the receiving end the frontend services
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<OperatorMessage>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self { sender }, receiver)
    }

    async fn call(&self, prompt: OperatorPrompt) -> anyhow::Result<UserDecision> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(OperatorMessage::Decide {
                prompt,
                respond_to: tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Operator channel closed"))?;

        rx.await.map_err(|_| anyhow::anyhow!("Operator dropped"))
    }
}

#[async_trait]
impl Operator for ChannelOperator {
    async fn decide(&mut self, prompt: OperatorPrompt) -> UserDecision {
        let fallback = prompt.fallback_decision();
        match self.call(prompt).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("No operator decision ({}), using {:?}", e, fallback);
                fallback
            }
        }
    }

    async fn notify(&mut self, event: AgentEvent) {
        if self.sender.send(OperatorMessage::Notify(event)).await.is_err() {
            warn!("Operator channel closed, dropping notification");
        }
    }
}
