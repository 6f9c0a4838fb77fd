//! Repair-loop orchestrator
//!
//! One call to [`ForecastAgent::process_query`] is one operator turn. The turn
//! walks a small state machine:
//!
//! ```text
//! query ──► AwaitingAction ──► AwaitingConfirm ◄──────────────┐
//!                 │                  │ yes                    │ new code
//!                 ▼                  ▼                        │
//!        forecast/analysis/      Executing ── failure ──► AwaitingFix
//!        general answer              │                        │ no code
//!                 │                  ▼ success                ▼
//!                 └──────────────► Done ◄──── cancel ── operator choice
//! ```
//!
//! `fix <instructions>` enters `AwaitingFix` directly from the previous
//! turn's code and result. Only the operator ends the repair loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use fc_core::{AgentConfig, Error, ExecutionContext, ExecutionResult, Result};
use fc_llm::Oracle;
use fc_memory::{AttemptRecord, DatasetInfo, Interaction, MemoryStore};
use fc_sandbox::{
    describe_dataset, format_analysis_output, format_code_output, format_forecast_output,
    DependencyResolver, Forecaster, ProphetForecaster, Sandbox, ScriptRuntime,
};

use crate::operator::{AgentEvent, Operator, OperatorPrompt, UserDecision};
use crate::parser::{Action, ProtocolError, ResponseParser};
use crate::prompts;

pub const NO_PRIOR_TURN: &str = "No previous code execution to fix. Please run a command first.";
pub const FIX_NEEDS_INSTRUCTIONS: &str =
    "Please provide instructions for the fix, e.g., 'fix write results to csv'";
pub const ORACLE_MISSING: &str = "Error: LLM not initialized";
pub const NO_CODE: &str = "No code was generated";
pub const CANCELLED: &str = "Code execution cancelled by user";
pub const DATASET_REQUIRED: &str = "Please analyze a dataset first using the 'analyze' command.";
pub const PACKAGES_NOT_INSTALLED: &str = "Required packages not installed. Cannot execute code.";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Turn {
    Query,
    Fix { instructions: String },
}

impl Turn {
    /// A turn is a fix when its first word is `fix`
    fn classify(query: &str) -> Self {
        let query = query.trim();
        let (first, rest) = query
            .split_once(char::is_whitespace)
            .unwrap_or((query, ""));
        if first.eq_ignore_ascii_case("fix") {
            Turn::Fix {
                instructions: rest.trim().to_string(),
            }
        } else {
            Turn::Query
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Proposal {
    code: String,
    explanation: Option<String>,
}

#[derive(Debug)]
enum TurnState {
    AwaitingAction(String),
    AwaitingConfirm(Proposal),
    Executing(Proposal),
    AwaitingFix {
        prompt: String,
        current: Option<Proposal>,
    },
    Restart,
    Done(String),
    Cancelled,
}

fn next_attempt(attempts: &[AttemptRecord]) -> u32 {
    attempts.last().map_or(1, |a| a.attempt_number.saturating_add(1))
}

/// Conversational agent that owns the session memory and dataset context
pub struct ForecastAgent {
    oracle: Option<Arc<dyn Oracle>>,
    parser: ResponseParser,
    sandbox: Sandbox,
    resolver: DependencyResolver,
    forecaster: Arc<dyn Forecaster>,
    memory: MemoryStore,
    context: ExecutionContext,
    sessions_dir: PathBuf,
    history_window: usize,
    forecast_horizon: usize,
    last_code: Option<String>,
    last_error: Option<String>,
    last_result: Option<String>,
}

impl ForecastAgent {
    pub fn new(runtime: Arc<dyn ScriptRuntime>) -> Self {
        Self::from_config(&AgentConfig::default(), runtime)
    }

    pub fn from_config(config: &AgentConfig, runtime: Arc<dyn ScriptRuntime>) -> Self {
        Self {
            oracle: None,
            parser: ResponseParser::default(),
            sandbox: Sandbox::new(runtime.clone()),
            resolver: DependencyResolver::new(runtime.clone()),
            forecaster: Arc::new(ProphetForecaster::new(runtime)),
            memory: MemoryStore::new(),
            context: ExecutionContext::new(),
            sessions_dir: config.sessions_dir.clone(),
            history_window: config.history_window,
            forecast_horizon: config.forecast_horizon,
            last_code: None,
            last_error: None,
            last_result: None,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn Oracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_forecaster(mut self, forecaster: Arc<dyn Forecaster>) -> Self {
        self.forecaster = forecaster;
        self
    }

    pub fn with_memory(mut self, memory: MemoryStore) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn last_code(&self) -> Option<&str> {
        self.last_code.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_result(&self) -> Option<&str> {
        self.last_result.as_deref()
    }

    /// Load a CSV, describe it and remember it for later prompts
    pub fn analyze(
        &mut self,
        csv_path: impl AsRef<Path>,
        target_column: &str,
        series_id_column: &str,
    ) -> Result<String> {
        self.context = ExecutionContext::load(csv_path, target_column, series_id_column)?;
        self.describe_current()
    }

    /// Run one operator turn; every failure comes back as text
    pub async fn process_query(&mut self, query: &str, operator: &mut dyn Operator) -> String {
        match self.run_turn(query, operator).await {
            Ok(message) => message,
            Err(e) => {
                warn!("Turn failed: {}", e);
                failure_reply(&e)
            }
        }
    }

    /// Persist the session under the configured sessions directory
    pub fn save_session(&self) -> Result<PathBuf> {
        self.memory.save_to_disk(&self.sessions_dir)
    }

    async fn run_turn(&mut self, query: &str, operator: &mut dyn Operator) -> Result<String> {
        let turn = Turn::classify(query);
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut state = self.start(&turn, query).await?;

        loop {
            state = match state {
                TurnState::AwaitingAction(response) => self.dispatch(&response, query).await?,
                TurnState::AwaitingConfirm(proposal) => {
                    let decision = operator
                        .decide(OperatorPrompt::ConfirmExecution {
                            attempt: next_attempt(&attempts),
                            code: proposal.code.clone(),
                            explanation: proposal.explanation.clone(),
                        })
                        .await;
                    match decision {
                        UserDecision::Execute => TurnState::Executing(proposal),
                        UserDecision::Quit | UserDecision::Cancel => TurnState::Cancelled,
                        _ => TurnState::AwaitingConfirm(proposal),
                    }
                }
                TurnState::Executing(proposal) => {
                    self.execute(proposal, &mut attempts, operator).await?
                }
                TurnState::AwaitingFix { prompt, current } => {
                    self.repair(&prompt, current, query, &attempts, operator)
                        .await?
                }
                TurnState::Restart => {
                    info!("Restarting turn");
                    attempts.clear();
                    self.start(&turn, query).await?
                }
                TurnState::Done(message) => return Ok(message),
                TurnState::Cancelled => {
                    info!("Turn cancelled by operator");
                    return Ok(CANCELLED.to_string());
                }
            };
        }
    }

    async fn start(&mut self, turn: &Turn, query: &str) -> Result<TurnState> {
        match turn {
            Turn::Fix { instructions } => {
                let (Some(last_code), Some(last_result)) = (&self.last_code, &self.last_result)
                else {
                    return Err(Error::NoPriorTurn);
                };
                if instructions.is_empty() {
                    return Ok(TurnState::Done(FIX_NEEDS_INSTRUCTIONS.to_string()));
                }
                if self.oracle.is_none() {
                    return Ok(TurnState::Done(ORACLE_MISSING.to_string()));
                }
                info!("Fixing previous code");
                Ok(TurnState::AwaitingFix {
                    prompt: prompts::fix_prompt(last_code, last_result, instructions, &self.context),
                    current: Some(Proposal {
                        code: last_code.clone(),
                        explanation: None,
                    }),
                })
            }
            Turn::Query => {
                if self.oracle.is_none() {
                    return Ok(TurnState::Done(ORACLE_MISSING.to_string()));
                }
                let prompt = prompts::query_prompt(
                    &self.context,
                    &self.memory.relevant_context(),
                    self.history_window,
                    query,
                );
                let response = self.ask(&prompt).await?;
                self.memory
                    .store_interaction(Interaction::new(query, response.as_str()));
                Ok(TurnState::AwaitingAction(response))
            }
        }
    }

    async fn dispatch(&mut self, response: &str, query: &str) -> Result<TurnState> {
        let parsed = self.parser.parse_response(response).map_err(|e| {
            debug!("Unparseable oracle response: {}", e);
            Error::from(e)
        })?;
        info!(action = %parsed.action, "Oracle chose action");

        match parsed.action {
            Action::CodeGeneration => Ok(match parsed.code {
                Some(code) => TurnState::AwaitingConfirm(Proposal {
                    code,
                    explanation: parsed.explanation,
                }),
                None => TurnState::Done(NO_CODE.to_string()),
            }),
            Action::Forecast => self.forecast().await.map(TurnState::Done),
            Action::DataAnalysis => self.describe_current().map(TurnState::Done),
            Action::General => self.ask(query).await.map(TurnState::Done),
            Action::Other(token) => {
                debug!(token = %token, "Unknown action");
                Err(ProtocolError::NoActionDetermined.into())
            }
        }
    }

    async fn execute(
        &mut self,
        proposal: Proposal,
        attempts: &mut Vec<AttemptRecord>,
        operator: &mut dyn Operator,
    ) -> Result<TurnState> {
        let resolution = self.resolver.resolve(&proposal.code).await;
        if !resolution.satisfied {
            let decision = operator
                .decide(OperatorPrompt::InstallPackages {
                    missing: resolution.missing.clone(),
                })
                .await;
            if decision != UserDecision::InstallPackages {
                info!(missing = ?resolution.missing, "Install declined");
                return Err(Error::DependencyMissing(resolution.missing));
            }
            let outcomes = self.resolver.install(&resolution.missing).await;
            let unavailable: Vec<String> = outcomes
                .iter()
                .filter(|outcome| !outcome.succeeded())
                .map(|outcome| outcome.module.clone())
                .collect();
            for outcome in outcomes {
                operator.notify(AgentEvent::Installed(outcome)).await;
            }
            if !unavailable.is_empty() {
                return Err(Error::DependencyMissing(unavailable));
            }
        }

        let attempt = next_attempt(attempts);
        info!(attempt, "Executing generated code");
        let result = self
            .sandbox
            .execute(&proposal.code, self.context.frame_mut())
            .await;
        let output = self.record_outcome(&proposal.code, &result);

        if result.success {
            return Ok(TurnState::Done(output));
        }

        let error_text = result.error_text().unwrap_or_default();
        operator
            .notify(AgentEvent::ExecutionFailed {
                attempt,
                error: error_text.clone(),
            })
            .await;
        attempts.push(AttemptRecord {
            attempt_number: attempt,
            code: proposal.code.clone(),
            error_text: error_text.clone(),
            diagnostics: result.diagnostics.clone(),
            error_context: result.error_context.clone(),
        });

        Ok(TurnState::AwaitingFix {
            prompt: prompts::repair_prompt(&error_text, &proposal.code, &self.context, attempts),
            current: Some(proposal),
        })
    }

    async fn repair(
        &mut self,
        prompt: &str,
        current: Option<Proposal>,
        query: &str,
        attempts: &[AttemptRecord],
        operator: &mut dyn Operator,
    ) -> Result<TurnState> {
        info!(attempts = attempts.len(), "Requesting repair");
        let response = self.ask(prompt).await?;
        let sections = self.parser.parse_repair(&response);

        if !sections.error_analysis.is_empty() || !sections.proposed_fixes.is_empty() {
            operator
                .notify(AgentEvent::RepairAnalysis {
                    error_analysis: sections.error_analysis.clone(),
                    proposed_fixes: sections.proposed_fixes.clone(),
                })
                .await;
        }

        let mut interaction = Interaction::new(query, response.as_str());
        if let Some(proposal) = &current {
            interaction = interaction.with_code(proposal.code.as_str());
        }
        if let Some(last) = attempts.last() {
            interaction = interaction.with_error(last.error_text.as_str());
        }
        if !attempts.is_empty() {
            interaction = interaction.with_fixes(attempts.to_vec());
        }
        self.memory.store_interaction(interaction);

        if let Some(code) = sections.code {
            return Ok(TurnState::AwaitingConfirm(Proposal {
                code,
                explanation: sections.explanation,
            }));
        }

        operator.notify(AgentEvent::NoCodeInRepair).await;
        Ok(match operator.decide(OperatorPrompt::RepairFallback).await {
            UserDecision::RestartTurn => TurnState::Restart,
            UserDecision::Cancel | UserDecision::Quit => TurnState::Cancelled,
            _ => match current {
                Some(proposal) => TurnState::AwaitingConfirm(proposal),
                None => TurnState::Done(NO_CODE.to_string()),
            },
        })
    }

    fn record_outcome(&mut self, code: &str, result: &ExecutionResult) -> String {
        let output = format_code_output(result);
        self.last_code = Some(code.to_string());
        self.last_error = result.error_text();
        self.last_result = Some(output.clone());
        output
    }

    async fn forecast(&self) -> Result<String> {
        let Ok((frame, target, series)) = self.context.require() else {
            return Ok(DATASET_REQUIRED.to_string());
        };
        let forecasts = self
            .forecaster
            .forecast(frame, target, series, self.forecast_horizon)
            .await?;
        Ok(format_forecast_output(&forecasts))
    }

    fn describe_current(&mut self) -> Result<String> {
        let Ok((frame, target, series)) = self.context.require() else {
            return Ok(DATASET_REQUIRED.to_string());
        };
        let analysis = describe_dataset(frame, target, series)?;
        let info = DatasetInfo {
            target_column: target.to_string(),
            series_id_column: series.to_string(),
            shape: frame.shape(),
            columns: frame.column_names(),
        };

        self.memory.store_dataset_info(info);
        self.memory.store_analysis(serde_json::to_value(&analysis)?);
        Ok(format_analysis_output(&analysis))
    }

    async fn ask(&self, prompt: &str) -> Result<String> {
        let oracle = self
            .oracle
            .as_ref()
            .ok_or_else(|| Error::oracle_unavailable("LLM not initialized"))?;
        debug!(model = %oracle.model(), chars = prompt.len(), "Invoking oracle");
        oracle
            .invoke(prompt)
            .await
            .map_err(|e| Error::oracle_unavailable(format!("{:#}", e)))
    }
}

/// Operator-facing text for a turn that ended in an error
fn failure_reply(err: &Error) -> String {
    match err {
        Error::NoPriorTurn => NO_PRIOR_TURN.to_string(),
        Error::DependencyMissing(_) => PACKAGES_NOT_INSTALLED.to_string(),
        Error::ParseFailure(reason) => reason.clone(),
        other => format!("Error processing query: {}", other),
    }
}
