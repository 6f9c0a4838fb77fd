//! Operator double that replays canned decisions

use async_trait::async_trait;
use std::collections::VecDeque;

use crate::operator::{AgentEvent, Operator, OperatorPrompt, UserDecision};

/// Operator that replays a fixed list of decisions
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    decisions: VecDeque<UserDecision>,
    prompts: Vec<OperatorPrompt>,
    events: Vec<AgentEvent>,
}

impl ScriptedOperator {
    pub fn new(decisions: impl IntoIterator<Item = UserDecision>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> &[OperatorPrompt] {
        &self.prompts
    }

    pub fn events(&self) -> &[AgentEvent] {
        &self.events
    }

    pub fn remaining(&self) -> usize {
        self.decisions.len()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn decide(&mut self, prompt: OperatorPrompt) -> UserDecision {
        let decision = self
            .decisions
            .pop_front()
            .unwrap_or_else(|| prompt.fallback_decision());
        self.prompts.push(prompt);
        decision
    }

    async fn notify(&mut self, event: AgentEvent) {
        self.events.push(event);
    }
}
