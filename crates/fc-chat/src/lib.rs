//! Conversation layer for fc-agent
//!
//! Speaks the marker protocol with the oracle, builds prompts from session
//! memory, and runs the confirm/execute/repair loop behind an operator
//! decision boundary.

pub mod agent;
pub mod operator;
pub mod parser;
pub mod prompts;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;

pub use agent::{
    ForecastAgent, CANCELLED, DATASET_REQUIRED, FIX_NEEDS_INSTRUCTIONS, NO_CODE, NO_PRIOR_TURN,
    ORACLE_MISSING, PACKAGES_NOT_INSTALLED,
};
pub use operator::{
    AgentEvent, ChannelOperator, Operator, OperatorMessage, OperatorPrompt, UserDecision,
};
pub use parser::{Action, ParsedResponse, ProtocolError, RepairSections, ResponseParser};
#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedOperator;
