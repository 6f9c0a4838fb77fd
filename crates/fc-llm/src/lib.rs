//! fc-llm: text-generation oracle integration
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Oracle`] | `invoke(prompt) -> text`, the only call the agent makes |
//! | [`OllamaClient`] | Ollama `/api/generate` backed oracle |
//! | `ScriptedOracle` | queued canned responses (`test-util`) |
//!
//! ## Environment Variables
//!
//! ```bash
//! OLLAMA_BASE_URL=http://localhost:11434
//! FC_TEMPERATURE=0.7
//! ```

pub mod ollama;
pub mod provider;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;

pub use ollama::{available_models, OllamaClient, FALLBACK_MODELS};
pub use provider::{ModelInfo, Oracle};
#[cfg(any(test, feature = "test-util"))]
pub use scripted::ScriptedOracle;
