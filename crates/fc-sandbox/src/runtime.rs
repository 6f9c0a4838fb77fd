//! Script runtime seam
//!
//! The sandbox never runs code itself. It hands the snippet, the bound
//! dataset and the capability set to a [`ScriptRuntime`], which reports back
//! a [`RuntimeOutcome`].

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use fc_core::DataFrame;

/// Names made visible to a snippet before it runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// `(binding, module)` pairs imported into the namespace
    pub libraries: Vec<(String, String)>,
    /// Name the dataset is bound under
    pub dataset_binding: String,
    /// Column converted to datetime before binding
    pub datetime_column: Option<String>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            libraries: vec![
                ("pd".to_string(), "pandas".to_string()),
                ("np".to_string(), "numpy".to_string()),
            ],
            dataset_binding: "df".to_string(),
            datetime_column: Some("date".to_string()),
        }
    }
}

impl Capabilities {
    /// Whether a binding was injected rather than introduced by the snippet
    pub fn is_injected(&self, name: &str) -> bool {
        name == self.dataset_binding || self.libraries.iter().any(|(alias, _)| alias == name)
    }

    /// Top-level modules the runtime imports before every snippet
    pub fn modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = self
            .libraries
            .iter()
            .filter_map(|(_, module)| module.split('.').next())
            .map(str::to_string)
            .collect();
        modules.sort();
        modules.dedup();
        modules
    }

    /// Bindings worth reporting back to the operator
    pub fn is_reportable(&self, name: &str) -> bool {
        !self.is_injected(name) && !name.starts_with("__")
    }
}

/// Where inside the runtime a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimePhase {
    /// Importing the injected libraries
    #[default]
    Loading,
    /// Reading the dataset and converting its datetime column
    Converting,
    Executing,
    Collecting,
}

/// What a runtime reports for one run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuntimeOutcome {
    pub success: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
    #[serde(default)]
    pub phase: RuntimePhase,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub traceback: Option<String>,
}

impl RuntimeOutcome {
    pub fn completed(stdout: impl Into<String>, bindings: BTreeMap<String, String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            bindings,
            phase: RuntimePhase::Collecting,
            ..Self::default()
        }
    }

    pub fn raised(error_type: impl Into<String>, error_msg: impl Into<String>) -> Self {
        Self {
            success: false,
            phase: RuntimePhase::Executing,
            error_type: Some(error_type.into()),
            error_msg: Some(error_msg.into()),
            ..Self::default()
        }
    }
}

/// Interpreter that can run snippets and manage packages
#[async_trait]
pub trait ScriptRuntime: Send + Sync {
    /// Run `code` with `frame` bound per `capabilities`.
    ///
    /// Exceptions raised by the snippet come back as an unsuccessful outcome;
    /// `Err` means the runtime itself could not be driven.
    async fn run(
        &self,
        code: &str,
        frame: Option<&DataFrame>,
        capabilities: &Capabilities,
    ) -> Result<RuntimeOutcome>;

    async fn is_importable(&self, module: &str) -> Result<bool>;

    async fn install(&self, module: &str) -> Result<()>;
}
