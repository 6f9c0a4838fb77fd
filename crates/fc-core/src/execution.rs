//! Execution results and diagnostic bundles
//!
//! Produced by the sandbox for every run and consumed by the repair loop,
//! which embeds the diagnostics in repair prompts and attempt history.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::frame::{DType, DataFrame};

/// Stage a sandbox run had reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExecutionStep {
    #[serde(rename = "initializing")]
    Initializing,
    #[serde(rename = "dependency check")]
    DependencyCheck,
    #[serde(rename = "datetime conversion")]
    DatetimeConversion,
    #[serde(rename = "executing")]
    Executing,
    #[serde(rename = "collecting results")]
    CollectingResults,
}

impl ExecutionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStep::Initializing => "initializing",
            ExecutionStep::DependencyCheck => "dependency check",
            ExecutionStep::DatetimeConversion => "datetime conversion",
            ExecutionStep::Executing => "executing",
            ExecutionStep::CollectingResults => "collecting results",
        }
    }
}

impl fmt::Display for ExecutionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the bound dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataInfo {
    pub shape: (usize, usize),
    pub columns: Vec<String>,
    pub dtypes: Vec<(String, DType)>,
    pub null_counts: Vec<(String, usize)>,
}

impl DataInfo {
    pub fn capture(frame: &DataFrame) -> Self {
        Self {
            shape: frame.shape(),
            columns: frame.column_names(),
            dtypes: frame.dtypes(),
            null_counts: frame.null_counts(),
        }
    }
}

/// Diagnostic bundle attached to every execution result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub data_info: Option<DataInfo>,
    pub imports_loaded: Vec<String>,
    pub execution_step: ExecutionStep,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            data_info: None,
            imports_loaded: Vec::new(),
            execution_step: ExecutionStep::Initializing,
        }
    }
}

/// Exception detail for a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub error_type: String,
    pub error_msg: String,
    pub traceback: String,
    pub diagnostics: Diagnostics,
}

/// Outcome of a single sandbox invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Everything the snippet printed
    pub stdout: String,
    /// Names the snippet introduced, rendered as text
    pub bindings: BTreeMap<String, String>,
    pub success: bool,
    pub diagnostics: Diagnostics,
    pub error_context: Option<ErrorContext>,
}

impl ExecutionResult {
    pub fn success(
        stdout: impl Into<String>,
        bindings: BTreeMap<String, String>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            stdout: stdout.into(),
            bindings,
            success: true,
            diagnostics,
            error_context: None,
        }
    }

    pub fn failure(stdout: impl Into<String>, error_context: ErrorContext) -> Self {
        Self {
            stdout: stdout.into(),
            bindings: BTreeMap::new(),
            success: false,
            diagnostics: error_context.diagnostics.clone(),
            error_context: Some(error_context),
        }
    }

    /// Human-readable failure report, or None for a successful run
    pub fn error_text(&self) -> Option<String> {
        self.error_context.as_ref().map(failure_report)
    }
}

/// Render the failure report fed back to the operator and the oracle
pub fn failure_report(ctx: &ErrorContext) -> String {
    let mut out = format!("Error executing code: {}\n", ctx.error_msg);
    out.push_str("\nDebug Information:\n");
    out.push_str(&format!("Error Type: {}\n", ctx.error_type));
    out.push_str(&format!(
        "Last Execution Step: {}\n",
        ctx.diagnostics.execution_step
    ));

    if let Some(info) = &ctx.diagnostics.data_info {
        let columns: Vec<String> = info.columns.iter().map(|c| format!("'{}'", c)).collect();
        out.push_str("\nDataFrame Info:\n");
        out.push_str(&format!("Shape: ({}, {})\n", info.shape.0, info.shape.1));
        out.push_str(&format!("Columns: [{}]\n", columns.join(", ")));
        out.push_str("Data Types:\n");
        for (column, dtype) in &info.dtypes {
            out.push_str(&format!("  {}: {}\n", column, dtype));
        }
        out.push_str("Null Counts:\n");
        for (column, count) in info.null_counts.iter().filter(|(_, n)| *n > 0) {
            out.push_str(&format!("  {}: {}\n", column, count));
        }
    }
    out
}
