//! Execution sandbox
//!
//! Runs one snippet against the bound dataset and always returns an
//! [`ExecutionResult`]. Stages advance `initializing`, `dependency check`,
//! `datetime conversion`, `executing`, `collecting results`; the recorded
//! step is the last one entered.
//!
//! The datetime column is converted in Rust when every cell has a known
//! layout. Otherwise the frame is bound as text and the runtime's own
//! conversion decides, so an unfamiliar layout only fails if the runtime
//! rejects it too.
//!
//! Isolation is limited to a fresh interpreter namespace per run. There is no
//! CPU, memory or wall-clock limit on the snippet.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use fc_core::{DataFrame, DataInfo, Diagnostics, ErrorContext, ExecutionResult, ExecutionStep};

use crate::resolver::extract_imports;
use crate::runtime::{Capabilities, RuntimeOutcome, RuntimePhase, ScriptRuntime};

const PLOTLY_PREAMBLE: &str =
    "import warnings\nwarnings.filterwarnings('ignore', 'Importing plotly failed')\n";

/// Prefix a warning filter when the snippet pulls in plotly
pub fn with_preamble(code: &str) -> String {
    if code.contains("import plotly") {
        format!("{}{}", PLOTLY_PREAMBLE, code)
    } else {
        code.to_string()
    }
}

pub struct Sandbox {
    runtime: Arc<dyn ScriptRuntime>,
    capabilities: Capabilities,
}

impl Sandbox {
    pub fn new(runtime: Arc<dyn ScriptRuntime>) -> Self {
        Self::with_capabilities(runtime, Capabilities::default())
    }

    pub fn with_capabilities(runtime: Arc<dyn ScriptRuntime>, capabilities: Capabilities) -> Self {
        Self {
            runtime,
            capabilities,
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Execute `code` with `frame` bound as the dataset.
    ///
    /// The datetime column of `frame` is converted in place before binding
    /// when its layout is recognised, so later runs see the converted frame.
    pub async fn execute(&self, code: &str, frame: Option<&mut DataFrame>) -> ExecutionResult {
        let mut diagnostics = Diagnostics::default();

        diagnostics.execution_step = ExecutionStep::DependencyCheck;
        diagnostics.imports_loaded = extract_imports(code);
        let code = with_preamble(code);

        let frame: Option<&DataFrame> = match frame {
            Some(frame) => {
                self.convert_datetime(frame, &mut diagnostics);
                diagnostics.data_info = Some(DataInfo::capture(frame));
                Some(&*frame)
            }
            None => None,
        };

        diagnostics.execution_step = ExecutionStep::Executing;
        info!(stage = %diagnostics.execution_step, imports = ?diagnostics.imports_loaded, "Executing snippet");

        match self.runtime.run(&code, frame, &self.capabilities).await {
            Ok(outcome) if outcome.success => {
                diagnostics.execution_step = ExecutionStep::CollectingResults;
                let bindings: BTreeMap<String, String> = outcome
                    .bindings
                    .into_iter()
                    .filter(|(name, _)| self.capabilities.is_reportable(name))
                    .collect();
                debug!(bindings = bindings.len(), "Execution succeeded");
                ExecutionResult::success(outcome.stdout, bindings, diagnostics)
            }
            Ok(outcome) => {
                diagnostics.execution_step = match outcome.phase {
                    RuntimePhase::Loading => ExecutionStep::DependencyCheck,
                    RuntimePhase::Converting => ExecutionStep::DatetimeConversion,
                    RuntimePhase::Executing => ExecutionStep::Executing,
                    RuntimePhase::Collecting => ExecutionStep::CollectingResults,
                };
                warn!(
                    stage = %diagnostics.execution_step,
                    error_type = outcome.error_type.as_deref().unwrap_or("Exception"),
                    "Execution failed"
                );
                failed(outcome, diagnostics)
            }
            Err(e) => {
                warn!("Runtime unavailable: {:#}", e);
                let error_context = ErrorContext {
                    error_type: "RuntimeUnavailable".to_string(),
                    error_msg: format!("{:#}", e),
                    traceback: String::new(),
                    diagnostics,
                };
                ExecutionResult::failure("", error_context)
            }
        }
    }

    fn convert_datetime(&self, frame: &mut DataFrame, diagnostics: &mut Diagnostics) {
        let Some(column) = self.capabilities.datetime_column.as_deref() else {
            return;
        };
        if !frame.has_column(column) {
            return;
        }

        diagnostics.execution_step = ExecutionStep::DatetimeConversion;
        if let Err(e) = frame.coerce_datetime(column) {
            debug!(column = %column, "Binding unconverted dates: {}", e);
        }
    }
}

fn failed(outcome: RuntimeOutcome, diagnostics: Diagnostics) -> ExecutionResult {
    let error_context = ErrorContext {
        error_type: outcome.error_type.unwrap_or_else(|| "Exception".to_string()),
        error_msg: outcome.error_msg.unwrap_or_default(),
        traceback: outcome.traceback.unwrap_or_default(),
        diagnostics,
    };
    ExecutionResult::failure(outcome.stdout, error_context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeRuntime;
    use crate::python::PythonRuntime;
    use fc_core::DType;

    const SERIES_CSV: &str = "\
date,value,series
2024-01-01,10,a
2024-01-02,20,a
2024-01-01,5,b
2024-01-02,15,b
2024-01-01,1,c
2024-01-02,,c
";

    fn frame() -> DataFrame {
        DataFrame::from_csv_reader(SERIES_CSV.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_read_only_snippet_has_no_bindings() {
        let runtime = Arc::new(FakeRuntime::new());
        let sandbox = Sandbox::new(runtime.clone());
        let mut df = frame();

        let result = sandbox.execute("df.describe()", Some(&mut df)).await;

        assert!(result.success);
        assert!(result.bindings.is_empty());
        assert!(result.stdout.is_empty());
        assert_eq!(result.diagnostics.execution_step, ExecutionStep::CollectingResults);
        // date was converted before binding
        let bound = runtime.runs()[0].data_info.clone().unwrap();
        assert_eq!(bound.dtypes[0], ("date".to_string(), DType::DateTime));
    }

    #[tokio::test]
    async fn test_exception_reports_type_and_stage() {
        let runtime = FakeRuntime::new().with_outcome(RuntimeOutcome::raised("KeyError", "'revenue'"));
        let sandbox = Sandbox::new(Arc::new(runtime));
        let mut df = frame();

        let result = sandbox.execute("df['revenue'].sum()", Some(&mut df)).await;

        assert!(!result.success);
        let ctx = result.error_context.as_ref().unwrap();
        assert_eq!(ctx.error_type, "KeyError");
        assert_eq!(result.diagnostics.execution_step, ExecutionStep::Executing);
        let info = result.diagnostics.data_info.as_ref().unwrap();
        assert_eq!(info.shape, (6, 3));
        assert_eq!(info.null_counts[1], ("value".to_string(), 1));
        assert!(result.error_text().unwrap().contains("Error Type: KeyError"));
    }

    #[tokio::test]
    async fn test_repeated_failures_give_identical_diagnostics() {
        let runtime = FakeRuntime::new()
            .with_outcome(RuntimeOutcome::raised("ValueError", "bad"))
            .with_outcome(RuntimeOutcome::raised("ValueError", "bad"));
        let sandbox = Sandbox::new(Arc::new(runtime));
        let mut df = frame();

        let first = sandbox.execute("broken()", Some(&mut df)).await;
        let second = sandbox.execute("broken()", Some(&mut df)).await;

        assert_eq!(
            serde_json::to_string(&first.diagnostics).unwrap(),
            serde_json::to_string(&second.diagnostics).unwrap()
        );
    }

    #[tokio::test]
    async fn test_monthly_dates_converted_before_binding() {
        let runtime = Arc::new(FakeRuntime::new());
        let sandbox = Sandbox::new(runtime.clone());
        let mut df =
            DataFrame::from_csv_reader("date,value,series\n2024-01,1,a\n2024-02,2,a\n".as_bytes())
                .unwrap();

        let result = sandbox.execute("result = df['value'].sum()", Some(&mut df)).await;

        assert!(result.success);
        assert_eq!(runtime.runs().len(), 1);
        assert_eq!(df.column("date").unwrap().dtype(), DType::DateTime);
    }

    #[tokio::test]
    async fn test_unknown_date_layout_left_to_runtime() {
        let runtime = Arc::new(FakeRuntime::new());
        let sandbox = Sandbox::new(runtime.clone());
        let mut df = DataFrame::from_csv_reader("date,value\n2024-W01,1\n".as_bytes()).unwrap();

        let result = sandbox.execute("x = 1", Some(&mut df)).await;

        assert!(result.success);
        let bound = runtime.runs()[0].data_info.clone().unwrap();
        assert_eq!(bound.dtypes[0], ("date".to_string(), DType::Object));
    }

    #[tokio::test]
    async fn test_runtime_conversion_failure_reported_at_conversion_stage() {
        let outcome = RuntimeOutcome {
            phase: RuntimePhase::Converting,
            ..RuntimeOutcome::raised("DateParseError", "Unknown datetime string format: soon")
        };
        let runtime = Arc::new(FakeRuntime::new().with_outcome(outcome));
        let sandbox = Sandbox::new(runtime.clone());
        let mut df = DataFrame::from_csv_reader("date,value\nsoon,1\n".as_bytes()).unwrap();

        let result = sandbox.execute("x = 1", Some(&mut df)).await;

        assert!(!result.success);
        assert_eq!(result.diagnostics.execution_step, ExecutionStep::DatetimeConversion);
        assert_eq!(result.error_context.unwrap().error_type, "DateParseError");
        assert_eq!(runtime.runs().len(), 1);
    }

    #[tokio::test]
    async fn test_library_import_failure_is_a_dependency_failure() {
        let outcome = RuntimeOutcome {
            phase: RuntimePhase::Loading,
            ..RuntimeOutcome::raised("ModuleNotFoundError", "No module named 'pandas'")
        };
        let sandbox = Sandbox::new(Arc::new(FakeRuntime::bare().with_outcome(outcome)));
        let mut df = frame();

        let result = sandbox.execute("result = df['value'].sum()", Some(&mut df)).await;

        assert!(!result.success);
        assert_eq!(result.diagnostics.execution_step, ExecutionStep::DependencyCheck);
    }

    #[tokio::test]
    async fn test_runtime_unavailable_is_a_failure() {
        let runtime = FakeRuntime::new().with_unavailable("No such file or directory");
        let sandbox = Sandbox::new(Arc::new(runtime));

        let result = sandbox.execute("x = 1", None).await;

        assert!(!result.success);
        assert_eq!(result.error_context.unwrap().error_type, "RuntimeUnavailable");
        assert!(result.diagnostics.data_info.is_none());
    }

    #[tokio::test]
    async fn test_injected_names_filtered() {
        let mut bindings = BTreeMap::new();
        bindings.insert("df".to_string(), "frame".to_string());
        bindings.insert("__doc__".to_string(), "None".to_string());
        bindings.insert("result".to_string(), "60".to_string());
        let runtime = FakeRuntime::new().with_outcome(RuntimeOutcome::completed("", bindings));
        let sandbox = Sandbox::new(Arc::new(runtime));

        let result = sandbox.execute("result = 60", None).await;

        assert_eq!(result.bindings.keys().collect::<Vec<_>>(), vec!["result"]);
    }

    #[tokio::test]
    async fn test_records_imports_and_plotly_preamble() {
        let runtime = Arc::new(FakeRuntime::new());
        let sandbox = Sandbox::new(runtime.clone());

        let result = sandbox
            .execute("import plotly.express as px\nimport numpy as np", None)
            .await;

        assert_eq!(result.diagnostics.imports_loaded, vec!["numpy", "plotly"]);
        assert!(runtime.runs()[0].code.starts_with("import warnings\n"));
    }

    #[tokio::test]
    async fn test_sum_with_python() {
        let probe = tokio::process::Command::new("python3")
            .args(["-c", "import pandas, numpy"])
            .output()
            .await;
        if !probe.map(|o| o.status.success()).unwrap_or(false) {
            return;
        }
        let sandbox = Sandbox::new(Arc::new(PythonRuntime::default()));
        let mut df = frame();

        let result = sandbox.execute("result = df['value'].sum()", Some(&mut df)).await;

        assert!(result.success, "{:?}", result.error_text());
        assert_eq!(result.bindings.len(), 1);
        assert_eq!(result.bindings["result"], "51.0");
    }
}
