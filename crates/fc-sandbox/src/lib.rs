//! fc-sandbox: running generated code against the dataset
//!
//! # Modules
//!
//! - `runtime`: the [`ScriptRuntime`] seam and the capability set
//! - `python`: Python subprocess runtime
//! - `fake`: in-process runtime with canned outcomes (`test-util`)
//! - `sandbox`: staged execution with diagnostic bundles
//! - `resolver`: import scanning, availability probing, installation
//! - `analysis`: descriptive statistics
//! - `forecast`: the forecast collaborator
//! - `format`: grid tables and result rendering

pub mod analysis;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod forecast;
pub mod format;
pub mod python;
pub mod resolver;
pub mod runtime;
pub mod sandbox;
pub mod stdlib;

pub use analysis::{describe_dataset, format_analysis_output, DatasetAnalysis};
#[cfg(any(test, feature = "test-util"))]
pub use fake::FakeRuntime;
pub use forecast::{format_forecast_output, ForecastPoint, Forecaster, ProphetForecaster, SeriesForecast};
pub use format::format_code_output;
pub use python::PythonRuntime;
pub use resolver::{
    extract_imports, parse_imports, scan_import_lines, DependencyResolver, ImportScanError,
    InstallOutcome, Resolution,
};
pub use runtime::{Capabilities, RuntimeOutcome, RuntimePhase, ScriptRuntime};
pub use sandbox::Sandbox;
pub use stdlib::{is_stdlib, STDLIB_MODULES};
