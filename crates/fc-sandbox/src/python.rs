//! Python subprocess runtime
//!
//! Each run starts a fresh interpreter with a fixed harness passed through
//! `-c`. The snippet arrives on stdin, the dataset as a temporary CSV. The
//! harness seeds the namespace, executes the snippet with stdout redirected
//! and prints one JSON envelope on a line starting with [`RESULT_MARKER`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use fc_core::DataFrame;

use crate::runtime::{Capabilities, RuntimeOutcome, ScriptRuntime};

/// Prefix of the envelope line written by the harness
pub const RESULT_MARKER: &str = "__FC_RESULT__";

const HARNESS: &str = r#"
import contextlib, importlib, io, json, sys, traceback

MARKER = "__FC_RESULT__"
caps = json.loads(sys.argv[2])
code = sys.stdin.read()
envelope = {"success": False, "stdout": "", "bindings": {}, "phase": "loading",
            "error_type": None, "error_msg": None, "traceback": None}
namespace = {}
captured = io.StringIO()
try:
    for alias, module in caps["libraries"]:
        namespace[alias] = importlib.import_module(module)
    envelope["phase"] = "converting"
    if sys.argv[1]:
        import pandas
        frame = pandas.read_csv(sys.argv[1])
        column = caps.get("datetime_column")
        if column and column in frame.columns:
            frame[column] = pandas.to_datetime(frame[column])
        namespace[caps["dataset_binding"]] = frame
    injected = set(namespace)
    envelope["phase"] = "executing"
    with contextlib.redirect_stdout(captured):
        exec(compile(code, "<snippet>", "exec"), namespace)
    envelope["phase"] = "collecting"
    bindings = {}
    for name, value in namespace.items():
        if name in injected or name.startswith("__"):
            continue
        try:
            if hasattr(value, "head") and hasattr(value, "to_string"):
                bindings[name] = value.head().to_string()
            else:
                bindings[name] = str(value)
        except Exception as exc:
            bindings[name] = "<unprintable %s: %s>" % (type(value).__name__, exc)
    envelope["bindings"] = bindings
    envelope["success"] = True
except BaseException as exc:
    envelope["error_type"] = type(exc).__name__
    envelope["error_msg"] = str(exc)
    envelope["traceback"] = traceback.format_exc()
envelope["stdout"] = captured.getvalue()
sys.__stdout__.write("\n" + MARKER + json.dumps(envelope) + "\n")
sys.__stdout__.flush()
"#;

const IMPORT_PROBE: &str =
    "import importlib.util, sys\nsys.exit(0 if importlib.util.find_spec(sys.argv[1]) else 1)";

/// Import names whose distribution is published under another name
const PACKAGE_ALIASES: &[(&str, &str)] = &[
    ("PIL", "Pillow"),
    ("bs4", "beautifulsoup4"),
    ("cv2", "opencv-python"),
    ("dateutil", "python-dateutil"),
    ("sklearn", "scikit-learn"),
    ("yaml", "PyYAML"),
];

/// Distribution to install for an import name
pub fn package_name(module: &str) -> &str {
    PACKAGE_ALIASES
        .iter()
        .find(|(import, _)| *import == module)
        .map(|(_, package)| *package)
        .unwrap_or(module)
}

fn parse_envelope(stdout: &str) -> Result<RuntimeOutcome> {
    let payload = stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(RESULT_MARKER))
        .ok_or_else(|| anyhow::anyhow!("Interpreter produced no result envelope"))?;
    serde_json::from_str(payload).context("Malformed result envelope")
}

fn tail(text: &str, lines: usize) -> String {
    let collected: Vec<&str> = text.lines().rev().take(lines).collect();
    collected.into_iter().rev().collect::<Vec<_>>().join("\n")
}

pub struct PythonRuntime {
    python: String,
}

impl PythonRuntime {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    pub fn python(&self) -> &str {
        &self.python
    }
}

impl Default for PythonRuntime {
    fn default() -> Self {
        Self::new("python3")
    }
}

#[async_trait]
impl ScriptRuntime for PythonRuntime {
    async fn run(
        &self,
        code: &str,
        frame: Option<&DataFrame>,
        capabilities: &Capabilities,
    ) -> Result<RuntimeOutcome> {
        let csv = match frame {
            Some(frame) => {
                let file = tempfile::Builder::new()
                    .prefix("fc-frame-")
                    .suffix(".csv")
                    .tempfile()
                    .context("Failed to create dataset file")?;
                frame
                    .to_csv_path(file.path())
                    .context("Failed to write dataset file")?;
                Some(file)
            }
            None => None,
        };
        let csv_arg = csv
            .as_ref()
            .map(|f| f.path().to_string_lossy().into_owned())
            .unwrap_or_default();
        let caps_arg = serde_json::to_string(capabilities)?;

        debug!(python = %self.python, code_len = code.len(), "Starting harness");
        let mut child = Command::new(&self.python)
            .arg("-c")
            .arg(HARNESS)
            .arg(&csv_arg)
            .arg(&caps_arg)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.python))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(code.as_bytes())
                .await
                .context("Failed to send code to interpreter")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for interpreter")?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        parse_envelope(&stdout).with_context(|| {
            format!(
                "{} exited with {}: {}",
                self.python,
                output.status,
                tail(&stderr, 5)
            )
        })
    }

    async fn is_importable(&self, module: &str) -> Result<bool> {
        let status = Command::new(&self.python)
            .arg("-c")
            .arg(IMPORT_PROBE)
            .arg(module)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .with_context(|| format!("Failed to start {}", self.python))?;
        Ok(status.success())
    }

    async fn install(&self, module: &str) -> Result<()> {
        let package = package_name(module);
        info!(module = %module, package = %package, "pip install");

        let output = Command::new(&self.python)
            .args(["-m", "pip", "install", package])
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to start {}", self.python))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("pip exited with {}: {}", output.status, tail(&stderr, 3));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimePhase;
    use fc_core::{Cell, Column};

    async fn has_python(modules: &str) -> bool {
        Command::new("python3")
            .arg("-c")
            .arg(format!("import {}", modules))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_parse_envelope_takes_marker_line() {
        let stdout = format!(
            "stray print\n{}{{\"success\": true, \"bindings\": {{\"result\": \"6\"}}}}\n",
            RESULT_MARKER
        );
        let outcome = parse_envelope(&stdout).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.bindings["result"], "6");
    }

    #[test]
    fn test_parse_envelope_missing() {
        assert!(parse_envelope("Segmentation fault\n").is_err());
    }

    #[test]
    fn test_package_aliases() {
        assert_eq!(package_name("sklearn"), "scikit-learn");
        assert_eq!(package_name("prophet"), "prophet");
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_error() {
        let runtime = PythonRuntime::new("/nonexistent/python3");
        let result = runtime.run("x = 1", None, &Capabilities::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_import_probe() {
        if !has_python("json").await {
            return;
        }
        let runtime = PythonRuntime::default();
        assert!(runtime.is_importable("json").await.unwrap());
        assert!(!runtime.is_importable("fc_no_such_module_xyz").await.unwrap());
    }

    #[tokio::test]
    async fn test_run_collects_bindings_and_stdout() {
        if !has_python("pandas, numpy").await {
            return;
        }
        let frame = fc_core::DataFrame::new(vec![
            Column::new("date", vec![Cell::Text("2024-01-01".into()), Cell::Text("2024-01-02".into())]),
            Column::new("value", vec![Cell::Int(2), Cell::Int(4)]),
        ])
        .unwrap();

        let outcome = PythonRuntime::default()
            .run(
                "total = int(df['value'].sum())\nprint(df['date'].dtype)",
                Some(&frame),
                &Capabilities::default(),
            )
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.stdout, "datetime64[ns]\n");
        assert_eq!(outcome.bindings.len(), 1);
        assert_eq!(outcome.bindings["total"], "6");
    }

    #[tokio::test]
    async fn test_run_reports_exception() {
        if !has_python("pandas, numpy").await {
            return;
        }
        let outcome = PythonRuntime::default()
            .run("print('before')\nraise KeyError('missing')", None, &Capabilities::default())
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.error_type.as_deref(), Some("KeyError"));
        assert_eq!(outcome.stdout, "before\n");
        assert!(outcome.traceback.unwrap_or_default().contains("KeyError"));
    }

    #[tokio::test]
    async fn test_run_reports_conversion_phase() {
        if !has_python("pandas, numpy").await {
            return;
        }
        let frame = fc_core::DataFrame::new(vec![Column::new(
            "date",
            vec![Cell::Text("not a date".into())],
        )])
        .unwrap();

        let outcome = PythonRuntime::default()
            .run("x = 1", Some(&frame), &Capabilities::default())
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.phase, RuntimePhase::Converting);
    }
}
