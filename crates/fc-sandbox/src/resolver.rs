//! Dependency resolver
//!
//! Finds the external modules a snippet imports, adds the libraries the
//! runtime injects, asks the runtime which of them are missing, and installs them on request. Import discovery is two
//! tier: [`parse_imports`] lexes the snippet into logical statements and
//! rejects malformed input, [`scan_import_lines`] is a line-prefix scan that
//! accepts anything. [`extract_imports`] tries the first and falls back to
//! the second.

use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::runtime::{Capabilities, ScriptRuntime};
use crate::stdlib::is_stdlib;

/// Keywords that may introduce a one-line compound statement (`try: import x`)
const COMPOUND_KEYWORDS: &[&str] = &[
    "async", "class", "def", "elif", "else", "except", "finally", "for", "if", "try", "while",
    "with",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportScanError {
    #[error("unterminated string literal starting on line {0}")]
    UnterminatedString(usize),

    #[error("unbalanced bracket on line {0}")]
    UnbalancedBracket(usize),

    #[error("malformed import statement on line {line}: {statement}")]
    MalformedImport { line: usize, statement: String },
}

struct LogicalLine {
    line: usize,
    text: String,
}

/// Split source into logical lines with comments dropped and string
/// literals collapsed to `""`.
fn logical_lines(code: &str) -> Result<Vec<LogicalLine>, ImportScanError> {
    let chars: Vec<char> = code.chars().collect();
    let len = chars.len();
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut start_line = 1;
    let mut line = 1;
    let mut depth: i32 = 0;
    let mut i = 0;

    let mut flush = |current: &mut String, start_line: usize| {
        let text = current.trim();
        if !text.is_empty() {
            lines.push(LogicalLine {
                line: start_line,
                text: text.to_string(),
            });
        }
        current.clear();
    };

    while i < len {
        let c = chars[i];
        match c {
            '#' => {
                while i < len && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '\'' | '"' => {
                let triple = i + 2 < len && chars[i + 1] == c && chars[i + 2] == c;
                let open_line = line;
                i += if triple { 3 } else { 1 };
                loop {
                    if i >= len {
                        return Err(ImportScanError::UnterminatedString(open_line));
                    }
                    let ch = chars[i];
                    if ch == '\\' {
                        if chars.get(i + 1) == Some(&'\n') {
                            line += 1;
                        }
                        i += 2;
                        continue;
                    }
                    if ch == '\n' {
                        if !triple {
                            return Err(ImportScanError::UnterminatedString(open_line));
                        }
                        line += 1;
                    }
                    if ch == c {
                        if !triple {
                            i += 1;
                            break;
                        }
                        if i + 2 < len && chars[i + 1] == c && chars[i + 2] == c {
                            i += 3;
                            break;
                        }
                    }
                    i += 1;
                }
                current.push_str("\"\"");
                continue;
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(ImportScanError::UnbalancedBracket(line));
                }
            }
            '\\' if chars.get(i + 1) == Some(&'\n') => {
                current.push(' ');
                line += 1;
                i += 2;
                continue;
            }
            '\n' => {
                line += 1;
                if depth == 0 {
                    flush(&mut current, start_line);
                    start_line = line;
                } else {
                    current.push(' ');
                }
                i += 1;
                continue;
            }
            _ => {}
        }
        current.push(c);
        i += 1;
    }

    if depth != 0 {
        return Err(ImportScanError::UnbalancedBracket(line));
    }
    flush(&mut current, start_line);
    Ok(lines)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

fn is_dotted_name(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_identifier)
}

fn root_of(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}

/// Drop `if x:` / `try:` style prefixes so the trailing statement is visible
fn strip_compound_prefix(stmt: &str) -> &str {
    let keyword = stmt
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or("");
    if !COMPOUND_KEYWORDS.contains(&keyword) {
        return stmt;
    }
    let mut depth = 0i32;
    for (idx, ch) in stmt.char_indices() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ':' if depth == 0 => return strip_compound_prefix(stmt[idx + 1..].trim()),
            _ => {}
        }
    }
    stmt
}

fn collect_statement(
    stmt: &str,
    line: usize,
    out: &mut BTreeSet<String>,
) -> Result<(), ImportScanError> {
    let malformed = || ImportScanError::MalformedImport {
        line,
        statement: stmt.to_string(),
    };
    let mut words = stmt.split_whitespace();

    match words.next() {
        Some("import") => {
            let rest = stmt["import".len()..].trim();
            if rest.is_empty() {
                return Err(malformed());
            }
            for part in rest.split(',') {
                let mut tokens = part.split_whitespace();
                let name = tokens.next().ok_or_else(malformed)?;
                match (tokens.next(), tokens.next(), tokens.next()) {
                    (None, _, _) => {}
                    (Some("as"), Some(alias), None) if is_identifier(alias) => {}
                    _ => return Err(malformed()),
                }
                if !is_dotted_name(name) {
                    return Err(malformed());
                }
                out.insert(root_of(name).to_string());
            }
        }
        Some("from") => {
            let module = words.next().ok_or_else(malformed)?;
            if words.next() != Some("import") || words.next().is_none() {
                return Err(malformed());
            }
            // Relative imports refer to the snippet's own package
            if module.starts_with('.') {
                return Ok(());
            }
            if !is_dotted_name(module) {
                return Err(malformed());
            }
            out.insert(root_of(module).to_string());
        }
        _ => {}
    }
    Ok(())
}

/// Structured scan: every imported module root, or an error on malformed code
pub fn parse_imports(code: &str) -> Result<BTreeSet<String>, ImportScanError> {
    let mut modules = BTreeSet::new();
    for logical in logical_lines(code)? {
        for stmt in logical.text.split(';') {
            let stmt = strip_compound_prefix(stmt.trim());
            collect_statement(stmt, logical.line, &mut modules)?;
        }
    }
    Ok(modules)
}

fn leading_identifier(s: &str) -> &str {
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map(|(idx, _)| idx)
        .unwrap_or(s.len());
    &s[..end]
}

/// Line-prefix scan for `import ` and `from ` lines. Never fails.
pub fn scan_import_lines(code: &str) -> BTreeSet<String> {
    let mut modules = BTreeSet::new();
    for line in code.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("import ") {
            for part in rest.split(',') {
                let root = leading_identifier(part.trim());
                if is_identifier(root) {
                    modules.insert(root.to_string());
                }
            }
        } else if let Some(rest) = line.strip_prefix("from ") {
            let module = rest.trim_start();
            if module.starts_with('.') {
                continue;
            }
            let root = leading_identifier(module);
            if is_identifier(root) {
                modules.insert(root.to_string());
            }
        }
    }
    modules
}

/// Imported module roots, sorted; structured scan first, prefix scan on failure
pub fn extract_imports(code: &str) -> Vec<String> {
    match parse_imports(code) {
        Ok(modules) => modules.into_iter().collect(),
        Err(e) => {
            debug!("Import parse failed ({}), using line scan", e);
            scan_import_lines(code).into_iter().collect()
        }
    }
}

/// Which imports are available
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    /// Injected libraries plus the non-stdlib modules the snippet imports
    pub required: Vec<String>,
    /// Required modules the runtime cannot import
    pub missing: Vec<String>,
    pub satisfied: bool,
}

/// Per-module install report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub module: String,
    /// Package manager reported success
    pub installed: bool,
    /// Module imports after the install attempt
    pub importable: bool,
    pub message: String,
}

impl InstallOutcome {
    pub fn succeeded(&self) -> bool {
        self.installed && self.importable
    }
}

pub struct DependencyResolver {
    runtime: Arc<dyn ScriptRuntime>,
    /// Modules the runtime imports before any snippet runs
    baseline: Vec<String>,
}

impl DependencyResolver {
    pub fn new(runtime: Arc<dyn ScriptRuntime>) -> Self {
        Self::with_capabilities(runtime, &Capabilities::default())
    }

    pub fn with_capabilities(runtime: Arc<dyn ScriptRuntime>, capabilities: &Capabilities) -> Self {
        Self {
            runtime,
            baseline: capabilities.modules(),
        }
    }

    pub async fn resolve(&self, code: &str) -> Resolution {
        let required: Vec<String> = extract_imports(code)
            .into_iter()
            .filter(|m| !is_stdlib(m))
            .chain(self.baseline.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut missing = Vec::new();
        for module in &required {
            match self.runtime.is_importable(module).await {
                Ok(true) => {}
                Ok(false) => missing.push(module.clone()),
                Err(e) => {
                    warn!(module = %module, "Import probe failed: {:#}", e);
                    missing.push(module.clone());
                }
            }
        }

        if !missing.is_empty() {
            info!("Missing required packages: {}", missing.join(", "));
        }
        Resolution {
            satisfied: missing.is_empty(),
            required,
            missing,
        }
    }

    /// Install each module in turn and re-probe it.
    ///
    /// Earlier successes are kept when a later module fails.
    pub async fn install(&self, modules: &[String]) -> Vec<InstallOutcome> {
        let mut outcomes = Vec::with_capacity(modules.len());
        for module in modules {
            info!(module = %module, "Installing package");
            let outcome = match self.runtime.install(module).await {
                Ok(()) => {
                    let importable = self.runtime.is_importable(module).await.unwrap_or(false);
                    let message = if importable {
                        format!("Successfully installed {}", module)
                    } else {
                        format!("Warning: {} installed but import failed", module)
                    };
                    InstallOutcome {
                        module: module.clone(),
                        installed: true,
                        importable,
                        message,
                    }
                }
                Err(e) => {
                    warn!(module = %module, "Install failed: {:#}", e);
                    InstallOutcome {
                        module: module.clone(),
                        installed: false,
                        importable: false,
                        message: format!("Error installing {}: {:#}", module, e),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeRuntime;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_import_forms() {
        let code = "\
import pandas as pd, numpy
import os.path
from sklearn.linear_model import LinearRegression
from statsmodels.tsa import (
    arima,
    holtwinters,
)
x = 1; import json
try: import prophet
except ImportError: pass
";
        assert_eq!(
            parse_imports(code).unwrap(),
            set(&["json", "numpy", "os", "pandas", "prophet", "sklearn", "statsmodels"])
        );
    }

    #[test]
    fn test_parse_ignores_strings_comments_and_relative() {
        let code = "\
# import seaborn
text = \"import requests\"
doc = '''
import scipy
'''
from . import helpers
from .utils import thing
import matplotlib.pyplot as plt  # plotting
";
        assert_eq!(parse_imports(code).unwrap(), set(&["matplotlib"]));
    }

    #[test]
    fn test_parse_imports_inside_functions() {
        let code = "def f(x: int) -> int:\n    import math\n    return math.floor(x)\n";
        assert_eq!(parse_imports(code).unwrap(), set(&["math"]));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            parse_imports("x = 'unterminated\nimport numpy"),
            Err(ImportScanError::UnterminatedString(1))
        ));
        assert!(matches!(
            parse_imports("print(1))"),
            Err(ImportScanError::UnbalancedBracket(1))
        ));
        assert!(matches!(
            parse_imports("import\n"),
            Err(ImportScanError::MalformedImport { line: 1, .. })
        ));
        assert!(parse_imports("from numpy\n").is_err());
        assert!(parse_imports("import numpy as\n").is_err());
    }

    #[test]
    fn test_line_scan_is_lenient() {
        let code = "import numpy as np, scipy.stats\nfrom pandas import (\nfrom .local import x\nfor = ]]\n";
        assert_eq!(scan_import_lines(code), set(&["numpy", "pandas", "scipy"]));
        assert!(scan_import_lines("\u{0}\u{ffff}'''\"").is_empty());
    }

    #[test]
    fn test_extract_falls_back_on_malformed_code() {
        let code = "import prophet\nprint('oops\n";
        assert_eq!(extract_imports(code), vec!["prophet"]);
    }

    #[tokio::test]
    async fn test_resolve_skips_stdlib_and_available() {
        let runtime = Arc::new(FakeRuntime::new());
        let resolver = DependencyResolver::new(runtime);

        let resolution = resolver
            .resolve("import os, json\nimport pandas as pd\nimport prophet\n")
            .await;

        assert_eq!(resolution.required, vec!["numpy", "pandas", "prophet"]);
        assert_eq!(resolution.missing, vec!["prophet"]);
        assert!(!resolution.satisfied);
    }

    #[tokio::test]
    async fn test_resolve_satisfied() {
        let resolver = DependencyResolver::new(Arc::new(FakeRuntime::new()));
        let resolution = resolver.resolve("result = df['value'].sum()").await;
        assert!(resolution.satisfied);
        assert_eq!(resolution.required, vec!["numpy", "pandas"]);
    }

    #[tokio::test]
    async fn test_resolve_probes_injected_libraries() {
        let runtime = Arc::new(FakeRuntime::bare().with_importable(&["numpy"]));
        let resolver = DependencyResolver::new(runtime);

        let resolution = resolver.resolve("result = df['value'].sum()").await;

        assert!(!resolution.satisfied);
        assert_eq!(resolution.missing, vec!["pandas"]);
    }

    #[tokio::test]
    async fn test_resolve_without_injected_libraries() {
        let capabilities = Capabilities {
            libraries: Vec::new(),
            ..Capabilities::default()
        };
        let resolver =
            DependencyResolver::with_capabilities(Arc::new(FakeRuntime::bare()), &capabilities);

        let resolution = resolver.resolve("x = 1").await;

        assert!(resolution.satisfied);
        assert!(resolution.required.is_empty());
    }

    #[tokio::test]
    async fn test_install_keeps_partial_success() {
        let runtime = Arc::new(
            FakeRuntime::new()
                .with_installable(&["prophet"])
                .with_broken_install(&["badpkg"]),
        );
        let resolver = DependencyResolver::new(runtime.clone());

        let outcomes = resolver
            .install(&["prophet".to_string(), "badpkg".to_string()])
            .await;

        assert!(outcomes[0].succeeded());
        assert!(!outcomes[1].installed);
        assert_eq!(runtime.installs(), vec!["prophet", "badpkg"]);
        // prophet stays installed
        assert!(resolver.resolve("import prophet").await.satisfied);
    }
}
