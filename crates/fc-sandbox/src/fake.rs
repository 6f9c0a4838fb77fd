//! In-process runtime with canned outcomes

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Mutex;

use fc_core::{DataFrame, DataInfo};

use crate::runtime::{Capabilities, RuntimeOutcome, ScriptRuntime};

/// A run the fake was asked to perform
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRun {
    pub code: String,
    pub data_info: Option<DataInfo>,
}

/// Runtime double for tests.
///
/// Runs pop queued outcomes (an empty queue means a silent success).
/// `new()` starts with pandas and numpy importable; `bare()` with nothing.
/// Modules in `installable` become importable once installed; modules in
/// `broken` fail to install; anything else installs but never imports.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    outcomes: Mutex<VecDeque<std::result::Result<RuntimeOutcome, String>>>,
    importable: Mutex<BTreeSet<String>>,
    installable: BTreeSet<String>,
    broken: BTreeSet<String>,
    runs: Mutex<Vec<RecordedRun>>,
    installs: Mutex<Vec<String>>,
}

fn names(modules: &[&str]) -> Vec<String> {
    modules.iter().map(|m| m.to_string()).collect()
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::bare().with_importable(&["numpy", "pandas"])
    }

    /// Interpreter without any third-party modules
    pub fn bare() -> Self {
        Self::default()
    }

    pub fn with_importable(self, modules: &[&str]) -> Self {
        if let Ok(mut importable) = self.importable.lock() {
            importable.extend(names(modules));
        }
        self
    }

    pub fn with_installable(mut self, modules: &[&str]) -> Self {
        self.installable.extend(names(modules));
        self
    }

    pub fn with_broken_install(mut self, modules: &[&str]) -> Self {
        self.broken.extend(names(modules));
        self
    }

    pub fn with_outcome(self, outcome: RuntimeOutcome) -> Self {
        self.push_outcome(outcome);
        self
    }

    /// Next run fails as if the interpreter could not be started
    pub fn with_unavailable(self, message: impl Into<String>) -> Self {
        if let Ok(mut queue) = self.outcomes.lock() {
            queue.push_back(Err(message.into()));
        }
        self
    }

    pub fn push_outcome(&self, outcome: RuntimeOutcome) {
        if let Ok(mut queue) = self.outcomes.lock() {
            queue.push_back(Ok(outcome));
        }
    }

    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn installs(&self) -> Vec<String> {
        self.installs.lock().map(|i| i.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ScriptRuntime for FakeRuntime {
    async fn run(
        &self,
        code: &str,
        frame: Option<&DataFrame>,
        _capabilities: &Capabilities,
    ) -> Result<RuntimeOutcome> {
        if let Ok(mut runs) = self.runs.lock() {
            runs.push(RecordedRun {
                code: code.to_string(),
                data_info: frame.map(DataInfo::capture),
            });
        }
        let next = self
            .outcomes
            .lock()
            .map_err(|_| anyhow::anyhow!("fake runtime poisoned"))?
            .pop_front();
        match next {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(RuntimeOutcome::completed("", Default::default())),
        }
    }

    async fn is_importable(&self, module: &str) -> Result<bool> {
        Ok(self
            .importable
            .lock()
            .map(|i| i.contains(module))
            .unwrap_or(false))
    }

    async fn install(&self, module: &str) -> Result<()> {
        if let Ok(mut installs) = self.installs.lock() {
            installs.push(module.to_string());
        }
        if self.broken.contains(module) {
            anyhow::bail!("No matching distribution found for {}", module);
        }
        if self.installable.contains(module) {
            if let Ok(mut importable) = self.importable.lock() {
                importable.insert(module.to_string());
            }
        }
        Ok(())
    }
}
