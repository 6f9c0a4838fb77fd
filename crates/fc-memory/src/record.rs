//! Memory record types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use fc_core::{Diagnostics, ErrorContext};

/// Metadata stored when a dataset is analyzed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub target_column: String,
    pub series_id_column: String,
    pub shape: (usize, usize),
    pub columns: Vec<String>,
}

/// One failed execution inside a repair cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_number: u32,
    pub code: String,
    pub error_text: String,
    pub diagnostics: Diagnostics,
    #[serde(default)]
    pub error_context: Option<ErrorContext>,
}

/// A query (or repair round) and what came back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub timestamp: DateTime<Local>,
    pub query: String,
    pub response: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub fixes: Option<Vec<AttemptRecord>>,
    #[serde(default)]
    pub result: Option<String>,
}

impl Interaction {
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            query: query.into(),
            response: response.into(),
            code: None,
            error: None,
            fixes: None,
            result: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_fixes(mut self, fixes: Vec<AttemptRecord>) -> Self {
        self.fixes = Some(fixes);
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }
}

/// Record payload, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum MemoryPayload {
    DatasetInfo(DatasetInfo),
    Analysis(serde_json::Value),
    Interaction(Interaction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    DatasetInfo,
    Analysis,
    Interaction,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::DatasetInfo => write!(f, "dataset_info"),
            RecordKind::Analysis => write!(f, "analysis"),
            RecordKind::Interaction => write!(f, "interaction"),
        }
    }
}

/// Immutable entry in a memory log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub payload: MemoryPayload,
    pub timestamp: DateTime<Local>,
}

impl MemoryRecord {
    pub fn new(payload: MemoryPayload) -> Self {
        Self {
            payload,
            timestamp: Local::now(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self.payload {
            MemoryPayload::DatasetInfo(_) => RecordKind::DatasetInfo,
            MemoryPayload::Analysis(_) => RecordKind::Analysis,
            MemoryPayload::Interaction(_) => RecordKind::Interaction,
        }
    }
}
