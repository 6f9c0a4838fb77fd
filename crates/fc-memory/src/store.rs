//! Session memory store

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use fc_core::{Error, Result};

use crate::record::{DatasetInfo, Interaction, MemoryPayload, MemoryRecord};

/// Version written to `memory.json`
pub const SCHEMA_VERSION: u32 = 1;

const MEMORY_FILE: &str = "memory.json";

/// What prompt construction gets to see
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalContext {
    /// Most recently stored analysis
    pub last_analysis: Option<serde_json::Value>,
    /// Every interaction, oldest first
    pub conversation_history: Vec<Interaction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSession {
    schema_version: u32,
    session_id: String,
    short_term: Vec<MemoryRecord>,
    long_term: Vec<MemoryRecord>,
}

/// Append-only memory for one session.
///
/// Every record lands in `short_term`; dataset metadata is also kept in
/// `long_term`. Conversation history is the interaction records of
/// `short_term` in insertion order.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    session_id: String,
    short_term: Vec<MemoryRecord>,
    long_term: Vec<MemoryRecord>,
}

impl MemoryStore {
    /// New session keyed by the current local time
    pub fn new() -> Self {
        Self::with_session_id(Local::now().format("%Y%m%d_%H%M%S").to_string())
    }

    pub fn with_session_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            short_term: Vec::new(),
            long_term: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn short_term(&self) -> &[MemoryRecord] {
        &self.short_term
    }

    pub fn long_term(&self) -> &[MemoryRecord] {
        &self.long_term
    }

    pub fn store_dataset_info(&mut self, info: DatasetInfo) {
        debug!(target_column = %info.target_column, "Storing dataset info");
        let record = MemoryRecord::new(MemoryPayload::DatasetInfo(info));
        self.long_term.push(record.clone());
        self.short_term.push(record);
    }

    pub fn store_analysis(&mut self, analysis: serde_json::Value) {
        self.short_term
            .push(MemoryRecord::new(MemoryPayload::Analysis(analysis)));
    }

    pub fn store_interaction(&mut self, interaction: Interaction) {
        debug!(query = %interaction.query, "Storing interaction");
        self.short_term
            .push(MemoryRecord::new(MemoryPayload::Interaction(interaction)));
    }

    /// Interactions, oldest first
    pub fn conversation_history(&self) -> impl Iterator<Item = &Interaction> {
        self.short_term.iter().filter_map(|r| match &r.payload {
            MemoryPayload::Interaction(i) => Some(i),
            _ => None,
        })
    }

    pub fn last_interaction(&self) -> Option<&Interaction> {
        self.conversation_history().last()
    }

    pub fn last_analysis(&self) -> Option<&serde_json::Value> {
        self.short_term.iter().rev().find_map(|r| match &r.payload {
            MemoryPayload::Analysis(a) => Some(a),
            _ => None,
        })
    }

    pub fn relevant_context(&self) -> RetrievalContext {
        RetrievalContext {
            last_analysis: self.last_analysis().cloned(),
            conversation_history: self.conversation_history().cloned().collect(),
        }
    }

    /// Directory this session is saved under
    pub fn session_dir(&self, base: impl AsRef<Path>) -> PathBuf {
        base.as_ref().join(&self.session_id)
    }

    /// Write `<base>/<session_id>/memory.json`, returning its path
    pub fn save_to_disk(&self, base: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = self.session_dir(base);
        fs::create_dir_all(&dir)?;

        let persisted = PersistedSession {
            schema_version: SCHEMA_VERSION,
            session_id: self.session_id.clone(),
            short_term: self.short_term.clone(),
            long_term: self.long_term.clone(),
        };
        let path = dir.join(MEMORY_FILE);
        fs::write(&path, serde_json::to_string_pretty(&persisted)?)?;

        info!(
            session = %self.session_id,
            records = self.short_term.len(),
            "Session saved to {}",
            path.display()
        );
        Ok(path)
    }

    /// Load a saved `memory.json`
    pub fn load_from_disk(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let value: serde_json::Value = serde_json::from_str(&text)?;

        let version = value
            .get("schema_version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::config("Session file has no schema_version"))?;
        if version > u64::from(SCHEMA_VERSION) {
            return Err(Error::config(format!(
                "Unsupported session schema version {} (this build reads up to {})",
                version, SCHEMA_VERSION
            )));
        }

        let persisted: PersistedSession = serde_json::from_value(value)?;
        Ok(Self {
            session_id: persisted.session_id,
            short_term: persisted.short_term,
            long_term: persisted.long_term,
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
