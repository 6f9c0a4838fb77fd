//! Session memory for fc-agent
//!
//! Append-only logs of dataset metadata, analyses and interactions. The
//! orchestrator reads a [`RetrievalContext`] from the store when it builds
//! prompts, and the whole store is written to `sessions/<id>/memory.json`
//! when the session closes.

pub mod record;
pub mod store;

pub use record::{AttemptRecord, DatasetInfo, Interaction, MemoryPayload, MemoryRecord, RecordKind};
pub use store::{MemoryStore, RetrievalContext, SCHEMA_VERSION};
