//! Core types and utilities for fc-agent
//!
//! # Modules
//!
//! - `config`: Environment loading and agent settings
//! - `context`: The dataset context a session works against
//! - `error`: Error types and Result alias
//! - `execution`: Execution results, stages and diagnostic bundles
//! - `frame`: Column-oriented tabular dataset

pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod frame;

// Re-exports
pub use config::AgentConfig;
pub use context::ExecutionContext;
pub use error::{Error, Result};
pub use execution::{DataInfo, Diagnostics, ErrorContext, ExecutionResult, ExecutionStep};
pub use frame::{Cell, Column, DType, DataFrame};
