//! Oracle trait and model metadata
//!
//! The agent only needs one thing from a text-generation backend: send a
//! prompt, get text back. Everything else (model discovery, connection
//! probing) lives on the concrete client.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Text-generation oracle
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Send a prompt and return the generated text.
    ///
    /// No timeout is imposed; generation may take arbitrarily long.
    async fn invoke(&self, prompt: &str) -> Result<String>;

    /// Model name, for logs
    fn model(&self) -> &str;
}

#[async_trait]
impl<T: Oracle + ?Sized> Oracle for Arc<T> {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        (**self).invoke(prompt).await
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}

/// Model information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub family: Option<String>,
    pub parameters: Option<String>,
    pub modified_at: Option<String>,
}

impl ModelInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            family: None,
            parameters: None,
            modified_at: None,
        }
    }
}
