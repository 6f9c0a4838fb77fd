//! Canned-response oracle for deterministic tests and offline sessions

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::provider::Oracle;

/// Replays queued responses in order and records every prompt it receives.
///
/// An exhausted queue, or a queued failure, makes `invoke` return an error.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue another successful response
    pub fn push(&self, response: impl Into<String>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(response.into()));
        }
    }

    /// Queue a transport failure
    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(message.into()));
        }
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let next = self
            .responses
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted oracle poisoned"))?
            .pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("scripted oracle has no more responses")),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_and_records_prompts() {
        let oracle = ScriptedOracle::new(["first", "second"]);

        assert_eq!(oracle.invoke("a").await.unwrap(), "first");
        assert_eq!(oracle.invoke("b").await.unwrap(), "second");
        assert!(oracle.invoke("c").await.is_err());
        assert_eq!(oracle.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_queued_failure() {
        let oracle = ScriptedOracle::default();
        oracle.push_failure("connection reset");
        oracle.push("ok");

        let err = oracle.invoke("x").await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(oracle.remaining(), 1);
    }
}
