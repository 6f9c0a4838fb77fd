//! Ollama API Client
//!
//! ## API Endpoints
//!
//! | Endpoint | URL | Purpose |
//! |----------|-----|--------|
//! | Local API | `http://localhost:11434` | Local Ollama instance |
//! | Generate | `/api/generate` | Text generation |
//! | Models | `/api/tags` | List local models |
//!
//! Model discovery retries a bounded number of times with a fixed delay and
//! falls back to a default list. Generation itself has no timeout.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use fc_core::{AgentConfig, Error};

use crate::provider::{ModelInfo, Oracle};

/// Ollama API endpoints
pub mod endpoints {
    /// Local API URL (default)
    pub const LOCAL_API: &str = "http://localhost:11434";

    /// Generate endpoint
    /// Full URL: {API}/api/generate
    pub const GENERATE: &str = "/api/generate";

    /// Tags/models endpoint
    /// Full URL: {API}/api/tags
    pub const TAGS: &str = "/api/tags";
}

/// Models offered when the service cannot be reached
pub const FALLBACK_MODELS: &[&str] = &["llama2", "codellama"];

/// Per-request timeout for model discovery
const TAGS_TIMEOUT: Duration = Duration::from_secs(5);

const SERVE_HINT: &str = "Please ensure Ollama service is running: 'ollama serve'";

#[derive(Debug, Deserialize)]
struct OllamaModelsResponse {
    models: Option<Vec<OllamaModel>>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
    modified_at: Option<String>,
    details: Option<OllamaModelDetails>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelDetails {
    family: Option<String>,
    parameter_size: Option<String>,
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaGenerateOptions,
}

#[derive(Debug, Serialize)]
struct OllamaGenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl From<OllamaModel> for ModelInfo {
    fn from(model: OllamaModel) -> Self {
        ModelInfo {
            name: model.name,
            family: model.details.as_ref().and_then(|d| d.family.clone()),
            parameters: model.details.and_then(|d| d.parameter_size),
            modified_at: model.modified_at,
        }
    }
}

/// List models installed on the Ollama service.
///
/// Tries `retries` times with `retry_delay` between attempts. After the last
/// failure a warning is logged and [`FALLBACK_MODELS`] is returned, so this
/// never fails.
pub async fn available_models(base_url: &str, retries: u32, retry_delay: Duration) -> Vec<ModelInfo> {
    let client = Client::builder().build().unwrap_or_default();
    let retries = retries.max(1);

    for attempt in 1..=retries {
        match fetch_tags(&client, base_url).await {
            Ok(models) => {
                info!("Fetched {} models from Ollama", models.len());
                return models;
            }
            Err(e) if attempt == retries => {
                warn!("Could not connect to Ollama service: {:#}", e);
            }
            Err(e) => {
                debug!(attempt, "Model listing failed: {:#}", e);
                info!("Retry {}/{} connecting to Ollama...", attempt, retries);
                tokio::time::sleep(retry_delay).await;
            }
        }
    }

    FALLBACK_MODELS.iter().map(|name| ModelInfo::named(*name)).collect()
}

async fn fetch_tags(client: &Client, base_url: &str) -> Result<Vec<ModelInfo>> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), endpoints::TAGS);
    debug!("Trying Ollama endpoint: {}", url);

    let response = client
        .get(&url)
        .timeout(TAGS_TIMEOUT)
        .send()
        .await
        .context("Failed to reach Ollama")?
        .error_for_status()
        .context("Ollama tags request failed")?;

    let data: OllamaModelsResponse = response
        .json()
        .await
        .context("Failed to parse Ollama tags response")?;

    Ok(data
        .models
        .unwrap_or_default()
        .into_iter()
        .map(ModelInfo::from)
        .collect())
}

/// Ollama generation client bound to one model
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client: Client::builder().build().unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature,
        }
    }

    pub fn from_config(config: &AgentConfig, model: impl Into<String>) -> Self {
        Self::new(config.ollama_url.clone(), model, config.temperature)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a test prompt; any failure makes the oracle unusable
    pub async fn connect(self) -> fc_core::Result<Self> {
        info!(model = %self.model, endpoint = %self.base_url, "Initializing Ollama LLM");
        match self.invoke("test").await {
            Ok(_) => Ok(self),
            Err(e) => Err(Error::oracle_unavailable(format!(
                "Error initializing Ollama LLM: {:#}. {}",
                e, SERVE_HINT
            ))),
        }
    }
}

#[async_trait]
impl Oracle for OllamaClient {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, endpoints::GENERATE);
        debug!(model = %self.model, prompt_len = prompt.len(), "Ollama generate");

        let request = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaGenerateOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send Ollama request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Ollama API error {}: {}", status, body));
        }

        let result: OllamaGenerateResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(result.response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
