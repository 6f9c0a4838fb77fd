//! Agent configuration
//!
//! [`AgentConfig::from_env`] reads `OLLAMA_BASE_URL` and the `FC_*`
//! variables. [`load_environment`] can seed those variables first from an
//! env file: `$FC_ENV_FILE`, then `/etc/fc-agent/environment`, then `./.env`.
//! Variables already set in the process win over the file.
//!
//! ```no_run
//! use fc_core::config::{load_environment, AgentConfig};
//!
//! load_environment();
//! let config = AgentConfig::from_env();
//! println!("sessions under {}", config.sessions_dir.display());
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Env files checked when `FC_ENV_FILE` is unset or unreadable
pub const ENV_FILE_PATHS: &[&str] = &["/etc/fc-agent/environment", ".env"];

/// Default Ollama endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Seed the process environment from the first env file found
pub fn load_environment() -> Option<PathBuf> {
    let custom = std::env::var("FC_ENV_FILE").ok();
    let loaded = custom
        .iter()
        .map(String::as_str)
        .chain(ENV_FILE_PATHS.iter().copied())
        .map(Path::new)
        .find_map(apply_env_file);
    if loaded.is_none() {
        debug!("No environment file found");
    }
    loaded
}

fn apply_env_file(path: &Path) -> Option<PathBuf> {
    if !path.exists() {
        return None;
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path.display(), e);
            return None;
        }
    };

    let mut skipped = 0;
    let pairs = parse_env_file(&content);
    for (key, value) in &pairs {
        if std::env::var_os(key).is_some() {
            skipped += 1;
            continue;
        }
        std::env::set_var(key, value);
    }
    info!(
        path = %path.display(),
        loaded = pairs.len() - skipped,
        skipped,
        "Loaded environment file"
    );
    Some(path.to_path_buf())
}

/// `KEY=VALUE` pairs of an env file; comments, blanks and `export ` are allowed
fn parse_env_file(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|q| value.strip_prefix(*q).and_then(|v| v.strip_suffix(*q)))
        .unwrap_or(value)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parsed value of `key`; a value that does not parse is reported and ignored
fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring invalid configuration value");
            None
        }
    }
}

fn env_positive(key: &str) -> Option<usize> {
    env_parsed::<usize>(key).filter(|v| *v > 0)
}

/// Settings the agent is started with
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Ollama base URL
    pub ollama_url: String,
    /// Model to use; None means ask the operator
    pub model: Option<String>,
    /// Sampling temperature for generation
    pub temperature: f32,
    /// Python interpreter used by the sandbox
    pub python: String,
    /// Root directory for persisted sessions
    pub sessions_dir: PathBuf,
    /// Periods forecast per series
    pub forecast_horizon: usize,
    /// Interactions included in the query prompt
    pub history_window: usize,
    /// Connection attempts when listing models
    pub connect_retries: u32,
    /// Fixed delay between connection attempts
    pub retry_delay: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: None,
            temperature: 0.7,
            python: "python3".to_string(),
            sessions_dir: PathBuf::from("sessions"),
            forecast_horizon: 10,
            history_window: 5,
            connect_retries: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

impl AgentConfig {
    /// Build from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ollama_url: env_string("OLLAMA_BASE_URL").unwrap_or(defaults.ollama_url),
            model: env_string("FC_MODEL"),
            temperature: env_parsed("FC_TEMPERATURE").unwrap_or(defaults.temperature),
            python: env_string("FC_PYTHON").unwrap_or(defaults.python),
            sessions_dir: env_string("FC_SESSIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.sessions_dir),
            forecast_horizon: env_positive("FC_FORECAST_HORIZON").unwrap_or(defaults.forecast_horizon),
            history_window: env_positive("FC_HISTORY_WINDOW").unwrap_or(defaults.history_window),
            connect_retries: env_parsed::<u32>("FC_CONNECT_RETRIES")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.connect_retries),
            retry_delay: env_parsed("FC_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_file() {
        let content = "\
# Ollama on the GPU box
OLLAMA_BASE_URL=http://gpu:11434
export FC_MODEL=\"llama3:8b\"
FC_PYTHON='/opt/venv/bin/python'

=orphan
not a pair
";
        assert_eq!(
            parse_env_file(content),
            vec![
                ("OLLAMA_BASE_URL".to_string(), "http://gpu:11434".to_string()),
                ("FC_MODEL".to_string(), "llama3:8b".to_string()),
                ("FC_PYTHON".to_string(), "/opt/venv/bin/python".to_string()),
            ]
        );
    }

    #[test]
    fn test_env_file_does_not_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("environment");
        fs::write(
            &path,
            "FC_TEST_LOADED_VALUE=from_file\nFC_TEST_PRESET_VALUE=from_file\n",
        )
        .unwrap();
        std::env::set_var("FC_TEST_PRESET_VALUE", "preset");

        assert_eq!(apply_env_file(&path), Some(path.clone()));
        assert_eq!(env_string("FC_TEST_LOADED_VALUE").as_deref(), Some("from_file"));
        assert_eq!(env_string("FC_TEST_PRESET_VALUE").as_deref(), Some("preset"));
        assert!(apply_env_file(&dir.path().join("absent")).is_none());
    }

    #[test]
    fn test_invalid_and_zero_values_ignored() {
        std::env::set_var("FC_TEST_HORIZON_ZERO", "0");
        std::env::set_var("FC_TEST_HORIZON_WORD", "ten");
        std::env::set_var("FC_TEST_HORIZON_OK", " 24 ");

        assert_eq!(env_positive("FC_TEST_HORIZON_ZERO"), None);
        assert_eq!(env_positive("FC_TEST_HORIZON_WORD"), None);
        assert_eq!(env_positive("FC_TEST_HORIZON_OK"), Some(24));
        assert_eq!(env_parsed::<f32>("FC_TEST_HORIZON_UNSET"), None);
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.ollama_url, "http://localhost:11434");
        assert_eq!(config.history_window, 5);
        assert_eq!(config.connect_retries, 3);
        assert!(config.model.is_none());
    }
}
