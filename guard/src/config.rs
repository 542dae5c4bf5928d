//! Configuration loading for the guard crate's decision surface.
//!
//! Resolution order (later wins), matching the gateway's own loader:
//!
//! 1. Compiled defaults
//! 2. Config file (`guard.toml` / `.yaml` / `.json`)
//! 3. Environment variable overrides (`IPG_GUARD_*`)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::policy::PolicyConfig;
use crate::risk::MockRule;
use crate::taint::TaintConfig;

/// Errors that can occur while loading guard configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {format} config: {source}")]
    ParseError {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("unsupported config file format: {0}")]
    UnsupportedFormat(String),
}

/// Risk-oracle mode selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeMode {
    #[default]
    Deterministic,
    Network,
}

/// Risk judge configuration: fallback rules plus an optional network oracle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default)]
    pub mode: JudgeMode,
    #[serde(default)]
    pub mock_rules: Vec<MockRule>,
    pub oracle_endpoint: Option<String>,
    #[serde(default = "default_oracle_timeout_ms")]
    pub oracle_timeout_ms: u64,
}

fn default_oracle_timeout_ms() -> u64 {
    500
}

/// The full guard-side configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default)]
    pub taint: TaintConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Builder mirroring the file-then-env resolution used across the workspace.
#[derive(Debug, Default)]
pub struct GuardConfigBuilder {
    base: GuardConfig,
}

impl GuardConfigBuilder {
    pub fn new() -> Self {
        Self {
            base: GuardConfig::default(),
        }
    }

    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GuardConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                    format: "YAML".to_string(),
                    source: Box::new(e),
                })?
            }
            Some("toml") => toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                format: "TOML".to_string(),
                source: Box::new(e),
            })?,
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
                    format: "JSON".to_string(),
                    source: Box::new(e),
                })?
            }
            _ => {
                return Err(ConfigError::UnsupportedFormat(
                    "file extension must be .yaml, .yml, .toml, or .json".to_string(),
                ));
            }
        };
        self.base = config;
        Ok(self)
    }

    pub fn with_env(mut self) -> Self {
        dotenvy::dotenv().ok();
        if let Ok(endpoint) = std::env::var("IPG_GUARD_ORACLE_ENDPOINT") {
            self.base.judge.oracle_endpoint = Some(endpoint);
            self.base.judge.mode = JudgeMode::Network;
        }
        self
    }

    pub fn build(self) -> GuardConfig {
        self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_deterministic_judge() {
        let config = GuardConfigBuilder::new().build();
        assert!(matches!(config.judge.mode, JudgeMode::Deterministic));
    }

    #[test]
    fn env_override_switches_to_network_judge() {
        std::env::set_var("IPG_GUARD_ORACLE_ENDPOINT", "http://localhost:9999/assess");
        let config = GuardConfigBuilder::new().with_env().build();
        assert!(matches!(config.judge.mode, JudgeMode::Network));
        std::env::remove_var("IPG_GUARD_ORACLE_ENDPOINT");
    }
}
