//! The merged gateway configuration document.
//!
//! Resolution order (later wins): compiled defaults, an optional config
//! file (`gateway.toml` / `.yaml` / `.json`), then `IPG_*` environment
//! variables -- the same file-then-env shape as
//! [`ipg_guard::config::GuardConfigBuilder`], since both loaders serve the
//! one merged document described for operators.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use ipg_guard::config::GuardConfig;

/// Which transport the gateway listens on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    Stdio,
    Http { host: String, port: u16 },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Stdio
    }
}

/// Backend subprocess launch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: "backend".to_string(),
            args: Vec::new(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Warrant authority key paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarrantConfig {
    #[serde(default = "default_production_key")]
    pub production_key_path: PathBuf,
    #[serde(default = "default_shadow_key")]
    pub shadow_key_path: PathBuf,
    #[serde(default = "default_warrant_ttl_secs")]
    pub ttl_secs: i64,
}

fn default_production_key() -> PathBuf {
    PathBuf::from("keys/private_prime.pem")
}

fn default_shadow_key() -> PathBuf {
    PathBuf::from("keys/private_shadow.pem")
}

fn default_warrant_ttl_secs() -> i64 {
    3600
}

impl Default for WarrantConfig {
    fn default() -> Self {
        Self {
            production_key_path: default_production_key(),
            shadow_key_path: default_shadow_key(),
            ttl_secs: default_warrant_ttl_secs(),
        }
    }
}

/// Forensic ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
    #[serde(default = "default_fsync")]
    pub fsync: bool,
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/forensic_ledger.jsonl")
}

fn default_fsync() -> bool {
    true
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            fsync: default_fsync(),
        }
    }
}

/// Risk accumulation method for the session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RiskAccumulationConfig {
    AdditiveDecay { half_life_secs: f64 },
    WindowedSum { window_minutes: f64 },
}

impl Default for RiskAccumulationConfig {
    fn default() -> Self {
        RiskAccumulationConfig::AdditiveDecay {
            half_life_secs: 300.0,
        }
    }
}

/// The complete operator-facing configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub warrant: WarrantConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub risk_accumulation: RiskAccumulationConfig,
    #[serde(default)]
    pub guard: GuardConfig,
}

#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    base: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn new() -> Self {
        Self {
            base: GatewayConfig::default(),
        }
    }

    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GatewayConfig = match path.extension().and_then(|e| e.to_str()) {
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

    /// Load `path` if it exists; a missing file is not an error (the
    /// gateway runs on compiled defaults plus env overrides), but a
    /// present-but-unparsable file is.
    pub fn with_file_if_present(self, path: impl AsRef<Path>) -> Self {
        if path.as_ref().exists() {
            match self.with_file(path.as_ref()) {
                Ok(builder) => builder,
                Err(e) => {
                    tracing::error!(error = %e, path = ?path.as_ref(), "failed to load config file");
                    Self::new()
                }
            }
        } else {
            self
        }
    }

    pub fn with_env(mut self) -> Self {
        dotenvy::dotenv().ok();
        if let Ok(path) = std::env::var("IPG_LEDGER_PATH") {
            self.base.ledger.path = PathBuf::from(path);
        }
        if let Ok(command) = std::env::var("IPG_BACKEND_COMMAND") {
            self.base.backend.command = command;
        }
        if let Ok(port) = std::env::var("IPG_HTTP_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                let host = std::env::var("IPG_HTTP_HOST").unwrap_or_else(|_| "127.0.0.1".into());
                self.base.transport = TransportConfig::Http { host, port };
            }
        }
        self
    }

    pub fn build(self) -> GatewayConfig {
        self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_transport_is_stdio() {
        let config = GatewayConfigBuilder::new().build();
        assert!(matches!(config.transport, TransportConfig::Stdio));
    }

    #[test]
    fn env_port_selects_http_transport() {
        std::env::set_var("IPG_HTTP_PORT", "9090");
        let config = GatewayConfigBuilder::new().with_env().build();
        assert!(matches!(config.transport, TransportConfig::Http { port: 9090, .. }));
        std::env::remove_var("IPG_HTTP_PORT");
    }
}
