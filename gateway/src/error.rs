//! Error types for the gateway binary.

use thiserror::Error;

/// Errors raised while loading the merged gateway configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    FileRead {
        path: std::path::PathBuf,
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

/// Errors raised by the warrant authority.
#[derive(Debug, Error)]
pub enum WarrantError {
    #[error("failed to load signing key {kid}: {source}")]
    KeyLoad {
        kid: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to sign warrant: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Errors raised by the forensic ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to open ledger file: {0}")]
    Open(#[source] std::io::Error),
    #[error("failed to serialize ledger entry: {0}")]
    Serialize(#[from] serde_json::Error),
}
