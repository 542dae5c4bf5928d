//! Error types for the guard crate.

use thiserror::Error;

/// Errors produced while evaluating taint, risk, or policy.
#[derive(Debug, Error)]
pub enum GuardError {
    /// A regex pattern in the configuration failed to compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A policy clause referenced a field path that does not resolve.
    #[error("unknown field path: {0}")]
    UnknownField(String),

    /// The configured risk oracle endpoint could not be reached or returned
    /// a response that could not be parsed. Never surfaced to callers as an
    /// `Err` in practice — [`crate::risk::NetworkJudge`] converts this into
    /// a fixed fallback assessment instead.
    #[error("risk oracle failure: {0}")]
    OracleFailure(String),
}
