//! The decision surface for the IPG gateway.
//!
//! `guard` holds everything that decides *what happens* to a tool call --
//! taint classification, risk scoring, policy routing, and response
//! sanitization -- without knowing anything about JSON-RPC framing,
//! subprocess management, or warrant issuance. The gateway crate owns
//! those and calls into `guard` as a library.
//!
//! ## Modules
//!
//! - [`taint`] -- resource-path trust classification and the per-session latch
//! - [`risk`] -- the pluggable risk-scoring oracle
//! - [`policy`] -- the ordered-phase routing decision engine
//! - [`sanitizer`] -- fixed-pattern redaction of downstream responses
//! - [`config`] -- loading the merged guard configuration document
//! - [`context`] -- the structured evaluation input shared by risk and policy

pub mod config;
pub mod context;
pub mod error;
pub mod policy;
pub mod risk;
pub mod sanitizer;
pub mod taint;

pub mod prelude {
    pub use crate::config::{GuardConfig, GuardConfigBuilder};
    pub use crate::context::EvaluationContext;
    pub use crate::error::GuardError;
    pub use crate::policy::{Clause, Condition, Operator, PolicyDecision, PolicyEngine, Route, Rule};
    pub use crate::risk::{DeterministicJudge, NetworkJudge, RiskAssessment, RiskOracle};
    pub use crate::sanitizer::Sanitizer;
    pub use crate::taint::{TaintState, TaintTracker, TrustLevel};
}
