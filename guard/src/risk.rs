//! Pluggable risk scoring: a deterministic rule-based fallback and an
//! optional network-backed oracle, unified behind [`RiskOracle`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::context::EvaluationContext;
use crate::policy::Condition;

/// The outcome of judging a single tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub confidence: f64,
    pub reason: String,
    pub flags: Vec<String>,
}

impl RiskAssessment {
    /// The fixed assessment returned whenever the network oracle cannot be
    /// reached or its response cannot be parsed. Treated as maximally risky
    /// rather than silently trusted.
    pub fn oracle_failure() -> Self {
        Self {
            risk_score: 0.9,
            confidence: 1.0,
            reason: "oracle failure".to_string(),
            flags: vec!["ORACLE_ERROR".to_string()],
        }
    }
}

/// A single ordered fallback rule: first match wins.
///
/// `tools`, when present, narrows the rule to specific tool names before
/// `condition` is evaluated against the same field/operator/value language
/// the policy engine uses -- a rule can score risk from argument content
/// (e.g. a suspicious filename), not just the tool being called.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockRule {
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    pub condition: Condition,
    pub risk_score: f64,
    pub confidence: f64,
    pub reason: String,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl MockRule {
    fn matches(&self, ctx: &EvaluationContext) -> bool {
        let tool_matches = self
            .tools
            .as_ref()
            .is_none_or(|tools| tools.iter().any(|t| t == &ctx.tool_name));
        tool_matches && self.condition.evaluate(ctx)
    }
}

/// Pluggable risk-scoring oracle. Implementations must be pure functions of
/// their inputs — no session-state access, so they can be swapped without
/// touching the interceptor.
#[async_trait]
pub trait RiskOracle: Send + Sync {
    async fn assess(&self, ctx: &EvaluationContext) -> RiskAssessment;
}

/// Deterministic, offline fallback judge: an ordered list of rules, first
/// match on `tool_name` wins, else a fixed low-risk default.
pub struct DeterministicJudge {
    rules: Vec<MockRule>,
    default_assessment: RiskAssessment,
}

impl DeterministicJudge {
    pub fn new(rules: Vec<MockRule>) -> Self {
        Self {
            rules,
            default_assessment: RiskAssessment {
                risk_score: 0.1,
                confidence: 0.5,
                reason: "no matching rule".to_string(),
                flags: Vec::new(),
            },
        }
    }
}

#[async_trait]
impl RiskOracle for DeterministicJudge {
    async fn assess(&self, ctx: &EvaluationContext) -> RiskAssessment {
        for rule in &self.rules {
            if rule.matches(ctx) {
                return RiskAssessment {
                    risk_score: rule.risk_score,
                    confidence: rule.confidence,
                    reason: rule.reason.clone(),
                    flags: rule.flags.clone(),
                };
            }
        }
        self.default_assessment.clone()
    }
}

/// Network-backed oracle. Any transport or parse failure degrades to
/// [`RiskAssessment::oracle_failure`] rather than propagating an error --
/// a judging failure must never silently pass a call through unassessed.
pub struct NetworkJudge {
    client: reqwest::Client,
    endpoint: String,
}

impl NetworkJudge {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is static and valid");
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RiskOracle for NetworkJudge {
    async fn assess(&self, ctx: &EvaluationContext) -> RiskAssessment {
        let body = serde_json::json!({
            "tool_name": ctx.tool_name,
            "args": ctx.args,
            "context": ctx.context,
        });
        let result = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await;
        match result {
            Ok(resp) => match resp.json::<RiskAssessment>().await {
                Ok(assessment) => assessment,
                Err(e) => {
                    tracing::warn!(error = %e, "risk oracle returned an unparsable response");
                    RiskAssessment::oracle_failure()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "risk oracle request failed");
                RiskAssessment::oracle_failure()
            }
        }
    }
}
