//! The routing decision engine: ordered phases of first-match rules built
//! from a small recursive `all`/`any`/`not` clause language.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::context::EvaluationContext;

/// Where a tool call is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Production,
    Shadow,
    Deny,
}

/// A leaf comparison operator for [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    Regex,
    In,
    NotIn,
}

/// A single field comparison: `field <op> value`, where `field` is a
/// dotted path resolved against [`EvaluationContext::get_path`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub(crate) fn evaluate(&self, ctx: &EvaluationContext) -> bool {
        let Some(actual) = ctx.get_path(&self.field) else {
            return false;
        };
        match self.operator {
            Operator::Eq => actual == self.value,
            Operator::Neq => actual != self.value,
            Operator::Gt => compare_numeric(&actual, &self.value, |a, b| a > b),
            Operator::Gte => compare_numeric(&actual, &self.value, |a, b| a >= b),
            Operator::Lt => compare_numeric(&actual, &self.value, |a, b| a < b),
            Operator::Lte => compare_numeric(&actual, &self.value, |a, b| a <= b),
            Operator::Contains => match (actual.as_str(), self.value.as_str()) {
                (Some(a), Some(b)) => a.contains(b),
                _ => match actual.as_array() {
                    Some(items) => items.contains(&self.value),
                    None => false,
                },
            },
            Operator::Regex => match (actual.as_str(), self.value.as_str()) {
                (Some(a), Some(pattern)) => regex::Regex::new(pattern)
                    .map(|re| re.is_match(a))
                    .unwrap_or(false),
                _ => false,
            },
            Operator::In => match self.value.as_array() {
                Some(items) => items.contains(&actual),
                None => false,
            },
            Operator::NotIn => match self.value.as_array() {
                Some(items) => !items.contains(&actual),
                None => true,
            },
        }
    }
}

fn compare_numeric(actual: &Value, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// The recursive boolean clause language over [`Condition`] leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Clause {
    All { clauses: Vec<Clause> },
    Any { clauses: Vec<Clause> },
    Not { clause: Box<Clause> },
    Leaf(Condition),
}

impl Clause {
    pub fn evaluate(&self, ctx: &EvaluationContext) -> bool {
        match self {
            Clause::All { clauses } => clauses.iter().all(|c| c.evaluate(ctx)),
            Clause::Any { clauses } => clauses.iter().any(|c| c.evaluate(ctx)),
            Clause::Not { clause } => !clause.evaluate(ctx),
            Clause::Leaf(condition) => condition.evaluate(ctx),
        }
    }
}

/// A single ordered rule within a phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub clause: Clause,
    pub route: Route,
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    "matched rule".to_string()
}

/// The final routing decision, with the rule that produced it (if any).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub route: Route,
    pub rule_id: Option<String>,
    pub reason: String,
}

impl PolicyDecision {
    fn from_rule(rule: &Rule) -> Self {
        Self {
            route: rule.route,
            rule_id: Some(rule.id.clone()),
            reason: rule.reason.clone(),
        }
    }
}

/// A manual identity-keyed override, checked before any rule phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Override {
    pub route: Route,
    pub reason: String,
}

/// An accumulated-risk threshold rule: `accumulated_risk >= threshold`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulatedRiskRule {
    pub threshold: f64,
    pub route: Route,
    pub reason: String,
}

/// A single-call risk-based policy: `risk_score >= risk_threshold` routes to
/// `action` when the judge's `confidence` clears `min_confidence`, else to
/// the fail-safe `low_confidence_action` -- a low-confidence high-risk
/// assessment is treated as untrustworthy, not ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskBasedPolicy {
    pub risk_threshold: f64,
    pub min_confidence: f64,
    pub action: Route,
    pub low_confidence_action: Route,
    #[serde(default = "default_risk_based_reason")]
    pub reason: String,
    #[serde(default = "default_low_confidence_reason")]
    pub low_confidence_reason: String,
}

fn default_risk_based_reason() -> String {
    "risk score exceeded threshold".to_string()
}

fn default_low_confidence_reason() -> String {
    "risk score exceeded threshold with low judge confidence".to_string()
}

/// The full configuration document driving the engine, loaded from the
/// merged gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub user_overrides: HashMap<String, Override>,
    #[serde(default)]
    pub session_overrides: HashMap<String, Override>,
    #[serde(default)]
    pub directives_by_user: HashMap<String, Vec<Rule>>,
    #[serde(default)]
    pub directives_by_role: HashMap<String, Vec<Rule>>,
    #[serde(default)]
    pub trusted_workflows: Vec<Rule>,
    #[serde(default)]
    pub security_policies: Vec<Rule>,
    #[serde(default)]
    pub accumulated_risk_policies: Vec<AccumulatedRiskRule>,
    #[serde(default)]
    pub risk_based_policies: Vec<RiskBasedPolicy>,
    #[serde(default = "default_route")]
    pub default_route: Route,
}

fn default_route() -> Route {
    Route::Production
}

/// Evaluates an [`EvaluationContext`] through the ordered phase list,
/// first phase to produce a decision wins; within a phase, first matching
/// rule wins.
pub struct PolicyEngine {
    config: PolicyConfig,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, ctx: &EvaluationContext) -> PolicyDecision {
        if let Some(decision) = self.check_overrides(ctx) {
            return decision;
        }
        if let Some(decision) = self.check_directives(ctx) {
            return decision;
        }
        if let Some(decision) = first_match(&self.config.trusted_workflows, ctx) {
            return decision;
        }
        if let Some(decision) = first_match(&self.config.security_policies, ctx) {
            return decision;
        }
        if let Some(decision) = self.check_accumulated_risk(ctx) {
            return decision;
        }
        if let Some(decision) = self.check_risk_based(ctx) {
            return decision;
        }
        PolicyDecision {
            route: self.config.default_route,
            rule_id: None,
            reason: "no policy matched, using default route".to_string(),
        }
    }

    fn check_overrides(&self, ctx: &EvaluationContext) -> Option<PolicyDecision> {
        if let Some(o) = self.config.session_overrides.get(&ctx.session_id) {
            return Some(PolicyDecision {
                route: o.route,
                rule_id: Some(format!("override:session:{}", ctx.session_id)),
                reason: o.reason.clone(),
            });
        }
        if let Some(o) = self.config.user_overrides.get(&ctx.user_id) {
            return Some(PolicyDecision {
                route: o.route,
                rule_id: Some(format!("override:user:{}", ctx.user_id)),
                reason: o.reason.clone(),
            });
        }
        None
    }

    fn check_directives(&self, ctx: &EvaluationContext) -> Option<PolicyDecision> {
        if let Some(rules) = self.config.directives_by_user.get(&ctx.user_id) {
            if let Some(decision) = first_match(rules, ctx) {
                return Some(decision);
            }
        }
        if let Some(rules) = self.config.directives_by_role.get(&ctx.user_role) {
            if let Some(decision) = first_match(rules, ctx) {
                return Some(decision);
            }
        }
        None
    }

    fn check_accumulated_risk(&self, ctx: &EvaluationContext) -> Option<PolicyDecision> {
        self.config
            .accumulated_risk_policies
            .iter()
            .find(|rule| ctx.accumulated_risk >= rule.threshold)
            .map(|rule| PolicyDecision {
                route: rule.route,
                rule_id: Some(format!("accumulated_risk:{}", rule.threshold)),
                reason: rule.reason.clone(),
            })
    }

    fn check_risk_based(&self, ctx: &EvaluationContext) -> Option<PolicyDecision> {
        self.config
            .risk_based_policies
            .iter()
            .find(|policy| ctx.risk_score >= policy.risk_threshold)
            .map(|policy| {
                if ctx.confidence >= policy.min_confidence {
                    PolicyDecision {
                        route: policy.action,
                        rule_id: Some(format!("risk_based:{}", policy.risk_threshold)),
                        reason: policy.reason.clone(),
                    }
                } else {
                    PolicyDecision {
                        route: policy.low_confidence_action,
                        rule_id: Some(format!("risk_based:{}:low_confidence", policy.risk_threshold)),
                        reason: policy.low_confidence_reason.clone(),
                    }
                }
            })
    }
}

fn first_match(rules: &[Rule], ctx: &EvaluationContext) -> Option<PolicyDecision> {
    rules
        .iter()
        .find(|rule| rule.clause.evaluate(ctx))
        .map(PolicyDecision::from_rule)
}
