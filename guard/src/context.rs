//! The structured input that the policy engine and risk judge evaluate against.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Everything known about a single tool call at the moment it is judged.
///
/// Built fresh by the interceptor for every inbound request. `to_value`
/// flattens it into a [`serde_json::Value`] so that [`crate::policy::Condition`]
/// can resolve dotted field paths like `args.path` or `context.user_role`
/// without the evaluator needing a bespoke accessor per field.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationContext {
    pub session_id: String,
    pub user_id: String,
    pub user_role: String,
    pub tool_name: String,
    pub tool_category: String,
    pub args: Value,
    /// Free-form caller-supplied context (e.g. originating resource path).
    pub context: HashMap<String, Value>,
    pub is_tainted: bool,
    pub is_suspicious_query: bool,
    pub accumulated_risk: f64,
    /// Populated by the risk judge before policy evaluation runs.
    pub risk_score: f64,
    pub confidence: f64,
    pub source: String,
}

impl EvaluationContext {
    /// Render the context as a JSON value for dotted-path field resolution.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Resolve a dotted path such as `"args.path"` or `"context.origin"`.
    ///
    /// Returns `None` if any segment is missing, mirroring the source
    /// language's permissive `dict.get` chaining rather than erroring.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        let root = self.to_value();
        let mut current = &root;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }
}

const SUSPICIOUS_KEYWORDS: &[&str] =
    &["password", "secret", "credit card", "ssn", "private_key", "formula"];

/// True iff any string value reachable from `args` contains one of the
/// built-in suspicious keywords, checked case-insensitively.
pub fn contains_suspicious_keyword(value: &Value) -> bool {
    match value {
        Value::String(s) => {
            let lowered = s.to_lowercase();
            SUSPICIOUS_KEYWORDS.iter().any(|k| lowered.contains(k))
        }
        Value::Array(items) => items.iter().any(contains_suspicious_keyword),
        Value::Object(map) => map.values().any(contains_suspicious_keyword),
        _ => false,
    }
}

/// The normalized `source` label used once a taint source is known --
/// policy conditions match on this literal rather than the raw path.
pub const EXTERNAL_UPLOAD_SOURCE: &str = "external_upload";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_keyword_in_nested_arg_value() {
        let args = serde_json::json!({"filename": "company_secret_formula.txt"});
        assert!(contains_suspicious_keyword(&args));
    }

    #[test]
    fn clean_args_are_not_flagged() {
        let args = serde_json::json!({"filename": "quarterly_report.txt"});
        assert!(!contains_suspicious_keyword(&args));
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let args = serde_json::json!({"note": "Contains a SSN on file"});
        assert!(contains_suspicious_keyword(&args));
    }
}
