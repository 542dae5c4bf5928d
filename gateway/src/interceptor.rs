//! Per-message orchestration: parse, classify, judge, route, issue a
//! warrant, log, and either forward or deny.

use chrono::Utc;
use ipg_guard::context::{contains_suspicious_keyword, EvaluationContext, EXTERNAL_UPLOAD_SOURCE};
use ipg_guard::policy::Route;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::gateway::Gateway;
use crate::session::ToolCallRecord;

/// What the interceptor decided to do with an inbound message.
pub enum InterceptionOutcome {
    /// Pass the (possibly warrant-injected) request through to the backend
    /// unchanged. Also used for messages that bypass the pipeline entirely
    /// -- malformed JSON and any method other than `tools/call` -- forwarded
    /// byte-verbatim with no session, risk, policy, or ledger activity.
    Forward(String),
    /// Policy denied the call; this is a synthesized JSON-RPC error response.
    Deny(String),
}

fn extract_tool_call(value: &Value) -> (String, Value) {
    let params = value.get("params").cloned().unwrap_or(Value::Null);
    let tool_name = params
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| value.get("method").and_then(Value::as_str))
        .unwrap_or("unknown")
        .to_string();
    let args = params.get("arguments").cloned().unwrap_or(params);
    (tool_name, args)
}

fn extract_resource_path(args: &Value) -> String {
    if let Some(s) = args.as_str() {
        return s.to_string();
    }
    for key in ["path", "resource", "file_path", "url"] {
        if let Some(s) = args.get(key).and_then(Value::as_str) {
            return s.to_string();
        }
    }
    String::new()
}

fn deny_response(request: &Value, reason: &str) -> String {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": -32000,
            "message": reason,
        }
    })
    .to_string()
}

/// Run one inbound message through the full interception pipeline.
///
/// Only `tools/call` is inspected. Malformed JSON and every other method
/// (notably `tools/list`) are forwarded byte-verbatim before any session,
/// taint, risk, policy, or ledger work happens -- a tool manifest fetch
/// must read identically regardless of a session's taint or risk state.
pub async fn intercept(gateway: &Gateway, raw: &str) -> InterceptionOutcome {
    let Ok(mut request) = serde_json::from_str::<Value>(raw) else {
        return InterceptionOutcome::Forward(raw.to_string());
    };

    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    if method != "tools/call" {
        return InterceptionOutcome::Forward(raw.to_string());
    }

    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let session_id = params
        .get("session_id")
        .and_then(Value::as_str)
        .unwrap_or("default")
        .to_string();
    let user_id = params
        .get("user_id")
        .and_then(Value::as_str)
        .unwrap_or("anonymous")
        .to_string();
    let user_role = params
        .get("user_role")
        .and_then(Value::as_str)
        .unwrap_or("guest")
        .to_string();
    let (tool_name, args) = extract_tool_call(&request);
    let resource_path = extract_resource_path(&args);
    let tool_category = params
        .get("tool_category")
        .and_then(Value::as_str)
        .unwrap_or("general")
        .to_string();

    // Step: taint classification + latch update, folded into session state.
    let trust = gateway.taint.check_source_trust(&resource_path);
    let (is_tainted, taint_source) = gateway
        .session_store
        .with_session(&session_id, |state| {
            state.taint.update(trust, &resource_path);
            (state.taint.is_tainted(), state.taint.taint_source.clone())
        })
        .await;

    let mut eval_ctx = EvaluationContext {
        session_id: session_id.clone(),
        user_id,
        user_role,
        tool_name: tool_name.clone(),
        tool_category,
        args: args.clone(),
        context: HashMap::new(),
        is_tainted,
        is_suspicious_query: contains_suspicious_keyword(&args),
        accumulated_risk: 0.0,
        risk_score: 0.0,
        confidence: 0.0,
        source: taint_source
            .map(|_| EXTERNAL_UPLOAD_SOURCE.to_string())
            .unwrap_or_default(),
    };

    // Step: risk judge assesses this call in isolation.
    let assessment = gateway.judge.assess(&eval_ctx).await;
    eval_ctx.risk_score = assessment.risk_score;
    eval_ctx.confidence = assessment.confidence;

    // Step: fold into the session's accumulated risk.
    let now = Utc::now();
    let (accumulated_risk, risk_history_length) = gateway
        .session_store
        .with_session(&session_id, |state| {
            state.record_call(
                ToolCallRecord {
                    tool_name: tool_name.clone(),
                    timestamp: now,
                    risk_score: assessment.risk_score,
                    route: Route::Production, // overwritten in the ledger call below
                },
                &gateway.risk_accumulation,
            );
            (
                state.accumulated_risk(&gateway.risk_accumulation, now),
                state.history.len(),
            )
        })
        .await;
    eval_ctx.accumulated_risk = accumulated_risk;

    // Step: policy engine decides the route.
    let decision = gateway.policy.evaluate(&eval_ctx);

    // Step: issue (or withhold) a warrant for the decided route.
    let warrant = match gateway
        .authority
        .issue_warrant(&session_id, accumulated_risk, decision.route)
    {
        Ok(warrant) => warrant,
        Err(e) => {
            tracing::error!(error = %e, "warrant issuance failed");
            None
        }
    };

    // Step: append the immutable audit record regardless of outcome.
    gateway
        .ledger
        .log_event(
            &session_id,
            "tool_call",
            json!({"tool_name": tool_name, "args": args}),
            json!({"route": decision.route, "rule_id": decision.rule_id}),
            json!({"routed_to": decision.route, "reason": decision.reason}),
            accumulated_risk,
            risk_history_length,
        )
        .await;

    if decision.route == Route::Deny {
        tracing::warn!(session_id, tool_name, reason = %decision.reason, "denied tool call");
        return InterceptionOutcome::Deny(deny_response(&request, &decision.reason));
    }

    if let Some(token) = warrant {
        if let Some(params_obj) = request.get_mut("params").and_then(Value::as_object_mut) {
            params_obj.insert("__chimera_warrant__".to_string(), Value::String(token));
        }
    }

    tracing::info!(session_id, tool_name, route = ?decision.route, rule = ?decision.rule_id, "routed tool call");
    InterceptionOutcome::Forward(request.to_string())
}
