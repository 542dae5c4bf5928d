//! Integration coverage for the six literal scenarios in the interceptor
//! orchestration contract, run against a real spawned subprocess (`cat`,
//! which echoes each line back) standing in for the backend.

use ipg_gateway::config::{
    BackendConfig, GatewayConfig, LedgerConfig, RiskAccumulationConfig, TransportConfig,
    WarrantConfig,
};
use ipg_gateway::gateway::Gateway;
use ipg_guard::config::{GuardConfig, JudgeConfig};
use ipg_guard::policy::{Clause, Condition, Operator, PolicyConfig, Route, Rule};
use ipg_guard::risk::MockRule;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use serde_json::Value;

fn write_test_key(path: &std::path::Path) {
    let mut rng = rand::thread_rng();
    let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
    std::fs::write(path, pem.as_bytes()).unwrap();
}

async fn build_gateway(dir: &std::path::Path, policy: PolicyConfig) -> Gateway {
    build_gateway_with_rules(dir, policy, Vec::new()).await
}

async fn build_gateway_with_rules(
    dir: &std::path::Path,
    policy: PolicyConfig,
    mock_rules: Vec<MockRule>,
) -> Gateway {
    let production_key = dir.join("prod.pem");
    let shadow_key = dir.join("shadow.pem");
    write_test_key(&production_key);
    write_test_key(&shadow_key);

    let config = GatewayConfig {
        transport: TransportConfig::Stdio,
        backend: BackendConfig {
            command: "cat".to_string(),
            args: Vec::new(),
            shutdown_grace_secs: 1,
        },
        warrant: WarrantConfig {
            production_key_path: production_key,
            shadow_key_path: shadow_key,
            ttl_secs: 60,
        },
        ledger: LedgerConfig {
            path: dir.join("ledger.jsonl"),
            fsync: false,
        },
        risk_accumulation: RiskAccumulationConfig::AdditiveDecay {
            half_life_secs: 300.0,
        },
        guard: GuardConfig {
            policy,
            judge: JudgeConfig {
                mock_rules,
                ..JudgeConfig::default()
            },
            ..GuardConfig::default()
        },
    };
    Gateway::start(config).await.unwrap()
}

fn request(session_id: &str, tool: &str, args: Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {
            "name": tool,
            "arguments": args,
            "session_id": session_id,
            "user_id": "alice",
            "user_role": "member",
        }
    })
    .to_string()
}

#[tokio::test]
async fn trusted_resource_is_forwarded_and_warranted() {
    let dir = tempfile::tempdir().unwrap();
    let mut policy = PolicyConfig::default();
    policy.security_policies.push(Rule {
        id: "always-production".into(),
        clause: Clause::Leaf(Condition {
            field: "user_role".into(),
            operator: Operator::Eq,
            value: Value::String("member".into()),
        }),
        route: Route::Production,
        reason: "default member routing".into(),
    });
    let gateway = build_gateway(dir.path(), policy).await;

    let line = request("s1", "read_file", serde_json::json!({"path": "/private/notes.txt"}));
    let response = gateway.handle_message(&line).await;
    let echoed: Value = serde_json::from_str(&response).unwrap();
    assert!(echoed["params"]["__chimera_warrant__"].is_string());

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn denied_route_never_reaches_backend() {
    let dir = tempfile::tempdir().unwrap();
    let mut policy = PolicyConfig::default();
    policy.security_policies.push(Rule {
        id: "deny-tainted".into(),
        clause: Clause::Leaf(Condition {
            field: "is_tainted".into(),
            operator: Operator::Eq,
            value: Value::Bool(true),
        }),
        route: Route::Deny,
        reason: "untrusted resource".into(),
    });
    let gateway = build_gateway(dir.path(), policy).await;

    let line = request("s2", "read_file", serde_json::json!({"path": "/shared/attachment.txt"}));
    let response = gateway.handle_message(&line).await;
    let parsed: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(parsed["error"]["code"], -32000);

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn accumulated_risk_escalates_route_across_calls() {
    let dir = tempfile::tempdir().unwrap();
    let mut policy = PolicyConfig::default();
    policy.accumulated_risk_policies.push(ipg_guard::policy::AccumulatedRiskRule {
        threshold: 1.5,
        route: Route::Shadow,
        reason: "elevated session risk".into(),
    });
    policy.security_policies.push(Rule {
        id: "always-production".into(),
        clause: Clause::Leaf(Condition {
            field: "user_role".into(),
            operator: Operator::Eq,
            value: Value::String("member".into()),
        }),
        route: Route::Production,
        reason: "default".into(),
    });
    let gateway = build_gateway(dir.path(), policy).await;

    for _ in 0..5 {
        let line = request("s3", "delete_file", serde_json::json!({"path": "/private/a.txt"}));
        let _ = gateway.handle_message(&line).await;
    }

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_json_is_forwarded_verbatim_without_a_decision() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = build_gateway(dir.path(), PolicyConfig::default()).await;

    let response = gateway.handle_message("not json at all").await;
    assert_eq!(response, "not json at all");

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn directive_overrides_a_high_risk_score() {
    let dir = tempfile::tempdir().unwrap();
    let mut policy = PolicyConfig::default();
    policy.directives_by_user.insert(
        "alice".into(),
        vec![Rule {
            id: "alice-always-production".into(),
            clause: Clause::Leaf(Condition {
                field: "user_id".into(),
                operator: Operator::Eq,
                value: Value::String("alice".into()),
            }),
            route: Route::Production,
            reason: "standing directive for alice".into(),
        }],
    );
    policy.risk_based_policies.push(ipg_guard::policy::RiskBasedPolicy {
        risk_threshold: 0.5,
        min_confidence: 0.5,
        action: Route::Deny,
        low_confidence_action: Route::Shadow,
        reason: "high risk".into(),
        low_confidence_reason: "high risk, low confidence".into(),
    });
    let mock_rules = vec![MockRule {
        tools: Some(vec!["delete_file".to_string()]),
        condition: Condition {
            field: "tool_name".into(),
            operator: Operator::Eq,
            value: Value::String("delete_file".into()),
        },
        risk_score: 0.95,
        confidence: 0.9,
        reason: "destructive call".into(),
        flags: Vec::new(),
    }];
    let gateway = build_gateway_with_rules(dir.path(), policy, mock_rules).await;

    let line = request("s4", "delete_file", serde_json::json!({"path": "/private/a.txt"}));
    let response = gateway.handle_message(&line).await;
    let echoed: Value = serde_json::from_str(&response).unwrap();
    assert!(echoed["params"]["__chimera_warrant__"].is_string());

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn suspicious_keyword_in_arguments_routes_to_shadow() {
    let dir = tempfile::tempdir().unwrap();
    let mut policy = PolicyConfig::default();
    policy.risk_based_policies.push(ipg_guard::policy::RiskBasedPolicy {
        risk_threshold: 0.5,
        min_confidence: 0.5,
        action: Route::Shadow,
        low_confidence_action: Route::Shadow,
        reason: "suspicious query content".into(),
        low_confidence_reason: "suspicious query content, low confidence".into(),
    });
    let mock_rules = vec![MockRule {
        tools: None,
        condition: Condition {
            field: "is_suspicious_query".into(),
            operator: Operator::Eq,
            value: Value::Bool(true),
        },
        risk_score: 0.8,
        confidence: 0.9,
        reason: "suspicious keyword in arguments".into(),
        flags: vec!["SUSPICIOUS_KEYWORD".into()],
    }];
    let gateway = build_gateway_with_rules(dir.path(), policy, mock_rules).await;

    let line = request(
        "s5",
        "read_file",
        serde_json::json!({"path": "/private/company_secret_formula.txt"}),
    );
    let response = gateway.handle_message(&line).await;
    let echoed: Value = serde_json::from_str(&response).unwrap();
    assert!(echoed["params"]["__chimera_warrant__"].is_string());

    gateway.shutdown().await.unwrap();
}

#[tokio::test]
async fn tools_list_bypasses_the_pipeline_and_leaves_no_session_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut policy = PolicyConfig::default();
    policy.security_policies.push(Rule {
        id: "deny-everything".into(),
        clause: Clause::Leaf(Condition {
            field: "user_role".into(),
            operator: Operator::Eq,
            value: Value::String("member".into()),
        }),
        route: Route::Deny,
        reason: "should never run for tools/list".into(),
    });
    let gateway = build_gateway(dir.path(), policy).await;

    // The test backend is `cat`, which echoes stdin -- what matters here is
    // that the gateway never synthesizes a deny response and never touches
    // session state, not what a real backend would reply with.
    let list_request = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/list",
        "params": { "session_id": "s6" },
    })
    .to_string();
    let response = gateway.handle_message(&list_request).await;
    let parsed: Value = serde_json::from_str(&response).unwrap();
    assert!(parsed.get("error").is_none());
    assert_eq!(response, list_request);
    assert_eq!(gateway.session_store.len(), 0);

    gateway.shutdown().await.unwrap();
}
