//! A minimal stand-in for the external backend collaborator.
//!
//! The gateway treats the backend as an interface: verify the warrant
//! attached to `params.__chimera_warrant__`, select the production or
//! shadow data store accordingly, and respond. This binary exists only so
//! the warrant-injection contract has something real to verify against in
//! tests -- it is not a production data store.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const DENIED_RESPONSE: &str = r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32001,"message":"Access Denied. Invalid or missing warrant."}}"#;

#[derive(Debug, Deserialize)]
struct WarrantClaims {
    #[allow(dead_code)]
    iss: String,
    sub: String,
    #[allow(dead_code)]
    iat: i64,
    #[allow(dead_code)]
    exp: i64,
    #[allow(dead_code)]
    jti: String,
    scope: String,
    #[allow(dead_code)]
    risk_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Store {
    Production,
    Shadow,
}

impl Store {
    fn directory(self) -> &'static str {
        match self {
            Store::Production => "data/production",
            Store::Shadow => "data/shadow",
        }
    }
}

fn public_key(path: &str) -> anyhow::Result<DecodingKey> {
    let pem = std::fs::read(path)?;
    Ok(DecodingKey::from_rsa_pem(&pem)?)
}

/// Try both public keys; the one that verifies (and whose `route` claim
/// matches) wins. Neither key succeeding means no valid warrant.
fn verify_warrant(token: &str, production_key: &DecodingKey, shadow_key: &DecodingKey) -> Option<(Store, WarrantClaims)> {
    let validation = Validation::new(Algorithm::RS256);
    if let Ok(data) = decode::<WarrantClaims>(token, production_key, &validation) {
        if data.claims.scope == "production" {
            return Some((Store::Production, data.claims));
        }
    }
    if let Ok(data) = decode::<WarrantClaims>(token, shadow_key, &validation) {
        if data.claims.scope == "shadow" {
            return Some((Store::Shadow, data.claims));
        }
    }
    None
}

#[derive(Serialize)]
struct ToolsListResponse<'a> {
    jsonrpc: &'static str,
    id: serde_json::Value,
    result: ToolsListResult<'a>,
}

#[derive(Serialize)]
struct ToolsListResult<'a> {
    tools: &'a [&'static str],
}

/// `tools/list` must be byte-identical regardless of which store is
/// selected -- an observer diffing the two environments' tool manifests
/// must learn nothing.
const TOOL_MANIFEST: &[&str] = &["read_file", "write_file", "search", "delete_file"];

async fn uniform_jitter() {
    let millis = rand::thread_rng().gen_range(20..=50);
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

async fn handle_request(
    request: &serde_json::Value,
    production_key: &DecodingKey,
    shadow_key: &DecodingKey,
) -> String {
    uniform_jitter().await;

    let id = request.get("id").cloned().unwrap_or(serde_json::Value::Null);
    let method = request.get("method").and_then(serde_json::Value::as_str).unwrap_or("");

    if method == "tools/list" {
        let response = ToolsListResponse {
            jsonrpc: "2.0",
            id,
            result: ToolsListResult { tools: TOOL_MANIFEST },
        };
        return serde_json::to_string(&response).unwrap_or_default();
    }

    let warrant = request
        .get("params")
        .and_then(|p| p.get("__chimera_warrant__"))
        .and_then(serde_json::Value::as_str);

    let Some(token) = warrant else {
        return DENIED_RESPONSE.to_string();
    };

    match verify_warrant(token, production_key, shadow_key) {
        Some((store, claims)) => serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "store": store.directory(),
                "session_id": claims.sub,
            }
        })
        .to_string(),
        None => DENIED_RESPONSE.to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let production_key = public_key("keys/public_prime.pem")?;
    let shadow_key = public_key("keys/public_shadow.pem")?;

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = reader.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Ok(request) = serde_json::from_str::<serde_json::Value>(&line) else {
            continue;
        };
        let response = handle_request(&request, &production_key, &shadow_key).await;
        stdout.write_all(response.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}
