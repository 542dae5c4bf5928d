//! Upstream framing: line-delimited stdio, or HTTP `POST /mcp`.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::gateway::Gateway;

const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Read JSON-RPC lines from stdin, run them through the gateway, and write
/// responses to stdout, one line at a time.
pub async fn run_stdio(gateway: Arc<Gateway>) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = reader.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = gateway.handle_message(&line).await;
        if response.is_empty() {
            continue;
        }
        stdout.write_all(response.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn mcp_handler(State(gateway): State<Arc<Gateway>>, body: String) -> impl IntoResponse {
    if body.trim().is_empty() {
        return (axum::http::StatusCode::BAD_REQUEST, "empty request body".to_string());
    }
    match tokio::time::timeout(HTTP_REQUEST_TIMEOUT, gateway.handle_message(&body)).await {
        Ok(response) => (axum::http::StatusCode::OK, response),
        Err(_) => (
            axum::http::StatusCode::GATEWAY_TIMEOUT,
            "backend did not respond in time".to_string(),
        ),
    }
}

pub async fn run_http(gateway: Arc<Gateway>, host: &str, port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/mcp", post(mcp_handler))
        .with_state(gateway);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!(host, port, "listening for HTTP MCP requests");
    axum::serve(listener, app).await?;
    Ok(())
}
