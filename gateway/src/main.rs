use ipg_gateway::config::{GatewayConfigBuilder, TransportConfig};
use ipg_gateway::gateway::Gateway;
use ipg_gateway::transport::{run_http, run_stdio};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = GatewayConfigBuilder::new()
        .with_file_if_present("gateway.toml")
        .with_env()
        .build();

    let gateway = match Gateway::start(config.clone()).await {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            tracing::error!(error = %e, "fatal startup error");
            std::process::exit(1);
        }
    };

    let shutdown_gateway = gateway.clone();
    let serve = async {
        match &config.transport {
            TransportConfig::Stdio => run_stdio(gateway).await,
            TransportConfig::Http { host, port } => run_http(gateway, host, *port).await,
        }
    };

    tokio::select! {
        result = serve => {
            if let Err(e) = result {
                tracing::error!(error = %e, "transport exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    if let Err(e) = shutdown_gateway.shutdown().await {
        tracing::error!(error = %e, "error shutting down backend subprocess");
    }
}
