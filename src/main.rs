use anyhow::Context;
use powerwall_exporter::{Config, GatewayClient, PollEngine};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Powerwall exporter");
    let config = Config::from_env().context("Loading configuration")?;
    config.log_summary();

    let client = GatewayClient::connect(&config.gateway, &config.credentials)
        .await
        .with_context(|| format!("Logging in to gateway {}", config.gateway))?;

    // The first poll must succeed.
    let engine = PollEngine::start(client, &config.namespace, &config.subsystem)
        .await
        .context("Initial poll of the gateway")?;
    let _ticker = engine.spawn_ticker(config.poll_interval);

    let socket_addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Serving metrics on {socket_addr}");
    let listener = TcpListener::bind(socket_addr)
        .await
        .with_context(|| format!("Binding {socket_addr}"))?;
    axum::serve(listener, engine.router())
        .await
        .context("Metrics server exited")?;

    Ok(())
}
