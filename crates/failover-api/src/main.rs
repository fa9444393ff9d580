//! Failover orchestrator API server binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use failover_core::{FailoverConfig, FailoverCoordinator, HistoryStore, RoutingRecord, RoutingRegistry, SentinelClient, TcpRelationalProbe};
use failover_api::{create_router, ApiState};

#[derive(Parser)]
#[command(name = "failover-apid")]
#[command(about = "Multi-region failover orchestrator control API", long_about = None)]
struct Cli {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "FAILOVER_BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind_addr: String,

    /// Optional TOML configuration file; falls back to a minimal built-in
    /// two-region default when omitted.
    #[arg(long, env = "FAILOVER_CONFIG_PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Arc::new(FailoverConfig::load(cli.config.as_deref())?);

    let initial_region = config
        .region(&config.initial_active_region)
        .expect("initial_active_region validated during FailoverConfig::load");
    let registry = Arc::new(RoutingRegistry::new(RoutingRecord::initial(
        initial_region.id.clone(),
        initial_region.relational_endpoint.clone(),
        initial_region.cache_endpoint.clone(),
    )));
    let history = Arc::new(HistoryStore::new(config.history_capacity));
    let relational = Arc::new(TcpRelationalProbe::new());
    let cache = Arc::new(SentinelClient::new(config.sentinel_endpoints.clone()));

    let coordinator = Arc::new(FailoverCoordinator::new(
        config.clone(),
        relational.clone(),
        cache.clone(),
        registry.clone(),
        history.clone(),
    ));

    let state = Arc::new(ApiState::new(config, coordinator, relational, cache, registry, history));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&cli.bind_addr).await?;
    tracing::info!(bind_addr = %cli.bind_addr, "failover control API listening");
    axum::serve(listener, app).await?;

    Ok(())
}
