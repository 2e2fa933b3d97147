//! VERDICT HTTP Server
//!
//! Exposes the risk evaluation engine over REST and runs the refresh and
//! retention schedulers.

use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use verdict_server::api::{self, AppState};
use verdict_server::{services, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let config = ServerConfig::load()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        "Loaded configuration"
    );

    let services = services::build(&config).await?;
    info!("Evaluation engine initialized");

    verdict_server::scheduler::spawn_refresh_loops(
        Arc::clone(&services.refresh),
        &config.engine,
    );
    verdict_server::scheduler::spawn_retention_cleanup(
        Arc::clone(&services.audit),
        config.engine.retention_days,
    );

    let app = api::create_router(AppState {
        evaluator: services.evaluator,
        refresh: services.refresh,
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    info!("  Health check: http://{}/health", addr);
    info!("  Evaluate API: http://{}/v1/evaluate", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "verdict_server=info,verdict_runtime=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    Ok(())
}
