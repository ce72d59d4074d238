use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

mod api;
mod config;
mod dashboard;
mod error;
mod live_feed;
mod metrics;
mod registry;
mod scheduler;

use api::ForecastApi;
use config::Config;
use dashboard::AppState;
use live_feed::start_live_feed;
use metrics::ReliabilityBoard;
use registry::MatchRegistry;
use scheduler::{DiscoverySweep, RefreshScheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let api = Arc::new(ForecastApi::new(&config.forecast_api_url)?);
    let registry = MatchRegistry::new();
    let board = ReliabilityBoard::new();

    // Subscribe before any writer starts so no change is missed
    let scheduler = RefreshScheduler::new(registry.clone(), api.clone());
    let filter = config.championship_filter();
    let reconciler = scheduler.spawn_reconciler(registry.subscribe_changes(), filter);

    let feed = start_live_feed(config.live_feed(), registry.clone());
    info!("Live feed started: {}", config.forecast_ws_url);

    // Background discovery sweep: full match list through the same upsert path
    let discovery = DiscoverySweep::new();
    let discovery_task = discovery.spawn(
        api.clone(),
        registry.clone(),
        Duration::from_secs(config.discovery_interval_secs),
    );

    let reliability = {
        let api = api.clone();
        let board = board.clone();
        let every = Duration::from_secs(config.reliability_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                board.refresh(api.as_ref()).await;
            }
        })
    };

    // Start the dashboard HTTP server
    let dashboard_state = AppState {
        registry: registry.clone(),
        scheduler: scheduler.clone(),
        board,
        discovery,
        feed: feed.clone(),
    };
    let app = dashboard::router(dashboard_state);
    let addr: SocketAddr = config
        .dashboard_addr
        .parse()
        .with_context(|| format!("Invalid dashboard address: {}", config.dashboard_addr))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Dashboard listening on http://{}", addr);

    // Run dashboard server (blocks until Ctrl-C)
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    discovery_task.abort();
    reliability.abort();
    reconciler.abort();
    scheduler.shutdown().await;
    // Last handle: closes the push channel
    drop(feed);

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
