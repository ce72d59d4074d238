use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use url::Url;

use crate::live_feed::LiveFeedConfig;
use crate::registry::Championship;
use crate::scheduler::DisplayFilter;

/// Live forecast sync and adaptive refresh service
#[derive(Parser, Debug, Clone)]
#[command(name = "forecast-sync", version, about)]
pub struct Config {
    /// Forecast API base URL (pull endpoints)
    #[arg(long, env = "FORECAST_API_URL", default_value = "http://localhost:8000/api")]
    pub forecast_api_url: String,

    /// Forecast push channel (WebSocket)
    #[arg(long, env = "FORECAST_WS_URL", default_value = "ws://localhost:8000/ws/live")]
    pub forecast_ws_url: String,

    /// Dashboard listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:8080")]
    pub dashboard_addr: String,

    /// Seconds between full match discovery sweeps
    #[arg(long, env = "DISCOVERY_INTERVAL_SECS", default_value = "300")]
    pub discovery_interval_secs: u64,

    /// Seconds between league reliability refreshes
    #[arg(long, env = "RELIABILITY_INTERVAL_SECS", default_value = "600")]
    pub reliability_interval_secs: u64,

    /// Seconds between WebSocket ping frames
    #[arg(long, env = "WS_PING_INTERVAL_SECS", default_value = "25")]
    pub ws_ping_interval_secs: u64,

    /// Cap on the WebSocket reconnect backoff, in seconds
    #[arg(long, env = "WS_MAX_BACKOFF_SECS", default_value = "30")]
    pub ws_max_backoff_secs: u64,

    /// Championships to display (comma separated, empty = all)
    #[arg(long, env = "CHAMPIONSHIPS", value_delimiter = ',', default_value = "")]
    pub championships: Vec<String>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let api = Url::parse(&self.forecast_api_url).context("FORECAST_API_URL is not a valid URL")?;
        if !matches!(api.scheme(), "http" | "https") {
            anyhow::bail!("FORECAST_API_URL must use http or https, got {}", api.scheme());
        }
        let ws = Url::parse(&self.forecast_ws_url).context("FORECAST_WS_URL is not a valid URL")?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            anyhow::bail!("FORECAST_WS_URL must use ws or wss, got {}", ws.scheme());
        }
        if self.discovery_interval_secs < 10 {
            anyhow::bail!("discovery_interval_secs must be at least 10");
        }
        if self.reliability_interval_secs < 60 {
            anyhow::bail!("reliability_interval_secs must be at least 60");
        }
        if self.ws_ping_interval_secs == 0 {
            anyhow::bail!("ws_ping_interval_secs must be positive");
        }
        if !(1..=3600).contains(&self.ws_max_backoff_secs) {
            anyhow::bail!("ws_max_backoff_secs must be between 1 and 3600");
        }
        Ok(())
    }

    pub fn championship_filter(&self) -> DisplayFilter {
        DisplayFilter::new(
            self.championships
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(Championship::parse),
        )
    }

    pub fn live_feed(&self) -> LiveFeedConfig {
        LiveFeedConfig {
            url: self.forecast_ws_url.clone(),
            ping_interval: Duration::from_secs(self.ws_ping_interval_secs),
            max_backoff: Duration::from_secs(self.ws_max_backoff_secs),
        }
    }
}
