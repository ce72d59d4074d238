use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::source::{MatchSource, ReliabilitySource};
use crate::error::SyncError;
use crate::metrics::reliability::{parse_league_snapshots, parse_league_trends};
use crate::registry::{LeagueSnapshot, LeagueTrend, Match};

/// Path prefix of the versioned fallback API
const FALLBACK_PREFIX: &str = "v1";

/// Client for the forecast service's pull endpoints.
///
/// Every request tries `{base}/{path}` first and `{base}/v1/{path}` second;
/// the first successful, decodable response wins.
#[derive(Clone)]
pub struct ForecastApi {
    http: Client,
    base_url: Url,
}

impl ForecastApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("Invalid forecast API base URL")?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Forecast API URL cannot carry a path: {}", base_url);
        }
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ForecastApi { http, base_url })
    }

    fn endpoint(&self, versioned: bool, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SyncError::transport(self.base_url.as_str(), "base URL cannot carry a path"))?;
            path.pop_if_empty();
            if versioned {
                path.push(FALLBACK_PREFIX);
            }
            path.extend(segments);
        }
        Ok(url)
    }

    async fn get_json(&self, segments: &[&str]) -> Result<Value, SyncError> {
        let mut last_err = None;

        for versioned in [false, true] {
            let url = self.endpoint(versioned, segments)?;
            debug!("GET {}", url);

            let resp = match self.http.get(url.clone()).send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!("Request to {} failed: {}", url, e);
                    last_err = Some(SyncError::transport(url.as_str(), e));
                    continue;
                }
            };

            if !resp.status().is_success() {
                debug!("{} answered {}", url, resp.status());
                last_err = Some(SyncError::transport(url.as_str(), resp.status()));
                continue;
            }

            let body = match resp.text().await {
                Ok(b) => b,
                Err(e) => {
                    last_err = Some(SyncError::transport(url.as_str(), e));
                    continue;
                }
            };

            match serde_json::from_str::<Value>(&body) {
                Ok(v) => return Ok(v),
                Err(e) => {
                    warn!("Undecodable body from {}: {}", url, e);
                    last_err = Some(SyncError::Decode(e));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| SyncError::transport(segments.join("/"), "no endpoint tried")))
    }
}

#[async_trait]
impl MatchSource for ForecastApi {
    fn name(&self) -> &str {
        "ForecastApi"
    }

    async fn fetch_match(&self, match_id: &str) -> Result<Match, SyncError> {
        let raw = self.get_json(&["matches", match_id]).await?;
        parse_match(raw)
    }

    async fn fetch_matches(&self) -> Result<Vec<Match>, SyncError> {
        let raw = self.get_json(&["matches"]).await?;
        Ok(parse_match_list(raw))
    }
}

#[async_trait]
impl ReliabilitySource for ForecastApi {
    async fn fetch_league_metrics(&self) -> Result<Vec<LeagueSnapshot>, SyncError> {
        let raw = self.get_json(&["reliability", "metrics"]).await?;
        Ok(parse_league_snapshots(&raw))
    }

    async fn fetch_league_trend(&self) -> Result<Vec<LeagueTrend>, SyncError> {
        let raw = self.get_json(&["reliability", "trend"]).await?;
        Ok(parse_league_trends(&raw))
    }
}

// ── Parsing helpers ────────────────────────────────────────────────────────────

/// A single match, either bare or wrapped as `{ "match": {...} }`.
fn parse_match(mut raw: Value) -> Result<Match, SyncError> {
    let payload = match raw.get_mut("match") {
        Some(inner) if inner.is_object() => inner.take(),
        _ => raw,
    };
    Match::from_payload(payload)
}

/// A list of matches, either a bare array or `{ "matches": [...] }`.
/// Entries that fail to decode are dropped individually.
fn parse_match_list(raw: Value) -> Vec<Match> {
    let items = match raw {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("matches") {
            Some(Value::Array(items)) => items,
            _ => {
                warn!("Match list response has no `matches` array");
                return vec![];
            }
        },
        _ => return vec![],
    };

    items
        .into_iter()
        .filter_map(|item| match Match::from_payload(item) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("Dropping undecodable match entry: {}", e);
                None
            }
        })
        .collect()
}
