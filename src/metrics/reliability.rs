//! Per-league reliability and trend classification.
//!
//! Two independently fetched snapshots feed this module: rolling calibration
//! metrics per championship, and current-vs-prior window deltas. Labels use
//! fixed policy thresholds.

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::api::ReliabilitySource;
use crate::error::FetchState;
use crate::registry::{Championship, LeagueSnapshot, LeagueTrend};

/// Below this many samples the metrics are not trusted at all.
pub const MIN_SAMPLES: u32 = 80;
pub const RELIABLE_MAX_ECE: f64 = 0.06;
pub const RELIABLE_MIN_ACCURACY: f64 = 0.5;
pub const MEDIUM_MAX_ECE: f64 = 0.09;
pub const TREND_ACCURACY_DELTA: f64 = 0.02;
pub const TREND_ECE_DELTA: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReliabilityLabel {
    Unavailable,
    Reliable,
    Medium,
    Unstable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    Unavailable,
    Improving,
    Stable,
    Worsening,
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

pub fn classify_reliability(snapshot: &LeagueSnapshot) -> ReliabilityLabel {
    if snapshot.n < MIN_SAMPLES {
        return ReliabilityLabel::Unavailable;
    }
    let (Some(ece), Some(accuracy)) = (finite(snapshot.ece), finite(snapshot.accuracy)) else {
        return ReliabilityLabel::Unavailable;
    };

    if ece <= RELIABLE_MAX_ECE && accuracy >= RELIABLE_MIN_ACCURACY {
        ReliabilityLabel::Reliable
    } else if ece <= MEDIUM_MAX_ECE {
        ReliabilityLabel::Medium
    } else {
        ReliabilityLabel::Unstable
    }
}

pub fn classify_trend(trend: Option<&LeagueTrend>) -> TrendLabel {
    let Some(trend) = trend.filter(|t| t.ok) else {
        return TrendLabel::Unavailable;
    };
    let (Some(d_acc), Some(d_ece)) = (finite(trend.delta_accuracy), finite(trend.delta_ece)) else {
        return TrendLabel::Unavailable;
    };

    if d_acc >= TREND_ACCURACY_DELTA && d_ece <= -TREND_ECE_DELTA {
        TrendLabel::Improving
    } else if d_acc <= -TREND_ACCURACY_DELTA && d_ece >= TREND_ECE_DELTA {
        TrendLabel::Worsening
    } else {
        TrendLabel::Stable
    }
}

// ── Payload parsing ──────────────────────────────────────────────────────────

pub fn parse_league_snapshots(raw: &Value) -> Vec<LeagueSnapshot> {
    parse_keyed_entries(raw)
}

pub fn parse_league_trends(raw: &Value) -> Vec<LeagueTrend> {
    parse_keyed_entries(raw)
}

/// Accepts an array of objects carrying `championship`, or an object keyed
/// by championship (optionally wrapped in `"leagues"`). Entries that fail to
/// decode are skipped.
fn parse_keyed_entries<T: DeserializeOwned>(raw: &Value) -> Vec<T> {
    let raw = raw.get("leagues").unwrap_or(raw);

    let entries: Vec<Value> = match raw {
        Value::Array(items) => items.clone(),
        Value::Object(obj) => obj
            .iter()
            .filter_map(|(key, v)| {
                let mut entry = v.as_object()?.clone();
                entry
                    .entry("championship")
                    .or_insert_with(|| Value::String(key.clone()));
                Some(Value::Object(entry))
            })
            .collect(),
        _ => return vec![],
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<T>(entry) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!("Skipping malformed league entry: {}", e);
                None
            }
        })
        .collect()
}

// ── Board ────────────────────────────────────────────────────────────────────

/// One league row: metrics and trend joined by championship.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeagueReliability {
    pub championship: Championship,
    pub n: Option<u32>,
    pub accuracy: Option<f64>,
    pub brier: Option<f64>,
    pub log_loss: Option<f64>,
    pub ece: Option<f64>,
    pub drift_level: Option<String>,
    pub temperature: Option<f64>,
    pub reliability: ReliabilityLabel,
    pub delta_accuracy: Option<f64>,
    pub delta_ece: Option<f64>,
    pub trend: TrendLabel,
}

/// Join metrics and trend snapshots into per-league rows, sorted by key.
pub fn league_rows(metrics: &[LeagueSnapshot], trends: &[LeagueTrend]) -> Vec<LeagueReliability> {
    let mut by_league: BTreeMap<String, (Option<&LeagueSnapshot>, Option<&LeagueTrend>)> =
        BTreeMap::new();
    for m in metrics {
        by_league.entry(m.championship.key().to_string()).or_default().0 = Some(m);
    }
    for t in trends {
        by_league.entry(t.championship.key().to_string()).or_default().1 = Some(t);
    }

    by_league
        .into_values()
        .filter_map(|(snapshot, trend)| {
            let championship = snapshot
                .map(|s| s.championship.clone())
                .or_else(|| trend.map(|t| t.championship.clone()))?;
            Some(LeagueReliability {
                championship,
                n: snapshot.map(|s| s.n),
                accuracy: snapshot.and_then(|s| finite(s.accuracy)),
                brier: snapshot.and_then(|s| finite(s.brier)),
                log_loss: snapshot.and_then(|s| finite(s.log_loss)),
                ece: snapshot.and_then(|s| finite(s.ece)),
                drift_level: snapshot.and_then(|s| s.drift_level.clone()),
                temperature: snapshot.and_then(|s| finite(s.temperature)),
                reliability: snapshot
                    .map(classify_reliability)
                    .unwrap_or(ReliabilityLabel::Unavailable),
                delta_accuracy: trend.and_then(|t| finite(t.delta_accuracy)),
                delta_ece: trend.and_then(|t| finite(t.delta_ece)),
                trend: classify_trend(trend),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BoardState {
    pub metrics: FetchState<Vec<LeagueSnapshot>>,
    pub trend: FetchState<Vec<LeagueTrend>>,
}

/// Shared holder of the latest league metrics and trend snapshots.
///
/// Each snapshot is replaced wholesale on a successful fetch; a failed
/// fetch keeps the previous data and records the failure.
#[derive(Clone, Default)]
pub struct ReliabilityBoard {
    inner: Arc<RwLock<BoardState>>,
}

impl ReliabilityBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch metrics and trend concurrently; each result is applied on its
    /// own, so one failing never blocks the other.
    pub async fn refresh(&self, source: &dyn ReliabilitySource) {
        let (metrics, trend) =
            tokio::join!(source.fetch_league_metrics(), source.fetch_league_trend());

        if let Err(e) = &metrics {
            warn!("League metrics fetch failed: {}", e);
        }
        if let Err(e) = &trend {
            warn!("League trend fetch failed: {}", e);
        }

        let now = Utc::now().timestamp();
        let mut state = self.inner.write().await;
        state.metrics.apply(metrics, now);
        state.trend.apply(trend, now);
        info!(
            "Reliability board refreshed ({} leagues with metrics, {} with trend)",
            state.metrics.data().map(Vec::len).unwrap_or(0),
            state.trend.data().map(Vec::len).unwrap_or(0)
        );
    }

    pub async fn rows(&self) -> Vec<LeagueReliability> {
        let state = self.inner.read().await;
        let metrics = state.metrics.data().map(Vec::as_slice).unwrap_or(&[]);
        let trends = state.trend.data().map(Vec::as_slice).unwrap_or(&[]);
        league_rows(metrics, trends)
    }

    pub async fn state(&self) -> BoardState {
        self.inner.read().await.clone()
    }
}
