use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::live_feed::{FeedStatus, FeedSubscription};
use crate::metrics::reliability::{BoardState, LeagueReliability};
use crate::metrics::{count_positive_ev, DerivedSignals, ReliabilityBoard, Tier};
use crate::registry::{Match, MatchRegistry};
use crate::scheduler::{refresh_interval, DiscoveryState, DiscoverySweep, PollState, RefreshScheduler};

#[derive(Clone)]
pub struct AppState {
    pub registry: MatchRegistry,
    pub scheduler: RefreshScheduler,
    pub board: ReliabilityBoard,
    pub discovery: DiscoverySweep,
    pub feed: FeedSubscription,
}

/// Build the Axum router for the dashboard API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/matches", get(matches_handler))
        .route("/api/matches/:id", get(match_handler))
        .route("/api/reliability", get(reliability_handler))
        .route("/api/status", get(status_handler))
        .route("/api/summary", get(summary_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// One match as rendered by the UI.
#[derive(Debug, Serialize)]
pub struct MatchView {
    #[serde(rename = "match")]
    pub record: Match,
    pub signals: DerivedSignals,
    pub refresh_interval_secs: u64,
}

impl MatchView {
    fn build(record: Match, now_unix: i64) -> Self {
        let signals = DerivedSignals::from_match(&record);
        let refresh_interval_secs =
            refresh_interval(&record.status, record.kickoff_unix, now_unix).as_secs();
        MatchView {
            record,
            signals,
            refresh_interval_secs,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MatchFilter {
    pub min_tier: Option<String>,
    #[serde(default)]
    pub high_confidence: bool,
}

impl MatchFilter {
    fn keeps(&self, view: &MatchView, min_tier: Option<Tier>) -> bool {
        if self.high_confidence && !view.signals.is_high_confidence() {
            return false;
        }
        match min_tier {
            Some(floor) => view.signals.tier.map(|t| t.at_least(floor)).unwrap_or(false),
            None => true,
        }
    }
}

/// GET /api/matches?min_tier=A&high_confidence=true
async fn matches_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<MatchFilter>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let min_tier = match filter.min_tier.as_deref() {
        Some(raw) => Some(
            Tier::parse(raw)
                .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("Unknown tier: {}", raw)))?,
        ),
        None => None,
    };

    let now = Utc::now().timestamp();
    let mut views: Vec<MatchView> = state
        .registry
        .list()
        .await
        .into_iter()
        .map(|m| MatchView::build(m, now))
        .filter(|v| filter.keeps(v, min_tier))
        .collect();
    views.sort_by(|a, b| {
        a.record
            .kickoff_unix
            .cmp(&b.record.kickoff_unix)
            .then_with(|| a.record.match_id.cmp(&b.record.match_id))
    });
    Ok(Json(views))
}

/// GET /api/matches/:id
async fn match_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .registry
        .get(&match_id)
        .await
        .map(|m| Json(MatchView::build(m, Utc::now().timestamp())))
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Match not found: {}", match_id)))
}

#[derive(Debug, Serialize)]
struct ReliabilityResponse {
    leagues: Vec<LeagueReliability>,
    #[serde(flatten)]
    state: BoardState,
}

/// GET /api/reliability
async fn reliability_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ReliabilityResponse {
        leagues: state.board.rows().await,
        state: state.board.state().await,
    })
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    feed: FeedStatus,
    discovery: DiscoveryState,
    tracked_matches: usize,
    armed_timers: usize,
    failed_polls: usize,
    poll_states: HashMap<String, PollState>,
}

/// GET /api/status
async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let poll_states = state.scheduler.poll_states().await;
    Json(StatusResponse {
        feed: state.feed.status(),
        discovery: state.discovery.state().await,
        tracked_matches: state.registry.len().await,
        armed_timers: state.scheduler.armed_count().await,
        failed_polls: poll_states.values().filter(|s| s.is_failed()).count(),
        poll_states,
    })
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    total: usize,
    by_status: BTreeMap<String, usize>,
    positive_ev: usize,
}

/// GET /api/summary
async fn summary_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let matches = state.registry.list().await;
    let mut by_status = BTreeMap::new();
    for m in &matches {
        *by_status.entry(String::from(m.status.clone())).or_insert(0) += 1;
    }
    Json(SummaryResponse {
        total: matches.len(),
        by_status,
        positive_ev: count_positive_ev(&matches),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ForecastApi;
    use crate::registry::models::Probabilities;
    use crate::registry::{Championship, MatchStatus};
    use serde_json::{json, Value};
    use tokio::sync::{oneshot, watch};

    fn make_match(id: &str, status: MatchStatus, explain: Value) -> Match {
        Match {
            match_id: id.to_string(),
            championship: Championship::SerieA,
            home_team: "Inter".to_string(),
            away_team: "Milan".to_string(),
            status,
            kickoff_unix: None,
            updated_at_unix: 1,
            probabilities: Probabilities::default(),
            explain: Some(explain),
        }
    }

    /// Nothing listens on port 9, so every fetch through this source fails.
    fn unreachable_api() -> Arc<ForecastApi> {
        Arc::new(ForecastApi::new("http://127.0.0.1:9").unwrap())
    }

    async fn serve(registry: MatchRegistry) -> String {
        serve_with(registry, DiscoverySweep::new()).await
    }

    async fn serve_with(registry: MatchRegistry, discovery: DiscoverySweep) -> String {
        let (shutdown, _) = oneshot::channel();
        let (_, status) = watch::channel(FeedStatus::Connected);
        let state = AppState {
            scheduler: RefreshScheduler::new(registry.clone(), unreachable_api()),
            registry,
            board: ReliabilityBoard::new(),
            discovery,
            feed: FeedSubscription::new(shutdown, status),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn get_json(url: String) -> (StatusCode, Value) {
        let resp = reqwest::get(url).await.unwrap();
        let status = resp.status().as_u16();
        let body = resp.json().await.unwrap_or(Value::Null);
        (StatusCode::from_u16(status).unwrap(), body)
    }

    async fn seeded() -> String {
        let registry = MatchRegistry::new();
        registry
            .upsert(make_match("s", MatchStatus::Live, json!({"decision_gate": {"tier": "S"}, "best_ev": {"ev": 0.1}})))
            .await;
        registry
            .upsert(make_match("b", MatchStatus::Prematch, json!({"decision_gate": {"tier": "B"}})))
            .await;
        registry
            .upsert(make_match("x", MatchStatus::Finished, json!({"decision_gate": "broken"})))
            .await;
        serve(registry).await
    }

    #[tokio::test]
    async fn test_match_filters() {
        let base = seeded().await;

        let (_, all) = get_json(format!("{}/api/matches", base)).await;
        assert_eq!(all.as_array().unwrap().len(), 3);

        let (_, high) = get_json(format!("{}/api/matches?high_confidence=true", base)).await;
        let ids: Vec<&str> = high
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["match"]["match_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["s"]);

        let (_, min_b) = get_json(format!("{}/api/matches?min_tier=b", base)).await;
        assert_eq!(min_b.as_array().unwrap().len(), 2);

        let (status, _) = get_json(format!("{}/api/matches?min_tier=Z", base)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_single_match_view() {
        let base = seeded().await;
        let (status, view) = get_json(format!("{}/api/matches/s", base)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["refresh_interval_secs"], 30);
        assert_eq!(view["signals"]["tier"], "S");
        assert_eq!(view["signals"]["positive_ev"], true);

        let (status, _) = get_json(format!("{}/api/matches/missing", base)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_summary_and_status() {
        let base = seeded().await;
        let (_, summary) = get_json(format!("{}/api/summary", base)).await;
        assert_eq!(summary["total"], 3);
        assert_eq!(summary["positive_ev"], 1);
        assert_eq!(summary["by_status"]["LIVE"], 1);

        let (_, status) = get_json(format!("{}/api/status", base)).await;
        assert_eq!(status["feed"]["state"], "connected");
        assert_eq!(status["tracked_matches"], 3);
        assert_eq!(status["armed_timers"], 0);
        assert_eq!(status["failed_polls"], 0);
        assert_eq!(status["discovery"]["state"], "pending");
    }

    #[tokio::test]
    async fn test_status_reports_failed_discovery() {
        let registry = MatchRegistry::new();
        let discovery = DiscoverySweep::new();
        discovery.run_once(unreachable_api().as_ref(), &registry).await;
        let base = serve_with(registry, discovery).await;

        let (_, matches) = get_json(format!("{}/api/matches", base)).await;
        assert_eq!(matches, json!([]));

        // Empty list, but the sweep is reported as failing rather than pending
        let (_, status) = get_json(format!("{}/api/status", base)).await;
        assert_eq!(status["discovery"]["state"], "failed");
        assert_eq!(status["discovery"]["last_good"], Value::Null);
        assert!(status["discovery"]["error"].as_str().unwrap().contains("matches"));
    }

    #[tokio::test]
    async fn test_reliability_before_first_fetch() {
        let base = serve(MatchRegistry::new()).await;
        let (_, body) = get_json(format!("{}/api/reliability", base)).await;
        assert_eq!(body["leagues"], json!([]));
        assert_eq!(body["metrics"]["state"], "pending");
        assert_eq!(body["trend"]["state"], "pending");
    }
}
