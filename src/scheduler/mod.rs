//! Per-match refresh timers with cancel-on-replace semantics.
//!
//! Each displayed match owns at most one timer task. The task is keyed by the
//! inputs its interval depends on (`status`, `kickoff_unix`); when either
//! changes, the old task is aborted and a new one armed, so no timer keeps
//! running on stale parameters.

pub mod discovery;
pub mod interval;

pub use discovery::{DiscoveryState, DiscoverySweep};
pub use interval::refresh_interval;

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::MatchSource;
use crate::error::FetchState;
use crate::registry::{Championship, Match, MatchRegistry, MatchStatus, UpsertOutcome};

/// The inputs a match's refresh interval is computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleKey {
    pub status: MatchStatus,
    pub kickoff_unix: Option<i64>,
}

impl ScheduleKey {
    pub fn of(m: &Match) -> Self {
        ScheduleKey {
            status: m.status.clone(),
            kickoff_unix: m.kickoff_unix,
        }
    }
}

struct ArmedTimer {
    key: ScheduleKey,
    handle: JoinHandle<()>,
}

/// Poll state per match: the freshness clock of the last fetched snapshot.
pub type PollState = FetchState<i64>;

/// Which matches are currently on display. Empty means all of them.
#[derive(Debug, Clone, Default)]
pub struct DisplayFilter {
    championships: HashSet<Championship>,
}

impl DisplayFilter {
    pub fn new(championships: impl IntoIterator<Item = Championship>) -> Self {
        DisplayFilter {
            championships: championships.into_iter().collect(),
        }
    }

    pub fn is_displayed(&self, m: &Match) -> bool {
        self.championships.is_empty() || self.championships.contains(&m.championship)
    }
}

/// Keyed registry of per-match refresh timers.
#[derive(Clone)]
pub struct RefreshScheduler {
    timers: Arc<Mutex<HashMap<String, ArmedTimer>>>,
    poll_states: Arc<RwLock<HashMap<String, PollState>>>,
    registry: MatchRegistry,
    source: Arc<dyn MatchSource>,
}

impl RefreshScheduler {
    pub fn new(registry: MatchRegistry, source: Arc<dyn MatchSource>) -> Self {
        RefreshScheduler {
            timers: Arc::new(Mutex::new(HashMap::new())),
            poll_states: Arc::new(RwLock::new(HashMap::new())),
            registry,
            source,
        }
    }

    /// Make sure `m` has a timer armed for its current inputs.
    ///
    /// Returns `true` when a timer was (re)armed, `false` when the existing
    /// one already matches.
    pub async fn watch(&self, m: &Match) -> bool {
        let key = ScheduleKey::of(m);
        let mut timers = self.timers.lock().await;

        if let Some(armed) = timers.get(&m.match_id) {
            if armed.key == key && !armed.handle.is_finished() {
                return false;
            }
        }
        if let Some(old) = timers.remove(&m.match_id) {
            old.handle.abort();
            debug!(
                "Re-arming refresh timer for {} ({:?} -> {:?})",
                m.match_id, old.key, key
            );
        }

        let handle = tokio::spawn(refresh_loop(
            m.match_id.clone(),
            key.clone(),
            self.registry.clone(),
            Arc::clone(&self.source),
            Arc::clone(&self.poll_states),
        ));
        timers.insert(m.match_id.clone(), ArmedTimer { key, handle });
        true
    }

    /// Stop refreshing a match that is no longer displayed.
    pub async fn unwatch(&self, match_id: &str) -> bool {
        let removed = self.timers.lock().await.remove(match_id);
        match removed {
            Some(armed) => {
                armed.handle.abort();
                self.poll_states.write().await.remove(match_id);
                debug!("Cleared refresh timer for {}", match_id);
                true
            }
            None => false,
        }
    }

    pub async fn armed_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    #[cfg(test)]
    pub async fn is_armed(&self, match_id: &str) -> bool {
        self.timers.lock().await.contains_key(match_id)
    }

    pub async fn poll_states(&self) -> HashMap<String, PollState> {
        self.poll_states.read().await.clone()
    }

    /// Abort every timer.
    pub async fn shutdown(&self) {
        let mut timers = self.timers.lock().await;
        for (_, armed) in timers.drain() {
            armed.handle.abort();
        }
        info!("Refresh scheduler stopped");
    }

    /// Keep timers in step with registry changes: every accepted write is
    /// re-evaluated against the display filter. If the change stream lags,
    /// the whole registry is re-read.
    pub fn spawn_reconciler(
        &self,
        mut changes: broadcast::Receiver<Match>,
        filter: DisplayFilter,
    ) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(m) => scheduler.reconcile(&m, &filter).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Scheduler lagged {} registry changes, resyncing", skipped);
                        for m in scheduler.registry.list().await {
                            scheduler.reconcile(&m, &filter).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn reconcile(&self, m: &Match, filter: &DisplayFilter) {
        if filter.is_displayed(m) {
            self.watch(m).await;
        } else {
            self.unwatch(&m.match_id).await;
        }
    }
}

async fn refresh_loop(
    match_id: String,
    key: ScheduleKey,
    registry: MatchRegistry,
    source: Arc<dyn MatchSource>,
    poll_states: Arc<RwLock<HashMap<String, PollState>>>,
) {
    loop {
        let interval = refresh_interval(&key.status, key.kickoff_unix, Utc::now().timestamp());
        tokio::time::sleep(interval).await;

        let result = source.fetch_match(&match_id).await;
        let now = Utc::now().timestamp();
        let result = match result {
            Ok(m) => {
                let fetched_clock = m.updated_at_unix;
                let outcome = registry.upsert(m).await;
                debug!("Polled {} via {}: {:?}", match_id, source.name(), outcome);
                // A stale snapshot was discarded; report the clock actually held
                let stored_clock = match outcome {
                    UpsertOutcome::Stale => registry
                        .get(&match_id)
                        .await
                        .map(|stored| stored.updated_at_unix)
                        .unwrap_or(fetched_clock),
                    _ => fetched_clock,
                };
                Ok(stored_clock)
            }
            Err(e) => {
                warn!("Refresh of {} failed: {}", match_id, e);
                Err(e)
            }
        };
        poll_states
            .write()
            .await
            .entry(match_id.clone())
            .or_default()
            .apply(result, now);
    }
}
