//! Keyed store of the latest known state per match.
//!
//! Every writer (push consumer, per-match refresh timers, discovery sweep)
//! goes through [`MatchRegistry::upsert`]. Arbitration is by the
//! `updated_at_unix` freshness clock, never by arrival order, so the final
//! state does not depend on which source resolves last.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

pub mod models;

pub use models::{Championship, LeagueSnapshot, LeagueTrend, Match, MatchStatus};

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// What an upsert did to the stored entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First sighting of this match_id
    Inserted,
    /// Whole record replaced by a same-or-newer clock
    Replaced,
    /// Same-clock redelivery of an identical record
    Unchanged,
    /// Older clock than the stored entry; discarded
    Stale,
}

impl UpsertOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, UpsertOutcome::Inserted | UpsertOutcome::Replaced)
    }
}

/// Thread-safe, in-memory registry of matches.
#[derive(Clone)]
pub struct MatchRegistry {
    inner: Arc<RwLock<HashMap<String, Match>>>,
    changes: broadcast::Sender<Match>,
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchRegistry {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        MatchRegistry {
            inner: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    /// Insert-or-replace keyed by `match_id`.
    ///
    /// Replacement is whole-record: a fresher payload that omits `explain`
    /// drops the previously stored one. Accepted writes are broadcast to
    /// [`subscribe_changes`](Self::subscribe_changes) listeners.
    pub async fn upsert(&self, update: Match) -> UpsertOutcome {
        let mut inner = self.inner.write().await;
        let outcome = match inner.get(&update.match_id) {
            None => UpsertOutcome::Inserted,
            Some(existing) if update.updated_at_unix < existing.updated_at_unix => {
                UpsertOutcome::Stale
            }
            Some(existing) if *existing == update => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Replaced,
        };

        match outcome {
            UpsertOutcome::Inserted | UpsertOutcome::Replaced => {
                inner.insert(update.match_id.clone(), update.clone());
                // Sent under the write lock so listeners see accepted writes in clock order
                let _ = self.changes.send(update);
            }
            UpsertOutcome::Stale => {
                debug!(
                    "Discarding stale update for {} (clock {})",
                    update.match_id, update.updated_at_unix
                );
            }
            UpsertOutcome::Unchanged => {}
        }
        outcome
    }

    pub async fn get(&self, match_id: &str) -> Option<Match> {
        self.inner.read().await.get(match_id).cloned()
    }

    /// Snapshot copy of every entry, in no particular order.
    pub async fn list(&self) -> Vec<Match> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Receive every inserted or replaced record.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<Match> {
        self.changes.subscribe()
    }
}
