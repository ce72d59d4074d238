use async_trait::async_trait;

use crate::error::SyncError;
use crate::registry::{LeagueSnapshot, LeagueTrend, Match};

/// Pull-side source of match snapshots.
#[async_trait]
pub trait MatchSource: Send + Sync {
    /// Fetch the current snapshot of one match.
    async fn fetch_match(&self, match_id: &str) -> Result<Match, SyncError>;

    /// Fetch every match the upstream currently publishes.
    async fn fetch_matches(&self) -> Result<Vec<Match>, SyncError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Pull-side source of league-level calibration snapshots.
#[async_trait]
pub trait ReliabilitySource: Send + Sync {
    async fn fetch_league_metrics(&self) -> Result<Vec<LeagueSnapshot>, SyncError>;

    async fn fetch_league_trend(&self) -> Result<Vec<LeagueTrend>, SyncError>;
}
