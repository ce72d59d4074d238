//! Refresh-interval policy by lifecycle phase and time to kickoff.
//!
//! - LIVE: every 30s
//! - FINISHED: every hour (one settle check is enough)
//! - otherwise, kickoff in the future: nearest ladder step to the time left
//!   (24h, 12h, 6h, 1h; ties go to the earlier step), divided by 12 and
//!   clamped to [10s, 900s]
//! - no kickoff, or kickoff already reached: 60s

use std::time::Duration;

use crate::registry::MatchStatus;

pub const LIVE_INTERVAL_SECS: u64 = 30;
pub const FINISHED_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const MIN_PREMATCH_SECS: u64 = 10;
pub const MAX_PREMATCH_SECS: u64 = 900;

const KICKOFF_LADDER_SECS: [i64; 4] = [24 * 3600, 12 * 3600, 6 * 3600, 3600];
const LADDER_DIVISOR: i64 = 12;

pub fn refresh_interval(status: &MatchStatus, kickoff_unix: Option<i64>, now_unix: i64) -> Duration {
    let secs = match status {
        MatchStatus::Live => LIVE_INTERVAL_SECS,
        MatchStatus::Finished => FINISHED_INTERVAL_SECS,
        MatchStatus::Prematch | MatchStatus::Other(_) => match kickoff_unix {
            Some(kickoff) if kickoff > now_unix => prematch_secs(kickoff - now_unix),
            _ => DEFAULT_INTERVAL_SECS,
        },
    };
    Duration::from_secs(secs)
}

fn prematch_secs(until_kickoff: i64) -> u64 {
    // min_by_key keeps the first of equal keys, so ties resolve to the lower index
    let nearest = KICKOFF_LADDER_SECS
        .iter()
        .copied()
        .min_by_key(|step| (step - until_kickoff).unsigned_abs())
        .unwrap_or(KICKOFF_LADDER_SECS[KICKOFF_LADDER_SECS.len() - 1]);
    let secs = (nearest / LADDER_DIVISOR) as u64;
    secs.clamp(MIN_PREMATCH_SECS, MAX_PREMATCH_SECS)
}
