use serde::Serialize;
use thiserror::Error;

/// Failures that can occur while synchronizing forecast state.
///
/// None of these are fatal: decode failures are dropped at the consumer,
/// transport failures are surfaced as [`FetchState::Failed`], and stale
/// updates are not errors at all.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Malformed push message or response body
    #[error("decode failure: {0}")]
    Decode(#[from] serde_json::Error),

    /// Update without a usable identity
    #[error("update is missing a non-empty match_id")]
    MissingMatchId,

    /// Connection drop or non-success response from every endpoint tried
    #[error("transport failure on {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },
}

impl SyncError {
    pub fn transport(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::Transport {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result of the most recent fetch cycle for a pulled resource.
///
/// `Pending` (nothing fetched yet) is deliberately distinct from `Failed`,
/// and a failure keeps whatever was last loaded successfully.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FetchState<T> {
    Pending,
    Ready {
        data: T,
        fetched_at: i64,
    },
    Failed {
        error: String,
        failed_at: i64,
        last_good: Option<T>,
    },
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        FetchState::Pending
    }
}

impl<T> FetchState<T> {
    /// Apply one fetch result. Success replaces wholesale; failure retains
    /// the last good data.
    pub fn apply(&mut self, result: Result<T, SyncError>, now_unix: i64) {
        let next = match result {
            Ok(data) => FetchState::Ready {
                data,
                fetched_at: now_unix,
            },
            Err(e) => {
                let last_good = match std::mem::take(self) {
                    FetchState::Ready { data, .. } => Some(data),
                    FetchState::Failed { last_good, .. } => last_good,
                    FetchState::Pending => None,
                };
                FetchState::Failed {
                    error: e.to_string(),
                    failed_at: now_unix,
                    last_good,
                }
            }
        };
        *self = next;
    }

    /// The freshest data available, whether or not the last fetch failed.
    pub fn data(&self) -> Option<&T> {
        match self {
            FetchState::Ready { data, .. } => Some(data),
            FetchState::Failed { last_good, .. } => last_good.as_ref(),
            FetchState::Pending => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FetchState::Failed { .. })
    }
}
