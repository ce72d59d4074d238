pub mod websocket;

pub use websocket::{start_live_feed, LiveFeedConfig};

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

/// Connection state of the push channel as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeedStatus {
    Connecting,
    Connected,
    Disconnected { reason: String, retry_in_secs: u64 },
    Closed,
}

struct FeedGuard {
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for FeedGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Handle that keeps the push channel open.
///
/// Clones share one connection. Dropping the last clone closes it; the close
/// signal can only fire once.
#[derive(Clone)]
pub struct FeedSubscription {
    _guard: Arc<FeedGuard>,
    status: watch::Receiver<FeedStatus>,
}

impl FeedSubscription {
    pub(crate) fn new(shutdown: oneshot::Sender<()>, status: watch::Receiver<FeedStatus>) -> Self {
        FeedSubscription {
            _guard: Arc::new(FeedGuard {
                shutdown: Some(shutdown),
            }),
            status,
        }
    }

    pub fn status(&self) -> FeedStatus {
        self.status.borrow().clone()
    }
}
