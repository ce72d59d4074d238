//! Periodic full-list sweep feeding the registry through the same upsert
//! path as the push channel and per-match timers.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::MatchSource;
use crate::error::FetchState;
use crate::registry::MatchRegistry;

/// Outcome of the latest sweep: number of matches listed upstream.
pub type DiscoveryState = FetchState<usize>;

/// Shared handle on the discovery sweep and its last result.
#[derive(Clone, Default)]
pub struct DiscoverySweep {
    state: Arc<RwLock<DiscoveryState>>,
}

impl DiscoverySweep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one sweep. A failed fetch is recorded, never dropped, and leaves
    /// the registry untouched.
    pub async fn run_once(&self, source: &dyn MatchSource, registry: &MatchRegistry) {
        let result = match source.fetch_matches().await {
            Ok(matches) => {
                let total = matches.len();
                let mut accepted = 0;
                for m in matches {
                    if registry.upsert(m).await.is_accepted() {
                        accepted += 1;
                    }
                }
                info!("Discovered {} matches via {} ({} updated)", total, source.name(), accepted);
                Ok(total)
            }
            Err(e) => {
                warn!("Match discovery failed: {}", e);
                Err(e)
            }
        };
        self.state.write().await.apply(result, Utc::now().timestamp());
    }

    pub async fn state(&self) -> DiscoveryState {
        self.state.read().await.clone()
    }

    /// Sweep immediately, then every `every`.
    pub fn spawn(
        &self,
        source: Arc<dyn MatchSource>,
        registry: MatchRegistry,
        every: Duration,
    ) -> JoinHandle<()> {
        let sweep = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                sweep.run_once(source.as_ref(), &registry).await;
            }
        })
    }
}
