//! Push-channel consumer for live forecast updates.
//!
//! ```text
//!  WS Server ──push──▶ ws_connection_loop (background task)
//!                         │  decodes {type, payload} envelopes
//!                         │  one upsert per match_update
//!                         ▼
//!                    MatchRegistry (freshness-clock arbitration)
//! ```
//!
//! A dropped connection never clears registry state; the loop reconnects
//! with capped exponential backoff plus jitter. Redelivered updates after a
//! reconnect are absorbed by the registry's clock comparison.

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::{FeedStatus, FeedSubscription};
use crate::error::SyncError;
use crate::registry::{Match, MatchRegistry, UpsertOutcome};

/// Envelope type carrying a match snapshot
pub const MATCH_UPDATE: &str = "match_update";

/// Configuration for the push-channel connection.
#[derive(Debug, Clone)]
pub struct LiveFeedConfig {
    /// WebSocket URL to connect to (ws:// or wss://)
    pub url: String,
    /// Seconds between client-side ping frames
    pub ping_interval: Duration,
    /// Upper bound for the reconnect backoff
    pub max_backoff: Duration,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Decode one push message.
///
/// `Ok(None)` for well-formed envelopes of other types, which this consumer
/// ignores.
pub fn decode_envelope(text: &str) -> Result<Option<Match>, SyncError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    if envelope.kind != MATCH_UPDATE {
        return Ok(None);
    }
    Match::from_payload(envelope.payload).map(Some)
}

/// Apply one text frame to the registry. Undecodable frames are logged and
/// dropped without touching registry state.
pub async fn apply_message(text: &str, registry: &MatchRegistry) -> Option<UpsertOutcome> {
    match decode_envelope(text) {
        Ok(Some(m)) => {
            let match_id = m.match_id.clone();
            let outcome = registry.upsert(m).await;
            debug!("[LiveFeed] {} -> {:?}", match_id, outcome);
            Some(outcome)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("[LiveFeed] Dropping undecodable message: {}", e);
            None
        }
    }
}

/// Open the push channel and return the subscription handle that keeps it
/// alive. The connection closes once the last handle is dropped.
pub fn start_live_feed(config: LiveFeedConfig, registry: MatchRegistry) -> FeedSubscription {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let (status_tx, status_rx) = watch::channel(FeedStatus::Connecting);

    tokio::spawn(async move {
        ws_connection_loop(&config, &registry, &status_tx, shutdown_rx).await;
        let _ = status_tx.send(FeedStatus::Closed);
        info!("[LiveFeed] Closed");
    });

    FeedSubscription::new(shutdown_tx, status_rx)
}

fn backoff_with_jitter(base: Duration) -> Duration {
    let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4);
    base + Duration::from_millis(jitter_ms)
}

/// Persistent WebSocket connection loop with auto-reconnect.
async fn ws_connection_loop(
    config: &LiveFeedConfig,
    registry: &MatchRegistry,
    status: &watch::Sender<FeedStatus>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let initial_backoff = Duration::from_secs(1);
    let mut backoff = initial_backoff;

    loop {
        info!("[LiveFeed] Connecting to {}", config.url);
        let _ = status.send(FeedStatus::Connecting);

        let connect = tokio::select! {
            res = tokio_tungstenite::connect_async(config.url.as_str()) => res,
            _ = &mut shutdown => return,
        };

        let reason = match connect {
            Ok((ws_stream, _response)) => {
                info!("[LiveFeed] Connected");
                let _ = status.send(FeedStatus::Connected);
                backoff = initial_backoff;

                let (mut write, mut read) = ws_stream.split();
                let mut ping_interval = tokio::time::interval(config.ping_interval);
                ping_interval.reset();

                loop {
                    tokio::select! {
                        msg = read.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    if text.trim() == "ping" {
                                        let _ = write.send(Message::Text("pong".to_string())).await;
                                        continue;
                                    }
                                    apply_message(&text, registry).await;
                                }
                                Some(Ok(Message::Ping(data))) => {
                                    let _ = write.send(Message::Pong(data)).await;
                                }
                                Some(Ok(Message::Close(_))) => {
                                    warn!("[LiveFeed] Server closed WebSocket");
                                    break "server closed connection".to_string();
                                }
                                Some(Err(e)) => {
                                    error!("[LiveFeed] WebSocket error: {}", e);
                                    break e.to_string();
                                }
                                None => {
                                    warn!("[LiveFeed] WebSocket stream ended");
                                    break "stream ended".to_string();
                                }
                                _ => {}
                            }
                        }
                        _ = ping_interval.tick() => {
                            if let Err(e) = write.send(Message::Ping(vec![])).await {
                                error!("[LiveFeed] Ping failed: {}", e);
                                break e.to_string();
                            }
                        }
                        _ = &mut shutdown => {
                            let _ = write.send(Message::Close(None)).await;
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                error!("[LiveFeed] Connection failed: {}", e);
                e.to_string()
            }
        };

        let delay = backoff_with_jitter(backoff);
        warn!("[LiveFeed] Reconnecting in {:.1}s...", delay.as_secs_f64());
        let _ = status.send(FeedStatus::Disconnected {
            reason,
            retry_in_secs: delay.as_secs(),
        });

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown => return,
        }
        backoff = (backoff * 2).min(config.max_backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MatchStatus;
    use axum::extract::ws::{Message as ServerMessage, WebSocket, WebSocketUpgrade};
    use axum::{routing::get, Router};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[test]
    fn test_decode_match_update() {
        let text = r#"{"type": "match_update", "payload": {
            "match_id": "m1", "status": "LIVE", "updated_at_unix": 100,
            "probabilities": {"home": 0.5, "draw": 0.3, "away": 0.2}
        }}"#;
        let m = decode_envelope(text).unwrap().unwrap();
        assert_eq!(m.match_id, "m1");
        assert_eq!(m.status, MatchStatus::Live);
    }

    #[test]
    fn test_decode_ignores_other_types() {
        let text = r#"{"type": "heartbeat", "payload": {"ts": 1}}"#;
        assert!(decode_envelope(text).unwrap().is_none());
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(decode_envelope("{not json"), Err(SyncError::Decode(_))));
        assert!(matches!(
            decode_envelope(r#"{"payload": {"match_id": "m1"}}"#),
            Err(SyncError::Decode(_))
        ));
        assert!(matches!(
            decode_envelope(r#"{"type": "match_update", "payload": {"status": "LIVE"}}"#),
            Err(SyncError::MissingMatchId)
        ));
        assert!(matches!(
            decode_envelope(r#"{"type": "match_update"}"#),
            Err(SyncError::MissingMatchId)
        ));
    }

    #[tokio::test]
    async fn test_bad_messages_leave_registry_untouched() {
        let registry = MatchRegistry::new();
        let good = r#"{"type": "match_update", "payload": {"match_id": "m1", "updated_at_unix": 10}}"#;
        assert_eq!(apply_message(good, &registry).await, Some(UpsertOutcome::Inserted));
        let before = registry.list().await;

        for bad in [
            "garbage",
            r#"{"type": "match_update", "payload": {"home_team": "x"}}"#,
            r#"{"type": "match_update", "payload": {"match_id": "m1", "updated_at_unix": "soon"}}"#,
            r#"{"type": "odds_tick", "payload": {"match_id": "m1"}}"#,
        ] {
            assert_eq!(apply_message(bad, &registry).await, None);
        }
        assert_eq!(registry.list().await, before);
    }

    #[tokio::test]
    async fn test_redelivery_is_a_noop() {
        let registry = MatchRegistry::new();
        let msg = r#"{"type": "match_update", "payload": {"match_id": "m1", "updated_at_unix": 10}}"#;
        let older = r#"{"type": "match_update", "payload": {"match_id": "m1", "updated_at_unix": 9, "status": "LIVE"}}"#;
        apply_message(msg, &registry).await;
        assert_eq!(apply_message(msg, &registry).await, Some(UpsertOutcome::Unchanged));
        assert_eq!(apply_message(older, &registry).await, Some(UpsertOutcome::Stale));
        assert_eq!(registry.get("m1").await.unwrap().status, MatchStatus::Prematch);
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let base = Duration::from_secs(8);
        for _ in 0..100 {
            let d = backoff_with_jitter(base);
            assert!(d >= base && d <= base + Duration::from_secs(2));
        }
    }

    /// Server side of one connection: push a scripted burst, wait for the
    /// client's reply to the text ping, then close.
    async fn push_script(mut socket: WebSocket, replies: mpsc::UnboundedSender<String>) {
        let frames = [
            r#"{"type": "match_update", "payload": {"match_id": "m1", "updated_at_unix": 100}}"#,
            "not json at all",
            r#"{"type": "match_update", "payload": {"match_id": "m1", "updated_at_unix": 90, "status": "LIVE"}}"#,
            "ping",
        ];
        for frame in frames {
            if socket.send(ServerMessage::Text(frame.to_string())).await.is_err() {
                return;
            }
        }
        while let Some(Ok(msg)) = socket.recv().await {
            if let ServerMessage::Text(text) = msg {
                let _ = replies.send(text);
                break;
            }
        }
        let _ = socket.send(ServerMessage::Close(None)).await;
    }

    async fn serve_feed(replies: mpsc::UnboundedSender<String>) -> String {
        let app = Router::new().route(
            "/ws",
            get(move |ws: WebSocketUpgrade| {
                let replies = replies.clone();
                async move { ws.on_upgrade(move |socket| push_script(socket, replies)) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("ws://{}/ws", addr)
    }

    #[tokio::test]
    async fn test_connection_loop_against_server() {
        let (replies_tx, mut replies_rx) = mpsc::unbounded_channel();
        let url = serve_feed(replies_tx).await;
        let registry = MatchRegistry::new();
        let config = LiveFeedConfig {
            url,
            ping_interval: Duration::from_secs(25),
            max_backoff: Duration::from_secs(30),
        };
        let sub = start_live_feed(config, registry.clone());
        let mut observer = sub.status.clone();

        let reply = timeout(Duration::from_secs(5), replies_rx.recv()).await.unwrap();
        assert_eq!(reply.as_deref(), Some("pong"));

        let reason = timeout(Duration::from_secs(5), async {
            loop {
                let current = observer.borrow_and_update().clone();
                if let FeedStatus::Disconnected { reason, .. } = current {
                    return reason;
                }
                observer.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert_eq!(reason, "server closed connection");

        // Fresh entry kept; garbage and the older clock were discarded
        let stored = registry.get("m1").await.unwrap();
        assert_eq!(stored.updated_at_unix, 100);
        assert_eq!(stored.status, MatchStatus::Prematch);
        assert_eq!(registry.len().await, 1);

        // Reconnects after the backoff and replays the script without regressing state
        let reply = timeout(Duration::from_secs(5), replies_rx.recv()).await.unwrap();
        assert_eq!(reply.as_deref(), Some("pong"));
        assert_eq!(registry.get("m1").await.unwrap().updated_at_unix, 100);

        drop(sub);
    }
}
