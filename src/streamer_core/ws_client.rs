//! Live account stream over WebSocket JSON-RPC
//!
//! Subscribes to `accountSubscribe` for every tracked wallet and translates
//! each `accountNotification` into a per-wallet refresh request. The mapping
//! from subscription id to wallet is established once per connection from the
//! subscription confirmations.
//!
//! Connection lifecycle is a small state machine:
//! `Disconnected → Connecting → Subscribing → Streaming → Disconnected`,
//! driven by a capped exponential backoff that resets once the stream reaches
//! `Streaming`. While the stream is down, the periodic sweep timer keeps
//! refreshing independently.

use crate::pipeline::events::shorten_address;
use crate::pipeline::ingestion::RefreshCoordinator;
use crate::pipeline::types::RefreshRequest;
use crate::streamer_core::error_handler::{ExponentialBackoff, MaxRetriesExceeded};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Debug)]
pub enum StreamError {
    Connect(String),
    Subscribe(String),
    MaxRetries,
}

impl From<MaxRetriesExceeded> for StreamError {
    fn from(_: MaxRetriesExceeded) -> Self {
        StreamError::MaxRetries
    }
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::Connect(msg) => write!(f, "Connection error: {}", msg),
            StreamError::Subscribe(msg) => write!(f, "Subscription error: {}", msg),
            StreamError::MaxRetries => write!(f, "Maximum reconnect attempts exceeded"),
        }
    }
}

impl std::error::Error for StreamError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribing,
    Streaming,
}

#[derive(Serialize)]
struct SubscribeRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Vec<serde_json::Value>,
}

fn account_subscribe_request(id: u64, wallet: &str) -> SubscribeRequest {
    SubscribeRequest {
        jsonrpc: "2.0",
        id,
        method: "accountSubscribe",
        params: vec![
            serde_json::json!(wallet),
            serde_json::json!({
                "encoding": "jsonParsed",
                "commitment": "confirmed",
            }),
        ],
    }
}

/// Per-connection mapping of subscriptions to wallets.
///
/// `pending` keys are our request ids, `active` keys are the server-assigned
/// subscription ids from the confirmation replies.
#[derive(Debug, Default)]
struct SubscriptionMap {
    pending: HashMap<u64, String>,
    active: HashMap<u64, String>,
}

#[derive(Debug, PartialEq)]
enum StreamEvent {
    Subscribed {
        request_id: u64,
        subscription_id: u64,
    },
    AccountChanged {
        subscription_id: u64,
    },
    Other,
}

fn classify_message(text: &str) -> StreamEvent {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => return StreamEvent::Other,
    };

    if value.get("method").and_then(|m| m.as_str()) == Some("accountNotification") {
        if let Some(subscription_id) = value
            .get("params")
            .and_then(|p| p.get("subscription"))
            .and_then(|s| s.as_u64())
        {
            return StreamEvent::AccountChanged { subscription_id };
        }
        return StreamEvent::Other;
    }

    // Subscription confirmation: {"jsonrpc":"2.0","result":<sub id>,"id":<req id>}
    match (
        value.get("id").and_then(|i| i.as_u64()),
        value.get("result").and_then(|r| r.as_u64()),
    ) {
        (Some(request_id), Some(subscription_id)) => StreamEvent::Subscribed {
            request_id,
            subscription_id,
        },
        _ => StreamEvent::Other,
    }
}

/// WebSocket client feeding live wallet changes into the refresh queue.
pub struct AccountStreamer {
    ws_url: String,
    wallets: Vec<String>,
    coordinator: RefreshCoordinator,
    state: ConnectionState,
}

impl AccountStreamer {
    pub fn new(ws_url: String, wallets: Vec<String>, coordinator: RefreshCoordinator) -> Self {
        Self {
            ws_url,
            wallets,
            coordinator,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connect, subscribe and stream until the retry budget is exhausted.
    ///
    /// Every disconnect (handshake failure, server close, protocol error)
    /// goes through the backoff before the next attempt.
    pub async fn run(mut self) -> Result<(), StreamError> {
        let mut backoff = ExponentialBackoff::new(1_000, 60_000, 10);

        loop {
            match self.stream_once(&mut backoff).await {
                Ok(()) => {
                    log::info!("✅ Account stream finished");
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("🚫 Account stream interrupted: {}", e);
                }
            }

            self.state = ConnectionState::Disconnected;
            backoff.sleep().await?;
        }
    }

    async fn stream_once(&mut self, backoff: &mut ExponentialBackoff) -> Result<(), StreamError> {
        self.state = ConnectionState::Connecting;
        let (ws_stream, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        let (mut sender, mut receiver) = ws_stream.split();

        self.state = ConnectionState::Subscribing;
        let mut subs = SubscriptionMap::default();
        for (index, wallet) in self.wallets.iter().enumerate() {
            let request_id = (index + 1) as u64;
            let request = account_subscribe_request(request_id, wallet);
            let text = serde_json::to_string(&request)
                .map_err(|e| StreamError::Subscribe(e.to_string()))?;
            sender
                .send(Message::Text(text))
                .await
                .map_err(|e| StreamError::Subscribe(e.to_string()))?;
            subs.pending.insert(request_id, wallet.clone());
        }

        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    self.handle_message(&text, &mut subs);

                    if self.state == ConnectionState::Subscribing && subs.pending.is_empty() {
                        self.state = ConnectionState::Streaming;
                        backoff.reset();
                        log::info!(
                            "✅ Live account stream active ({} subscriptions)",
                            subs.active.len()
                        );
                    }
                }
                Ok(Message::Ping(payload)) => {
                    let _ = sender.send(Message::Pong(payload)).await;
                }
                Ok(Message::Close(_)) => {
                    return Err(StreamError::Connect(
                        "connection closed by server".to_string(),
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(StreamError::Connect(e.to_string()));
                }
            }
        }

        Err(StreamError::Connect("stream ended".to_string()))
    }

    fn handle_message(&self, text: &str, subs: &mut SubscriptionMap) {
        match classify_message(text) {
            StreamEvent::Subscribed {
                request_id,
                subscription_id,
            } => {
                if let Some(wallet) = subs.pending.remove(&request_id) {
                    log::debug!(
                        "📡 Subscription {} confirmed for {}",
                        subscription_id,
                        shorten_address(&wallet)
                    );
                    subs.active.insert(subscription_id, wallet);
                }
            }
            StreamEvent::AccountChanged { subscription_id } => {
                match subs.active.get(&subscription_id) {
                    Some(wallet) => {
                        log::debug!("🔔 Account change for {}", shorten_address(wallet));
                        self.coordinator
                            .request_refresh(RefreshRequest::Wallet(wallet.clone()));
                    }
                    None => {
                        log::debug!(
                            "⚠️  Notification for unknown subscription {}",
                            subscription_id
                        );
                    }
                }
            }
            StreamEvent::Other => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_confirmation() {
        let event = classify_message(r#"{"jsonrpc":"2.0","result":23784,"id":1}"#);
        assert_eq!(
            event,
            StreamEvent::Subscribed {
                request_id: 1,
                subscription_id: 23784
            }
        );
    }

    #[test]
    fn test_classify_account_notification() {
        let raw = r#"{
            "jsonrpc": "2.0",
            "method": "accountNotification",
            "params": {
                "result": { "context": { "slot": 5199307 }, "value": { "lamports": 2 } },
                "subscription": 23784
            }
        }"#;

        assert_eq!(
            classify_message(raw),
            StreamEvent::AccountChanged {
                subscription_id: 23784
            }
        );
    }

    #[test]
    fn test_classify_garbage_and_unrelated() {
        assert_eq!(classify_message("not json"), StreamEvent::Other);
        assert_eq!(
            classify_message(r#"{"jsonrpc":"2.0","method":"slotNotification"}"#),
            StreamEvent::Other
        );
        // Error reply to a subscribe request has no numeric result.
        assert_eq!(
            classify_message(r#"{"jsonrpc":"2.0","error":{"code":-32602},"id":1}"#),
            StreamEvent::Other
        );
    }

    #[test]
    fn test_subscribe_request_shape() {
        let request = account_subscribe_request(3, "WalletAddr");
        let text = serde_json::to_string(&request).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["method"], "accountSubscribe");
        assert_eq!(value["id"], 3);
        assert_eq!(value["params"][0], "WalletAddr");
        assert_eq!(value["params"][1]["commitment"], "confirmed");
    }

    #[tokio::test]
    async fn test_notification_routes_to_refresh_queue() {
        let (coordinator, mut rx) = RefreshCoordinator::new();
        let streamer = AccountStreamer::new(
            "wss://unused".to_string(),
            vec!["walletA".to_string(), "walletB".to_string()],
            coordinator,
        );

        let mut subs = SubscriptionMap::default();
        subs.pending.insert(1, "walletA".to_string());
        subs.pending.insert(2, "walletB".to_string());

        // Confirmations map request ids to server subscription ids.
        streamer.handle_message(r#"{"jsonrpc":"2.0","result":100,"id":1}"#, &mut subs);
        streamer.handle_message(r#"{"jsonrpc":"2.0","result":200,"id":2}"#, &mut subs);
        assert!(subs.pending.is_empty());

        let notification = r#"{
            "jsonrpc": "2.0",
            "method": "accountNotification",
            "params": { "result": {}, "subscription": 200 }
        }"#;
        streamer.handle_message(notification, &mut subs);

        let request = rx.recv().await.unwrap();
        assert_eq!(request, RefreshRequest::Wallet("walletB".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_subscription_enqueues_nothing() {
        let (coordinator, mut rx) = RefreshCoordinator::new();
        let streamer =
            AccountStreamer::new("wss://unused".to_string(), vec![], coordinator);

        let mut subs = SubscriptionMap::default();
        let notification = r#"{
            "jsonrpc": "2.0",
            "method": "accountNotification",
            "params": { "result": {}, "subscription": 999 }
        }"#;
        streamer.handle_message(notification, &mut subs);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_initial_state_disconnected() {
        let (coordinator, _rx) = RefreshCoordinator::new();
        let streamer =
            AccountStreamer::new("wss://unused".to_string(), vec![], coordinator);
        assert_eq!(streamer.state(), ConnectionState::Disconnected);
    }
}
