//! WebSocket signaling relay client
//!
//! Talks to the relay server at `{base_url}/relay/call:{id}`. Each
//! subscription owns one socket. One client may hold several subscriptions
//! on the same channel (both sides of a loopback call); a publish goes out on
//! one of them and is handed straight to that subscription's own receiver,
//! since the server never echoes a row back to the socket it came from.
//! Without any subscription a short-lived connection carries the message.

use crate::domain::call::error::TransportError;
use crate::domain::call::signal::SignalMessage;
use crate::domain::relay::{SignalRelay, Subscription};
use crate::domain::shared::value_objects::CallId;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One live subscription's socket writer and local receiver
#[derive(Clone)]
struct LocalSubscriber {
    id: Uuid,
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedSender<SignalMessage>,
}

type Subscribers = Arc<Mutex<HashMap<String, Vec<LocalSubscriber>>>>;

/// Relay client over WebSocket
#[derive(Clone)]
pub struct WebSocketRelay {
    base_url: String,
    subscribers: Subscribers,
}

impl WebSocketRelay {
    /// `base_url` is the server root, e.g. `ws://127.0.0.1:8080`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn channel_url(&self, call_id: &CallId) -> String {
        format!("{}/relay/{}", self.base_url, call_id.channel())
    }

    fn local_subscribers(&self, call_id: &CallId) -> Vec<LocalSubscriber> {
        self.subscribers
            .lock()
            .ok()
            .and_then(|subscribers| subscribers.get(&call_id.channel()).cloned())
            .unwrap_or_default()
    }

    /// Live subscriptions this client holds on the call's channel
    pub fn subscription_count(&self, call_id: &CallId) -> usize {
        self.local_subscribers(call_id).len()
    }

    async fn publish_once(&self, call_id: &CallId, payload: String) -> Result<(), TransportError> {
        let (mut socket, _) = connect_async(self.channel_url(call_id))
            .await
            .map_err(|e| TransportError::Publish(format!("Failed to connect to relay: {}", e)))?;

        socket
            .send(Message::Text(payload))
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        if let Err(e) = socket.close(None).await {
            debug!("Relay connection for {} closed uncleanly: {}", call_id.channel(), e);
        }
        Ok(())
    }
}

#[async_trait]
impl SignalRelay for WebSocketRelay {
    async fn subscribe(&self, call_id: &CallId) -> Result<Subscription, TransportError> {
        let url = self.channel_url(call_id);
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Subscribe(format!("Failed to connect to {}: {}", url, e)))?;
        info!("Connected to relay channel {}", url);

        let (mut sink, mut stream) = socket.split();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let local_tx = incoming_tx.clone();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let (close_tx, mut close_rx) = oneshot::channel::<()>();

        let channel = call_id.channel();
        let task_channel = channel.clone();
        tokio::spawn(async move {
            loop {
                // Queued rows go out before a requested close
                tokio::select! {
                    biased;
                    outgoing = outgoing_rx.recv() => match outgoing {
                        Some(text) => {
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                error!("Relay write on {} failed: {}", task_channel, e);
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = &mut close_rx => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    incoming = stream.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<SignalMessage>(&text) {
                                Ok(message) => {
                                    if incoming_tx.send(message).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!("Dropping malformed relay row on {}: {}", task_channel, e),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Relay channel {} closed by server", task_channel);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("Relay read on {} failed: {}", task_channel, e);
                            break;
                        }
                    },
                }
            }
        });

        let id = Uuid::new_v4();
        self.subscribers
            .lock()
            .map_err(|e| TransportError::Subscribe(e.to_string()))?
            .entry(channel.clone())
            .or_default()
            .push(LocalSubscriber {
                id,
                outgoing: outgoing_tx,
                incoming: local_tx,
            });

        let subscribers = self.subscribers.clone();
        let guard = move || -> Result<(), TransportError> {
            let mut subscribers = subscribers
                .lock()
                .map_err(|e| TransportError::Unsubscribe(e.to_string()))?;
            if let Some(local) = subscribers.get_mut(&channel) {
                local.retain(|subscriber| subscriber.id != id);
                if local.is_empty() {
                    subscribers.remove(&channel);
                }
            }
            drop(subscribers);
            // The socket task may already be gone
            let _ = close_tx.send(());
            debug!("Released relay subscription on {}", channel);
            Ok(())
        };

        Ok(Subscription::new(call_id.clone(), incoming_rx, guard))
    }

    async fn publish(&self, call_id: &CallId, message: &SignalMessage) -> Result<(), TransportError> {
        let payload = serde_json::to_string(message)
            .map_err(|e| TransportError::Publish(format!("Failed to encode signal: {}", e)))?;

        for subscriber in self.local_subscribers(call_id) {
            match subscriber.outgoing.send(payload.clone()) {
                Ok(()) => {
                    // The server skips this socket, so deliver to its reader here
                    let _ = subscriber.incoming.send(message.clone());
                    return Ok(());
                }
                Err(_) => warn!(
                    "Relay socket for {} is gone, trying another",
                    call_id.channel()
                ),
            }
        }

        self.publish_once(call_id, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_url() {
        let relay = WebSocketRelay::new("ws://127.0.0.1:8080/");
        assert_eq!(
            relay.channel_url(&CallId::new("c1")),
            "ws://127.0.0.1:8080/relay/call:c1"
        );
    }

    #[tokio::test]
    async fn test_subscribe_fails_without_server() {
        let relay = WebSocketRelay::new("ws://127.0.0.1:1");
        let result = relay.subscribe(&CallId::new("c1")).await;
        assert!(matches!(result, Err(TransportError::Subscribe(_))));
    }
}
