/// Signaling relay server
///
/// Rebroadcasts signal rows among every WebSocket connected to the same
/// `call:{id}` channel. Rows must parse as signal messages for that call;
/// anything else is dropped. Rows published before a participant joins are
/// replayed to it on connect.
use crate::domain::call::signal::SignalMessage;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;
const BACKLOG_LIMIT: usize = 256;

struct HubChannel {
    /// (sending connection, JSON row)
    tx: broadcast::Sender<(Uuid, String)>,
    backlog: VecDeque<String>,
    connections: usize,
}

/// Relay channels keyed by `call:{id}`
#[derive(Default)]
pub struct RelayHub {
    channels: RwLock<HashMap<String, HubChannel>>,
}

impl RelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call id for a `call:{id}` channel name
    fn call_id_of(channel: &str) -> Option<&str> {
        channel.strip_prefix("call:").filter(|id| !id.is_empty())
    }

    /// Join a channel; returns the backlog and a live receiver
    async fn join(&self, channel: &str) -> (Vec<String>, broadcast::Receiver<(Uuid, String)>) {
        let mut channels = self.channels.write().await;
        let entry = channels.entry(channel.to_string()).or_insert_with(|| {
            let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
            HubChannel {
                tx,
                backlog: VecDeque::new(),
                connections: 0,
            }
        });
        entry.connections += 1;
        (entry.backlog.iter().cloned().collect(), entry.tx.subscribe())
    }

    async fn leave(&self, channel: &str) {
        let mut channels = self.channels.write().await;
        if let Some(entry) = channels.get_mut(channel) {
            entry.connections = entry.connections.saturating_sub(1);
            if entry.connections == 0 {
                channels.remove(channel);
                debug!("Relay channel {} closed", channel);
            }
        }
    }

    /// Validate and rebroadcast one row; returns false when it was rejected
    async fn relay(&self, channel: &str, from: Uuid, text: String) -> bool {
        let message: SignalMessage = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed row on {}: {}", channel, e);
                return false;
            }
        };
        if message.call_id.channel() != channel {
            warn!(
                "Dropping row for call {} sent on channel {}",
                message.call_id, channel
            );
            return false;
        }

        let mut channels = self.channels.write().await;
        let Some(entry) = channels.get_mut(channel) else {
            return false;
        };
        if entry.backlog.len() == BACKLOG_LIMIT {
            entry.backlog.pop_front();
        }
        entry.backlog.push_back(text.clone());
        let _ = entry.tx.send((from, text));

        debug!(
            "Relayed {} from {} to {} on {}",
            message.kind.as_str(),
            message.sender_id,
            message.receiver_id,
            channel
        );
        true
    }

    /// Open connections on a channel
    pub async fn connection_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .await
            .get(channel)
            .map(|entry| entry.connections)
            .unwrap_or(0)
    }
}

/// WebSocket handler for `/relay/:channel`
pub async fn relay_ws_handler(
    ws: WebSocketUpgrade,
    Path(channel): Path<String>,
    State(hub): State<Arc<RelayHub>>,
) -> Response {
    if RelayHub::call_id_of(&channel).is_none() {
        return (StatusCode::BAD_REQUEST, "channel must be call:{id}").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, channel, hub))
}

/// Handle one relay connection
async fn handle_socket(socket: WebSocket, channel: String, hub: Arc<RelayHub>) {
    let conn_id = Uuid::new_v4();
    info!("Relay connection {} joined {}", conn_id, channel);

    let (mut sender, mut receiver) = socket.split();
    let (backlog, mut rx) = hub.join(&channel).await;

    // Task to send rows to this connection
    let channel_clone = channel.clone();
    let mut send_task = tokio::spawn(async move {
        for text in backlog {
            if sender.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        loop {
            match rx.recv().await {
                // Senders never hear their own rows
                Ok((from, _)) if from == conn_id => {}
                Ok((_, text)) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Relay connection on {} lagged by {} rows", channel_clone, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Task to receive rows from this connection
    let hub_clone = hub.clone();
    let channel_clone = channel.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    hub_clone.relay(&channel_clone, conn_id, text).await;
                }
                Ok(Message::Close(_)) => {
                    debug!("Relay connection {} closed by client", conn_id);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Relay WebSocket error on {}: {}", channel_clone, e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.leave(&channel).await;
    info!("Relay connection {} left {}", conn_id, channel);
}
