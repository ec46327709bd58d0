//! In-process signaling relay
//!
//! One broadcast channel per `call:{id}`, alive while it has subscribers.
//! Messages published while a channel is open are kept in a bounded backlog
//! and replayed to new subscribers, so a callee that joins late still sees
//! the offer. Publishing to a channel nobody holds drops the message.

use crate::domain::call::error::TransportError;
use crate::domain::call::signal::SignalMessage;
use crate::domain::relay::{SignalRelay, Subscription};
use crate::domain::shared::value_objects::CallId;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 256;
const BACKLOG_LIMIT: usize = 256;

struct Channel {
    tx: broadcast::Sender<SignalMessage>,
    backlog: VecDeque<SignalMessage>,
    subscribers: usize,
}

impl Channel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            backlog: VecDeque::new(),
            subscribers: 0,
        }
    }
}

type Channels = Arc<Mutex<HashMap<String, Channel>>>;

fn lock_error(e: impl std::fmt::Display) -> String {
    format!("relay state poisoned: {}", e)
}

/// In-memory relay shared by every session in the process
#[derive(Clone, Default)]
pub struct InMemoryRelay {
    channels: Channels,
}

impl InMemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published on the call's channel that are still in the backlog
    pub fn published(&self, call_id: &CallId) -> Vec<SignalMessage> {
        match self.channels.lock() {
            Ok(channels) => channels
                .get(&call_id.channel())
                .map(|channel| channel.backlog.iter().cloned().collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Live subscriptions on the call's channel
    pub fn subscriber_count(&self, call_id: &CallId) -> usize {
        match self.channels.lock() {
            Ok(channels) => channels
                .get(&call_id.channel())
                .map(|channel| channel.subscribers)
                .unwrap_or(0),
            Err(_) => 0,
        }
    }
}

#[async_trait]
impl SignalRelay for InMemoryRelay {
    async fn subscribe(&self, call_id: &CallId) -> Result<Subscription, TransportError> {
        let name = call_id.channel();
        let (backlog, mut rx) = {
            let mut channels = self
                .channels
                .lock()
                .map_err(|e| TransportError::Subscribe(lock_error(e)))?;
            let channel = channels.entry(name.clone()).or_insert_with(Channel::new);
            channel.subscribers += 1;
            // Snapshot and subscribe under one lock so nothing falls between them
            let backlog: Vec<SignalMessage> = channel.backlog.iter().cloned().collect();
            (backlog, channel.tx.subscribe())
        };

        let (tx, messages) = mpsc::unbounded_channel();
        let channel_name = name.clone();
        let forwarder = tokio::spawn(async move {
            for message in backlog {
                if tx.send(message).is_err() {
                    return;
                }
            }
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Subscriber on {} lagged, {} messages dropped", channel_name, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let channels = self.channels.clone();
        let release_name = name.clone();
        let guard = move || -> Result<(), TransportError> {
            forwarder.abort();
            let mut channels = channels
                .lock()
                .map_err(|e| TransportError::Unsubscribe(lock_error(e)))?;
            if let Some(channel) = channels.get_mut(&release_name) {
                channel.subscribers = channel.subscribers.saturating_sub(1);
                if channel.subscribers == 0 {
                    channels.remove(&release_name);
                    debug!("Relay channel {} closed", release_name);
                }
            }
            Ok(())
        };

        info!("Subscribed to in-memory relay channel {}", name);
        Ok(Subscription::new(call_id.clone(), messages, guard))
    }

    async fn publish(&self, call_id: &CallId, message: &SignalMessage) -> Result<(), TransportError> {
        let mut channels = self
            .channels
            .lock()
            .map_err(|e| TransportError::Publish(lock_error(e)))?;
        let Some(channel) = channels.get_mut(&call_id.channel()) else {
            debug!(
                "Dropped {} on {}: no subscribers",
                message.kind.as_str(),
                call_id.channel()
            );
            return Ok(());
        };

        if channel.backlog.len() == BACKLOG_LIMIT {
            channel.backlog.pop_front();
        }
        channel.backlog.push_back(message.clone());
        // Receivers may have lagged off; the backlog still covers late subscribers
        let delivered = channel.tx.send(message.clone()).unwrap_or(0);

        debug!(
            "Published {} on {} to {} subscribers",
            message.kind.as_str(),
            call_id.channel(),
            delivered
        );
        Ok(())
    }
}
