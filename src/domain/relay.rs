//! Signaling relay client contract

use crate::domain::call::error::TransportError;
use crate::domain::call::signal::SignalMessage;
use crate::domain::shared::value_objects::CallId;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

/// Releases the transport side of a subscription
pub trait SubscriptionGuard: Send {
    fn release(self: Box<Self>) -> Result<(), TransportError>;
}

impl<F> SubscriptionGuard for F
where
    F: FnOnce() -> Result<(), TransportError> + Send,
{
    fn release(self: Box<Self>) -> Result<(), TransportError> {
        (*self)()
    }
}

/// A live subscription to one call's relay channel
///
/// `unsubscribe` consumes the subscription, so it runs at most once; a
/// subscription dropped without it is released on drop.
pub struct Subscription {
    call_id: CallId,
    messages: mpsc::UnboundedReceiver<SignalMessage>,
    guard: Option<Box<dyn SubscriptionGuard>>,
}

impl Subscription {
    pub fn new(
        call_id: CallId,
        messages: mpsc::UnboundedReceiver<SignalMessage>,
        guard: impl SubscriptionGuard + 'static,
    ) -> Self {
        Self {
            call_id,
            messages,
            guard: Some(Box::new(guard)),
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// Next message on the channel; `None` once the transport is gone
    pub async fn recv(&mut self) -> Option<SignalMessage> {
        self.messages.recv().await
    }

    pub fn unsubscribe(mut self) -> Result<(), TransportError> {
        match self.guard.take() {
            Some(guard) => guard.release(),
            None => Ok(()),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            if let Err(e) = guard.release() {
                warn!("Failed to release relay subscription for call {}: {}", self.call_id, e);
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("call_id", &self.call_id)
            .field("active", &self.guard.is_some())
            .finish()
    }
}

/// Call-scoped broadcast channel
///
/// The relay performs no access control: every subscriber of `call:{id}`
/// sees every message published on it.
#[async_trait]
pub trait SignalRelay: Send + Sync {
    async fn subscribe(&self, call_id: &CallId) -> Result<Subscription, TransportError>;

    async fn publish(&self, call_id: &CallId, message: &SignalMessage) -> Result<(), TransportError>;
}
