//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use pitchlink::domain::call::{
    ConnectionError, ConnectionState, IceCandidate, MediaError, NegotiationError, SdpType,
    SessionDescription,
};
use pitchlink::domain::history::{CallHistoryRecord, CallHistoryRepository, HistoryError};
use pitchlink::domain::connection::{
    ConnectionFactory, IceConfig, PeerConnection, PeerEvent, PeerEventSender,
};
use pitchlink::domain::media::{MediaConstraints, MediaGate, MediaStreamHandle};
use pitchlink::domain::shared::value_objects::{HistoryRecordId, ParticipantId};
use pitchlink::infrastructure::persistence::InMemoryCallHistoryRepository;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One recorded call on a fake connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCall {
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpType),
    SetRemote(SdpType),
    AddCandidate(String),
    Close,
}

/// Everything a fake connection saw, plus its event sender
pub struct FakeConnectionLog {
    label: String,
    auto_connect: bool,
    calls: Mutex<Vec<ConnectionCall>>,
    events: PeerEventSender,
    has_local: Mutex<bool>,
    has_remote: Mutex<bool>,
}

impl FakeConnectionLog {
    pub fn calls(&self) -> Vec<ConnectionCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn added_candidates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ConnectionCall::AddCandidate(candidate) => Some(candidate),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.calls().contains(&ConnectionCall::Close)
    }

    /// Raise a connection event as the native stack would
    pub fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    fn record(&self, call: ConnectionCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Connect once both descriptions are in place
    fn maybe_connect(&self) {
        let ready = *self.has_local.lock().unwrap() && *self.has_remote.lock().unwrap();
        if self.auto_connect && ready {
            self.emit(PeerEvent::StateChanged(ConnectionState::Connecting));
            self.emit(PeerEvent::StateChanged(ConnectionState::Connected));
        }
    }
}

pub struct FakeConnection {
    log: Arc<FakeConnectionLog>,
}

#[async_trait]
impl PeerConnection for FakeConnection {
    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        self.log.record(ConnectionCall::CreateOffer);
        Ok(SessionDescription::offer(format!("v=0 offer from {}", self.log.label)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        self.log.record(ConnectionCall::CreateAnswer);
        Ok(SessionDescription::answer(format!("v=0 answer from {}", self.log.label)))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), NegotiationError> {
        self.log.record(ConnectionCall::SetLocal(description.sdp_type));
        *self.log.has_local.lock().unwrap() = true;
        self.log.emit(PeerEvent::LocalCandidate(IceCandidate::new(format!(
            "candidate:1 1 udp 2122260223 10.0.0.1 5000 typ host {}",
            self.log.label
        ))));
        self.log.maybe_connect();
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), NegotiationError> {
        self.log.record(ConnectionCall::SetRemote(description.sdp_type));
        *self.log.has_remote.lock().unwrap() = true;
        self.log.maybe_connect();
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        self.log.record(ConnectionCall::AddCandidate(candidate.candidate));
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.log.record(ConnectionCall::Close);
        Ok(())
    }
}

/// Hands out fake connections and keeps their logs
pub struct FakeConnectionFactory {
    label: String,
    auto_connect: bool,
    fail: bool,
    connections: Mutex<Vec<Arc<FakeConnectionLog>>>,
}

impl FakeConnectionFactory {
    pub fn new(label: &str) -> Arc<Self> {
        Arc::new(Self::build(label, false, false))
    }

    /// Reports `connected` once offer and answer are both applied
    pub fn auto_connecting(label: &str) -> Arc<Self> {
        Arc::new(Self::build(label, true, false))
    }

    pub fn failing(label: &str) -> Arc<Self> {
        Arc::new(Self::build(label, false, true))
    }

    fn build(label: &str, auto_connect: bool, fail: bool) -> Self {
        Self {
            label: label.to_string(),
            auto_connect,
            fail,
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// Log of the most recent connection
    pub fn last(&self) -> Arc<FakeConnectionLog> {
        self.connections
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection created")
    }
}

#[async_trait]
impl ConnectionFactory for FakeConnectionFactory {
    async fn create(
        &self,
        _config: &IceConfig,
        _local_stream: &MediaStreamHandle,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerConnection>, ConnectionError> {
        if self.fail {
            return Err(ConnectionError::Unsupported("no native stack".to_string()));
        }

        let log = Arc::new(FakeConnectionLog {
            label: self.label.clone(),
            auto_connect: self.auto_connect,
            calls: Mutex::new(Vec::new()),
            events,
            has_local: Mutex::new(false),
            has_remote: Mutex::new(false),
        });
        self.connections.lock().unwrap().push(log.clone());
        Ok(Box::new(FakeConnection { log }))
    }
}

/// Media gate whose acquisition never completes
#[derive(Default)]
pub struct PendingMedia {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl MediaGate for PendingMedia {
    async fn acquire(&self, _constraints: &MediaConstraints) -> Result<MediaStreamHandle, MediaError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// History store that commits inserts right away but acknowledges them late
pub struct SlowAckHistory {
    pub inner: Arc<InMemoryCallHistoryRepository>,
    pub ack_delay: Duration,
}

#[async_trait]
impl CallHistoryRepository for SlowAckHistory {
    async fn insert(&self, record: &CallHistoryRecord) -> Result<(), HistoryError> {
        self.inner.insert(record).await?;
        tokio::time::sleep(self.ack_delay).await;
        Ok(())
    }

    async fn update(&self, record: &CallHistoryRecord) -> Result<bool, HistoryError> {
        self.inner.update(record).await
    }

    async fn get(&self, id: HistoryRecordId) -> Result<Option<CallHistoryRecord>, HistoryError> {
        self.inner.get(id).await
    }

    async fn list_for_participant(
        &self,
        participant_id: &ParticipantId,
        limit: i64,
    ) -> Result<Vec<CallHistoryRecord>, HistoryError> {
        self.inner.list_for_participant(participant_id, limit).await
    }
}
