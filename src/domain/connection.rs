//! Native peer connection contract
//!
//! The session task only talks to connections through [`PeerConnection`], so
//! tests can inject a fake and drive connection events by hand.

use crate::domain::call::error::{ConnectionError, NegotiationError};
use crate::domain::call::signal::{IceCandidate, SessionDescription};
use crate::domain::call::value_object::ConnectionState;
use crate::domain::media::{MediaStreamHandle, MediaTrack};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// STUN/TURN server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// ICE configuration for new connections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceConfig {
    pub ice_servers: Vec<IceServer>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![
                IceServer::stun("stun:stun.l.google.com:19302"),
                IceServer::stun("stun:stun1.l.google.com:19302"),
            ],
        }
    }
}

/// Events raised by a native connection
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local ICE candidate was gathered
    LocalCandidate(IceCandidate),
    StateChanged(ConnectionState),
    /// The remote peer started sending a track
    RemoteTrack(Arc<MediaTrack>),
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

/// A native peer connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), NegotiationError>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), NegotiationError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError>;

    async fn close(&self) -> Result<(), ConnectionError>;
}

/// Connection factory
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Create a connection with the local tracks attached
    ///
    /// Candidates, state changes and remote tracks are reported on `events`.
    async fn create(
        &self,
        config: &IceConfig,
        local_stream: &MediaStreamHandle,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerConnection>, ConnectionError>;
}
