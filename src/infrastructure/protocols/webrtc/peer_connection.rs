/// WebRTC peer connections
///
/// Adapts `webrtc` peer connections to the domain [`PeerConnection`] port.
/// Native callbacks are forwarded as [`PeerEvent`]s; the session task never
/// sees a webrtc type.

use crate::domain::call::error::{ConnectionError, NegotiationError};
use crate::domain::call::signal::{IceCandidate, SdpType, SessionDescription};
use crate::domain::call::value_object::ConnectionState;
use crate::domain::connection::{
    ConnectionFactory, IceConfig, PeerConnection, PeerEvent, PeerEventSender,
};
use crate::domain::media::{MediaStreamHandle, MediaTrack, TrackKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Map native connection states onto the domain's
fn map_state(state: RTCPeerConnectionState) -> ConnectionState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => ConnectionState::New,
        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
        RTCPeerConnectionState::Connected => ConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => ConnectionState::Failed,
        RTCPeerConnectionState::Closed => ConnectionState::Closed,
    }
}

fn to_native_description(
    description: SessionDescription,
) -> Result<RTCSessionDescription, NegotiationError> {
    let result = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
    };
    result.map_err(|e| NegotiationError::MalformedPayload(e.to_string()))
}

fn from_native_description(
    description: RTCSessionDescription,
) -> Result<SessionDescription, NegotiationError> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Answer => SdpType::Answer,
        other => {
            return Err(NegotiationError::Rejected(format!(
                "unsupported local description type {}",
                other
            )))
        }
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: description.sdp,
    })
}

fn from_native_candidate(candidate: &RTCIceCandidate) -> Option<IceCandidate> {
    match candidate.to_json() {
        Ok(init) => Some(IceCandidate {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }),
        Err(e) => {
            warn!("Failed to serialize local ICE candidate: {}", e);
            None
        }
    }
}

fn native_ice_servers(config: &IceConfig) -> Vec<RTCIceServer> {
    config
        .ice_servers
        .iter()
        .map(|server| RTCIceServer {
            urls: server.urls.clone(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

/// Outgoing sample track for one local track
fn local_track(track: &MediaTrack, stream_id: &str) -> Arc<TrackLocalStaticSample> {
    let capability = match track.kind() {
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
    };
    Arc::new(TrackLocalStaticSample::new(
        capability,
        track.id().to_string(),
        stream_id.to_string(),
    ))
}

/// Creates native peer connections
pub struct WebRtcConnectionFactory;

impl WebRtcConnectionFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebRtcConnectionFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionFactory for WebRtcConnectionFactory {
    async fn create(
        &self,
        config: &IceConfig,
        local_stream: &MediaStreamHandle,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerConnection>, ConnectionError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| ConnectionError::Unsupported(e.to_string()))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| ConnectionError::Setup(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let configuration = RTCConfiguration {
            ice_servers: native_ice_servers(config),
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(configuration)
                .await
                .map_err(|e| ConnectionError::Setup(e.to_string()))?,
        );

        for track in local_stream.tracks() {
            let native = local_track(track, local_stream.id());
            pc.add_track(native as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| ConnectionError::Setup(format!("Failed to add track {}: {}", track.id(), e)))?;
            debug!("Attached local {:?} track {}", track.kind(), track.id());
        }

        let connection = WebRtcPeerConnection::new(pc);
        connection.forward_events(events);

        info!(
            "Created peer connection with {} local tracks",
            local_stream.tracks().len()
        );
        Ok(Box::new(connection))
    }
}

/// A native peer connection
pub struct WebRtcPeerConnection {
    pc: Arc<RTCPeerConnection>,
}

impl WebRtcPeerConnection {
    pub fn new(pc: Arc<RTCPeerConnection>) -> Self {
        Self { pc }
    }

    /// Install the native callbacks
    fn forward_events(&self, events: PeerEventSender) {
        let candidates = events.clone();
        self.pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let candidates = candidates.clone();
            Box::pin(async move {
                // `None` marks the end of gathering
                if let Some(candidate) = candidate.as_ref().and_then(from_native_candidate) {
                    let _ = candidates.send(PeerEvent::LocalCandidate(candidate));
                }
            })
        }));

        let states = events.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let _ = states.send(PeerEvent::StateChanged(map_state(state)));
                Box::pin(async {})
            }));

        let tracks = events;
        self.pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let kind = match track.kind() {
                RTPCodecType::Video => TrackKind::Video,
                _ => TrackKind::Audio,
            };
            let _ = tracks.send(PeerEvent::RemoteTrack(Arc::new(MediaTrack::new(
                track.id(),
                kind,
            ))));
            Box::pin(async {})
        }));
    }
}

#[async_trait]
impl PeerConnection for WebRtcPeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| NegotiationError::Rejected(e.to_string()))?;
        from_native_description(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| NegotiationError::Rejected(e.to_string()))?;
        from_native_description(answer)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), NegotiationError> {
        let native = to_native_description(description)?;
        self.pc
            .set_local_description(native)
            .await
            .map_err(|e| NegotiationError::Rejected(e.to_string()))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), NegotiationError> {
        let native = to_native_description(description)?;
        self.pc
            .set_remote_description(native)
            .await
            .map_err(|e| NegotiationError::Rejected(e.to_string()))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| NegotiationError::Rejected(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.pc
            .close()
            .await
            .map_err(|e| ConnectionError::Close(e.to_string()))
    }
}
