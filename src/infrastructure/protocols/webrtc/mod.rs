//! WebRTC protocol implementation
pub mod peer_connection;

pub use peer_connection::{WebRtcConnectionFactory, WebRtcPeerConnection};
