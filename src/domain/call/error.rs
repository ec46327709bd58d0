//! Call errors
//!
//! Every variant is terminal for the current call attempt.

use crate::domain::shared::DomainError;
use thiserror::Error;

/// Local capture could not be acquired
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Camera or microphone permission denied")]
    PermissionDenied,

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Native peer connection could not be set up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Peer connections are not supported here: {0}")]
    Unsupported(String),

    #[error("Peer connection setup failed: {0}")]
    Setup(String),

    #[error("Peer connection close failed: {0}")]
    Close(String),
}

/// Malformed or out-of-order signaling
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("Malformed signaling payload: {0}")]
    MalformedPayload(String),

    #[error("Out-of-order signaling: {0}")]
    OutOfOrder(String),

    #[error("Offer collision: remote offer arrived while our offer is outstanding")]
    Glare,

    #[error("Peer connection rejected negotiation step: {0}")]
    Rejected(String),
}

impl From<DomainError> for NegotiationError {
    fn from(err: DomainError) -> Self {
        NegotiationError::OutOfOrder(err.to_string())
    }
}

/// Relay publish/subscribe failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Relay subscribe failed: {0}")]
    Subscribe(String),

    #[error("Relay publish failed: {0}")]
    Publish(String),

    #[error("Relay unsubscribe failed: {0}")]
    Unsubscribe(String),

    #[error("Relay channel closed")]
    Closed,
}

/// Error surfaced to the caller-facing API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl CallError {
    /// Stable code for display layers
    pub fn code(&self) -> &'static str {
        match self {
            CallError::Media(MediaError::PermissionDenied) => "permission_denied",
            CallError::Media(MediaError::DeviceUnavailable(_)) => "device_unavailable",
            CallError::Connection(_) => "connection_failed",
            CallError::Negotiation(_) => "negotiation_failed",
            CallError::Transport(_) => "transport_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CallError::from(MediaError::PermissionDenied).code(),
            "permission_denied"
        );
        assert_eq!(
            CallError::from(MediaError::DeviceUnavailable("camera".to_string())).code(),
            "device_unavailable"
        );
        assert_eq!(CallError::from(NegotiationError::Glare).code(), "negotiation_failed");
        assert_eq!(CallError::from(TransportError::Closed).code(), "transport_failed");
    }

    #[test]
    fn test_domain_error_maps_to_out_of_order() {
        let err: NegotiationError =
            DomainError::InvalidStateTransition("idle -> negotiated".to_string()).into();
        assert!(matches!(err, NegotiationError::OutOfOrder(_)));
    }
}
