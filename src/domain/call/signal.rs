//! Signaling messages exchanged over the relay
//!
//! On the wire a message is a row `{call_id, sender_id, receiver_id, type, signal}`
//! where `signal` is the browser-shaped JSON of a session description or ICE candidate.

use crate::domain::call::error::NegotiationError;
use crate::domain::shared::value_objects::{CallId, ParticipantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Signal kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    Hangup,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice_candidate",
            SignalKind::Hangup => "hangup",
        }
    }
}

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
}

/// Session description (`RTCSessionDescriptionInit` shape)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate (`RTCIceCandidateInit` shape)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default)]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }
}

/// A signaling message; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
    pub call_id: CallId,
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    #[serde(rename = "signal", default)]
    pub payload: Value,
}

impl SignalMessage {
    pub fn new(
        call_id: CallId,
        sender_id: ParticipantId,
        receiver_id: ParticipantId,
        kind: SignalKind,
        payload: Value,
    ) -> Self {
        Self {
            call_id,
            sender_id,
            receiver_id,
            kind,
            payload,
        }
    }

    /// Build an offer or answer message from a session description
    pub fn description(
        call_id: CallId,
        sender_id: ParticipantId,
        receiver_id: ParticipantId,
        description: &SessionDescription,
    ) -> Result<Self, NegotiationError> {
        let kind = match description.sdp_type {
            SdpType::Offer => SignalKind::Offer,
            SdpType::Answer | SdpType::Pranswer => SignalKind::Answer,
        };
        let payload = serde_json::to_value(description)
            .map_err(|e| NegotiationError::MalformedPayload(e.to_string()))?;
        Ok(Self::new(call_id, sender_id, receiver_id, kind, payload))
    }

    pub fn ice_candidate(
        call_id: CallId,
        sender_id: ParticipantId,
        receiver_id: ParticipantId,
        candidate: &IceCandidate,
    ) -> Result<Self, NegotiationError> {
        let payload = serde_json::to_value(candidate)
            .map_err(|e| NegotiationError::MalformedPayload(e.to_string()))?;
        Ok(Self::new(
            call_id,
            sender_id,
            receiver_id,
            SignalKind::IceCandidate,
            payload,
        ))
    }

    pub fn hangup(call_id: CallId, sender_id: ParticipantId, receiver_id: ParticipantId) -> Self {
        Self::new(call_id, sender_id, receiver_id, SignalKind::Hangup, Value::Null)
    }

    /// Parse the payload of an offer/answer, checking it matches the message kind
    pub fn session_description(&self) -> Result<SessionDescription, NegotiationError> {
        let description: SessionDescription = serde_json::from_value(self.payload.clone())
            .map_err(|e| NegotiationError::MalformedPayload(e.to_string()))?;

        let consistent = match self.kind {
            SignalKind::Offer => description.sdp_type == SdpType::Offer,
            SignalKind::Answer => {
                matches!(description.sdp_type, SdpType::Answer | SdpType::Pranswer)
            }
            _ => false,
        };
        if !consistent {
            return Err(NegotiationError::MalformedPayload(format!(
                "{:?} description carried by {} message",
                description.sdp_type,
                self.kind.as_str()
            )));
        }
        if description.sdp.trim().is_empty() {
            return Err(NegotiationError::MalformedPayload(
                "empty session description".to_string(),
            ));
        }

        Ok(description)
    }

    pub fn candidate(&self) -> Result<IceCandidate, NegotiationError> {
        if self.kind != SignalKind::IceCandidate {
            return Err(NegotiationError::MalformedPayload(format!(
                "{} message does not carry a candidate",
                self.kind.as_str()
            )));
        }
        serde_json::from_value(self.payload.clone())
            .map_err(|e| NegotiationError::MalformedPayload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids() -> (CallId, ParticipantId, ParticipantId) {
        (CallId::new("c1"), ParticipantId::new("alice"), ParticipantId::new("bob"))
    }

    #[test]
    fn test_wire_row_shape() {
        let (call_id, alice, bob) = ids();
        let message =
            SignalMessage::description(call_id, alice, bob, &SessionDescription::offer("v=0"))
                .unwrap();

        let row = serde_json::to_value(&message).unwrap();
        assert_eq!(
            row,
            json!({
                "call_id": "c1",
                "sender_id": "alice",
                "receiver_id": "bob",
                "type": "offer",
                "signal": { "type": "offer", "sdp": "v=0" }
            })
        );
    }

    #[test]
    fn test_parse_browser_candidate() {
        let row = json!({
            "call_id": "c1",
            "sender_id": "bob",
            "receiver_id": "alice",
            "type": "ice_candidate",
            "signal": {
                "candidate": "candidate:1 1 udp 2122260223 192.168.1.5 54321 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0
            }
        });

        let message: SignalMessage = serde_json::from_value(row).unwrap();
        let candidate = message.candidate().unwrap();
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_mline_index, Some(0));
        assert!(candidate.username_fragment.is_none());
    }

    #[test]
    fn test_description_kind_mismatch_is_malformed() {
        let (call_id, alice, bob) = ids();
        let message = SignalMessage::new(
            call_id,
            alice,
            bob,
            SignalKind::Answer,
            json!({ "type": "offer", "sdp": "v=0" }),
        );

        assert!(matches!(
            message.session_description(),
            Err(NegotiationError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_garbage_payload_is_malformed() {
        let (call_id, alice, bob) = ids();
        let message =
            SignalMessage::new(call_id, alice, bob, SignalKind::Offer, json!("not-a-description"));

        assert!(message.session_description().is_err());
        assert!(message.candidate().is_err());
    }
}
