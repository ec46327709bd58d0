//! Call value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the offer/answer exchange a participant plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallRole {
    /// Initiated the call; always sends the first offer
    Caller,
    /// Accepted the call; waits for the caller's offer
    Callee,
}

/// Native connection state as reported by the peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: &ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, new_state) {
            (New, Connecting) => true,
            (New, Connected) => true,

            (Connecting, Connected) => true,

            (Connected, Disconnected) => true,

            // Disconnected may recover
            (Disconnected, Connecting) => true,
            (Disconnected, Connected) => true,

            (Failed, _) | (Closed, _) => false,
            (_, Failed) | (_, Closed) => true,

            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }

    /// Whether entering this state ends the call
    ///
    /// `disconnected` and `failed` end it; so does `closed`, which only
    /// arrives here when the native stack shut the connection on its own.
    pub fn ends_call(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed | ConnectionState::Closed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Offer/answer negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    Idle,
    /// Creating and publishing the local offer
    Offering,
    AwaitingAnswer,
    /// Answering a remote offer
    Answering,
    Negotiated,
    /// Answering a remote offer on an already negotiated connection
    Renegotiating,
}

impl NegotiationState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: &NegotiationState) -> bool {
        use NegotiationState::*;

        matches!(
            (self, new_state),
            (Idle, Offering)
                | (Idle, Answering)
                | (Offering, AwaitingAnswer)
                | (AwaitingAnswer, Negotiated)
                | (Answering, Negotiated)
                | (Negotiated, Renegotiating)
                | (Renegotiating, Negotiated)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationState::Idle => "idle",
            NegotiationState::Offering => "offering",
            NegotiationState::AwaitingAnswer => "awaiting_answer",
            NegotiationState::Answering => "answering",
            NegotiationState::Negotiated => "negotiated",
            NegotiationState::Renegotiating => "renegotiating",
        }
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a call session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// `end_call()` on the handle
    LocalHangup,
    /// Every handle was dropped while the call was live
    Unmounted,
    /// Remote participant sent a hangup signal
    RemoteHangup,
    /// Connection monitor saw a call-ending state
    ConnectionLost(ConnectionState),
    /// No connection before the negotiation deadline
    NegotiationTimeout,
}
