//! Call bounded context - signaling and lifecycle of one participant's side of a call

pub mod error;
pub mod session;
pub mod signal;
pub mod value_object;

pub use error::{CallError, ConnectionError, MediaError, NegotiationError, TransportError};
pub use session::CallSession;
pub use signal::{IceCandidate, SdpType, SessionDescription, SignalKind, SignalMessage};
pub use value_object::{CallRole, ConnectionState, EndReason, NegotiationState};
