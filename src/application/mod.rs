//! Application layer - Call orchestration
//!
//! This layer drives the domain ports to fulfill a call:
//! - Starting one session task per call
//! - Negotiating and monitoring the peer connection
//! - Finalizing the history record on every exit path

pub mod metrics;
pub mod orchestrator;
pub(crate) mod session;

pub use orchestrator::{
    CallEndedCallback, CallHandle, CallOrchestrator, CallOutcome, CallSettings, CallView,
    StartCall,
};
