//! PitchLink - Call signaling and connection lifecycle for matched participants
//!
//! This is a Domain-Driven Design (DDD) implementation of a two-party
//! WebRTC call orchestrator: media capture, peer connection negotiation over
//! a signaling relay, connection monitoring and durable call history.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use application::{CallHandle, CallOrchestrator, CallOutcome, CallSettings, CallView, StartCall};
pub use domain::shared::error::DomainError;
