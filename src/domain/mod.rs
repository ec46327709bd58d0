//! Domain layer - Core call rules and the ports the orchestrator drives
//!
//! This layer contains:
//! - Value Objects: identifiers, connection and negotiation states
//! - Entities: the call session and its history record
//! - Ports: media gate, connection factory, signaling relay, history repository

pub mod call;
pub mod connection;
pub mod history;
pub mod media;
pub mod relay;
pub mod shared;

// Re-export commonly used types
pub use shared::DomainError;
