//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Repository implementations (in-memory, PostgreSQL)
//! - The native WebRTC connection factory
//! - Signaling relay clients (in-memory, WebSocket)
//! - Simulated capture devices

pub mod media;
pub mod persistence;
pub mod protocols;
pub mod signaling;
