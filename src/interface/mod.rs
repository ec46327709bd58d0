//! Interface layer - External interfaces
//!
//! This layer handles:
//! - REST API endpoints for call history
//! - The WebSocket signaling relay
//! - Prometheus metrics export

pub mod api;
