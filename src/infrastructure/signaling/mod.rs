//! Signaling relay implementations

pub mod memory;
pub mod websocket;

pub use memory::InMemoryRelay;
pub use websocket::WebSocketRelay;
