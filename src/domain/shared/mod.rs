//! Shared kernel - Identifiers and errors used across the call domain

pub mod error;
pub mod value_objects;

pub use error::DomainError;
pub use value_objects::*;
