//! API interface implementations

pub mod dto;
pub mod history_handler;
pub mod metrics_handler;
pub mod relay;
pub mod router;

pub use metrics_handler::init_metrics;
pub use relay::RelayHub;
pub use router::{build_router, AppState};
