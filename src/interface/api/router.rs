//! API Router configuration

use super::dto::ApiResponse;
use super::history_handler::{get_call_history, list_participant_history};
use super::metrics_handler::metrics_handler;
use super::relay::{relay_ws_handler, RelayHub};
use crate::domain::history::CallHistoryRepository;
use axum::{routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared API state
#[derive(Clone)]
pub struct AppState {
    pub history: Arc<dyn CallHistoryRepository>,
}

/// Health check
pub async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("OK"))
}

/// Build the API router
///
/// `/metrics` is only mounted when a Prometheus handle is given.
pub fn build_router(
    state: AppState,
    relay_hub: Arc<RelayHub>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Router {
    // Health check route
    let health_routes = Router::new().route("/health", get(health_check));

    // Call history routes
    let history_routes = Router::new()
        .route("/call-history/:id", get(get_call_history))
        .route(
            "/call-history/participant/:participant_id",
            get(list_participant_history),
        );

    // Relay route (separate state)
    let relay_routes = Router::new()
        .route("/relay/:channel", get(relay_ws_handler))
        .with_state(relay_hub);

    let mut router = Router::new()
        .merge(health_routes)
        .merge(history_routes)
        .with_state(state)
        .merge(relay_routes);

    // Metrics route (separate state)
    if let Some(handle) = prometheus_handle {
        router = router.merge(
            Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(handle),
        );
    }

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
