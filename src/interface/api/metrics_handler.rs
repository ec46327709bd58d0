//! Prometheus metrics handler

use crate::application::metrics as call_metrics;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and describe the call metrics
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    call_metrics::describe();
    Ok(handle)
}

/// HTTP metrics handler
pub async fn metrics_handler(State(prometheus_handle): State<PrometheusHandle>) -> Response {
    let metrics = prometheus_handle.render();
    (StatusCode::OK, metrics).into_response()
}
