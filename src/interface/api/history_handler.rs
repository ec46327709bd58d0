//! Call history API handlers

use super::dto::{ApiResponse, CallHistoryResponse};
use super::router::AppState;
use crate::domain::shared::value_objects::{HistoryRecordId, ParticipantId};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

/// Query parameters for listing call history
#[derive(Debug, Deserialize)]
pub struct ListHistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// Get call history record by ID
pub async fn get_call_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CallHistoryResponse>>, StatusCode> {
    info!("API: Getting call history record: {}", id);

    match state.history.get(HistoryRecordId::from_uuid(id)).await {
        Ok(Some(record)) => Ok(Json(ApiResponse::success(record.into()))),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("API: Failed to get call history record: {}", e);
            Ok(Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// List a participant's most recent calls
pub async fn list_participant_history(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
    Query(query): Query<ListHistoryQuery>,
) -> Result<Json<ApiResponse<Vec<CallHistoryResponse>>>, StatusCode> {
    info!(
        "API: Listing call history for {} (limit: {})",
        participant_id, query.limit
    );

    if query.limit <= 0 {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state
        .history
        .list_for_participant(&ParticipantId::new(participant_id), query.limit)
        .await
    {
        Ok(records) => Ok(Json(ApiResponse::success(
            records.into_iter().map(CallHistoryResponse::from).collect(),
        ))),
        Err(e) => {
            error!("API: Failed to list call history: {}", e);
            Ok(Json(ApiResponse::error(e.to_string())))
        }
    }
}
