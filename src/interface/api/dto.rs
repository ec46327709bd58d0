//! API DTOs

use crate::domain::history::CallHistoryRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Call history response
#[derive(Debug, Serialize, Deserialize)]
pub struct CallHistoryResponse {
    pub id: Uuid,
    pub caller_id: String,
    pub receiver_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub status: String,
}

impl From<CallHistoryRecord> for CallHistoryResponse {
    fn from(record: CallHistoryRecord) -> Self {
        CallHistoryResponse {
            id: record.id.as_uuid(),
            duration_seconds: record.duration_seconds(),
            caller_id: record.caller_id.as_str().to_string(),
            receiver_id: record.receiver_id.as_str().to_string(),
            start_time: record.start_time,
            end_time: record.end_time,
            status: record.status.as_str().to_string(),
        }
    }
}

/// Generic API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}
