//! PostgreSQL implementation of the call history repository

use crate::domain::history::{CallHistoryRecord, CallHistoryRepository, CallStatus, HistoryError};
use crate::domain::shared::value_objects::{HistoryRecordId, ParticipantId};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tracing::{debug, error};
use uuid::Uuid;

#[derive(FromRow)]
struct CallHistoryRow {
    id: Uuid,
    caller_id: String,
    receiver_id: String,
    start_time: chrono::DateTime<chrono::Utc>,
    end_time: Option<chrono::DateTime<chrono::Utc>>,
    status: String,
}

impl From<CallHistoryRow> for CallHistoryRecord {
    fn from(r: CallHistoryRow) -> Self {
        CallHistoryRecord {
            id: HistoryRecordId::from_uuid(r.id),
            caller_id: ParticipantId::new(r.caller_id),
            receiver_id: ParticipantId::new(r.receiver_id),
            start_time: r.start_time,
            end_time: r.end_time,
            status: CallStatus::from_str(&r.status).unwrap_or(CallStatus::Failed),
        }
    }
}

fn storage_error(context: &str, e: sqlx::Error) -> HistoryError {
    error!("{}: {}", context, e);
    HistoryError::Storage(format!("Database error: {}", e))
}

pub struct PgCallHistoryRepository {
    pool: PgPool,
}

impl PgCallHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallHistoryRepository for PgCallHistoryRepository {
    async fn insert(&self, record: &CallHistoryRecord) -> Result<(), HistoryError> {
        debug!("Creating call history record: {}", record.id);

        sqlx::query(
            r#"
            INSERT INTO call_history (id, caller_id, receiver_id, start_time, end_time, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.caller_id.as_str())
        .bind(record.receiver_id.as_str())
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to create call history record", e))?;

        debug!("Call history record created: {}", record.id);
        Ok(())
    }

    async fn update(&self, record: &CallHistoryRecord) -> Result<bool, HistoryError> {
        debug!("Updating call history record: {}", record.id);

        let result = sqlx::query(
            r#"
            UPDATE call_history
            SET end_time = $2, status = $3
            WHERE id = $1 AND end_time IS NULL
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.end_time)
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to update call history record", e))?;

        if result.rows_affected() == 1 {
            debug!("Call history record updated: {}", record.id);
            return Ok(true);
        }

        // Nothing matched: either the row is gone or it already has an end time
        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM call_history WHERE id = $1")
            .bind(record.id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to check call history record", e))?;

        match exists {
            Some(_) => {
                debug!("Call history record {} already has an end time", record.id);
                Ok(false)
            }
            None => Err(HistoryError::NotFound(record.id)),
        }
    }

    async fn get(&self, id: HistoryRecordId) -> Result<Option<CallHistoryRecord>, HistoryError> {
        debug!("Getting call history record: {}", id);

        let row = sqlx::query_as::<_, CallHistoryRow>(
            r#"
            SELECT id, caller_id, receiver_id, start_time, end_time, status
            FROM call_history
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to get call history record", e))?;

        Ok(row.map(CallHistoryRecord::from))
    }

    async fn list_for_participant(
        &self,
        participant_id: &ParticipantId,
        limit: i64,
    ) -> Result<Vec<CallHistoryRecord>, HistoryError> {
        debug!("Listing call history for participant: {}", participant_id);

        let rows = sqlx::query_as::<_, CallHistoryRow>(
            r#"
            SELECT id, caller_id, receiver_id, start_time, end_time, status
            FROM call_history
            WHERE caller_id = $1 OR receiver_id = $1
            ORDER BY start_time DESC
            LIMIT $2
            "#,
        )
        .bind(participant_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list call history", e))?;

        Ok(rows.into_iter().map(CallHistoryRecord::from).collect())
    }
}
