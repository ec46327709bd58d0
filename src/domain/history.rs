//! Call history
//!
//! One record per call session: inserted when the session starts, finalized
//! exactly once when it ends, whichever exit path gets there first.

use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::{HistoryRecordId, ParticipantId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Provisional value until the call ends
    Pending,
    Completed,
    Missed,
    Failed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::Completed => "completed",
            CallStatus::Missed => "missed",
            CallStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CallStatus::Pending),
            "completed" => Some(CallStatus::Completed),
            "missed" => Some(CallStatus::Missed),
            "failed" => Some(CallStatus::Failed),
            _ => None,
        }
    }
}

/// Durable record of a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallHistoryRecord {
    pub id: HistoryRecordId,
    pub caller_id: ParticipantId,
    pub receiver_id: ParticipantId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: CallStatus,
}

impl CallHistoryRecord {
    /// Create a new record for a call that is starting
    pub fn new(caller_id: ParticipantId, receiver_id: ParticipantId) -> Self {
        Self {
            id: HistoryRecordId::new(),
            caller_id,
            receiver_id,
            start_time: Utc::now(),
            end_time: None,
            status: CallStatus::Pending,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }

    /// Mark the call as ended
    pub fn finalize(&mut self, status: CallStatus) -> Result<(), DomainError> {
        if self.is_finalized() {
            return Err(DomainError::InvalidOperation(format!(
                "Call history record {} already finalized",
                self.id
            )));
        }
        if status == CallStatus::Pending {
            return Err(DomainError::ValidationError(
                "Cannot finalize a call as pending".to_string(),
            ));
        }

        self.end_time = Some(Utc::now());
        self.status = status;
        Ok(())
    }

    /// Seconds between start and end, once finalized
    pub fn duration_seconds(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_seconds())
    }
}

/// Persistence errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("Call history record not found: {0}")]
    NotFound(HistoryRecordId),

    #[error("Invalid call history update: {0}")]
    Invalid(#[from] DomainError),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Call history repository trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallHistoryRepository: Send + Sync {
    /// Insert a new record
    async fn insert(&self, record: &CallHistoryRecord) -> Result<(), HistoryError>;

    /// Write end time and status of an existing record
    ///
    /// Applies only while the stored record has no end time; returns
    /// `Ok(false)` when another writer finalized it first.
    async fn update(&self, record: &CallHistoryRecord) -> Result<bool, HistoryError>;

    /// Get record by id
    async fn get(&self, id: HistoryRecordId) -> Result<Option<CallHistoryRecord>, HistoryError>;

    /// Most recent records where the participant was caller or receiver
    async fn list_for_participant(
        &self,
        participant_id: &ParticipantId,
        limit: i64,
    ) -> Result<Vec<CallHistoryRecord>, HistoryError>;
}

/// Creates and finalizes history records
#[derive(Clone)]
pub struct CallHistoryRecorder {
    repository: Arc<dyn CallHistoryRepository>,
}

impl CallHistoryRecorder {
    pub fn new(repository: Arc<dyn CallHistoryRepository>) -> Self {
        Self { repository }
    }

    /// Insert a record with no end time
    pub async fn start(
        &self,
        caller_id: &ParticipantId,
        receiver_id: &ParticipantId,
    ) -> Result<HistoryRecordId, HistoryError> {
        let record = CallHistoryRecord::new(caller_id.clone(), receiver_id.clone());
        self.repository.insert(&record).await?;

        info!("Call history record {} started: {} -> {}", record.id, caller_id, receiver_id);
        Ok(record.id)
    }

    /// Set end time and status
    ///
    /// Returns `Ok(false)` without touching storage when the record already
    /// has an end time.
    pub async fn finish(&self, id: HistoryRecordId, status: CallStatus) -> Result<bool, HistoryError> {
        let mut record = self
            .repository
            .get(id)
            .await?
            .ok_or(HistoryError::NotFound(id))?;

        if record.is_finalized() {
            debug!("Call history record {} already finalized as {}", id, record.status.as_str());
            return Ok(false);
        }

        record.finalize(status)?;
        if !self.repository.update(&record).await? {
            debug!("Call history record {} finalized concurrently", id);
            return Ok(false);
        }

        info!("Call history record {} finalized as {}", id, status.as_str());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    fn record() -> CallHistoryRecord {
        CallHistoryRecord::new(ParticipantId::new("alice"), ParticipantId::new("bob"))
    }

    #[test]
    fn test_record_finalize_once() {
        let mut record = record();
        assert_eq!(record.status, CallStatus::Pending);
        assert!(record.duration_seconds().is_none());

        record.finalize(CallStatus::Completed).unwrap();
        assert!(record.is_finalized());
        assert_eq!(record.status, CallStatus::Completed);
        assert!(record.duration_seconds().unwrap() >= 0);

        assert!(record.finalize(CallStatus::Failed).is_err());
        assert_eq!(record.status, CallStatus::Completed);
    }

    #[test]
    fn test_cannot_finalize_as_pending() {
        let mut record = record();
        assert!(record.finalize(CallStatus::Pending).is_err());
        assert!(!record.is_finalized());
    }

    #[test]
    fn test_status_round_trip_names() {
        for status in [
            CallStatus::Pending,
            CallStatus::Completed,
            CallStatus::Missed,
            CallStatus::Failed,
        ] {
            assert_eq!(CallStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(CallStatus::from_str("busy"), None);
    }

    #[tokio::test]
    async fn test_recorder_start_inserts_pending_record() {
        let mut repository = MockCallHistoryRepository::new();
        repository
            .expect_insert()
            .withf(|record| {
                record.caller_id.as_str() == "alice"
                    && record.receiver_id.as_str() == "bob"
                    && record.status == CallStatus::Pending
                    && record.end_time.is_none()
            })
            .times(1)
            .returning(|_| Ok(()));

        let recorder = CallHistoryRecorder::new(Arc::new(repository));
        recorder
            .start(&ParticipantId::new("alice"), &ParticipantId::new("bob"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recorder_finish_updates_once() {
        let pending = record();
        let id = pending.id;

        let mut repository = MockCallHistoryRepository::new();
        repository
            .expect_get()
            .with(eq(id))
            .times(1)
            .returning(move |_| Ok(Some(pending.clone())));
        repository
            .expect_update()
            .withf(|record| record.status == CallStatus::Completed && record.end_time.is_some())
            .times(1)
            .returning(|_| Ok(true));

        let recorder = CallHistoryRecorder::new(Arc::new(repository));
        assert!(recorder.finish(id, CallStatus::Completed).await.unwrap());
    }

    #[tokio::test]
    async fn test_recorder_finish_is_noop_when_already_finalized() {
        let mut finalized = record();
        finalized.finalize(CallStatus::Completed).unwrap();
        let id = finalized.id;

        let mut repository = MockCallHistoryRepository::new();
        repository
            .expect_get()
            .returning(move |_| Ok(Some(finalized.clone())));
        repository.expect_update().never();

        let recorder = CallHistoryRecorder::new(Arc::new(repository));
        assert!(!recorder.finish(id, CallStatus::Failed).await.unwrap());
    }

    #[tokio::test]
    async fn test_recorder_finish_loses_race_to_other_finalizer() {
        let pending = record();
        let id = pending.id;

        let mut repository = MockCallHistoryRepository::new();
        repository
            .expect_get()
            .returning(move |_| Ok(Some(pending.clone())));
        repository.expect_update().times(1).returning(|_| Ok(false));

        let recorder = CallHistoryRecorder::new(Arc::new(repository));
        assert!(!recorder.finish(id, CallStatus::Missed).await.unwrap());
    }

    #[tokio::test]
    async fn test_recorder_finish_unknown_record() {
        let mut repository = MockCallHistoryRepository::new();
        repository.expect_get().returning(|_| Ok(None));

        let recorder = CallHistoryRecorder::new(Arc::new(repository));
        let id = HistoryRecordId::new();
        assert_eq!(
            recorder.finish(id, CallStatus::Failed).await,
            Err(HistoryError::NotFound(id))
        );
    }
}
