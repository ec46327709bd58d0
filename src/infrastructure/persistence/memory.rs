//! In-memory call history repository

use crate::domain::history::{CallHistoryRecord, CallHistoryRepository, HistoryError};
use crate::domain::shared::value_objects::{HistoryRecordId, ParticipantId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Call history kept in process memory
#[derive(Clone, Default)]
pub struct InMemoryCallHistoryRepository {
    records: Arc<RwLock<HashMap<HistoryRecordId, CallHistoryRecord>>>,
    /// Number of successful updates per record
    updates: Arc<RwLock<HashMap<HistoryRecordId, usize>>>,
}

impl InMemoryCallHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record, oldest first
    pub async fn all(&self) -> Vec<CallHistoryRecord> {
        let records = self.records.read().await;
        let mut all: Vec<CallHistoryRecord> = records.values().cloned().collect();
        all.sort_by_key(|record| record.start_time);
        all
    }

    /// How many times the record was updated
    pub async fn update_count(&self, id: HistoryRecordId) -> usize {
        self.updates.read().await.get(&id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl CallHistoryRepository for InMemoryCallHistoryRepository {
    async fn insert(&self, record: &CallHistoryRecord) -> Result<(), HistoryError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(HistoryError::Storage(format!(
                "Call history record {} already exists",
                record.id
            )));
        }
        records.insert(record.id, record.clone());
        debug!("Inserted call history record {}", record.id);
        Ok(())
    }

    async fn update(&self, record: &CallHistoryRecord) -> Result<bool, HistoryError> {
        let mut records = self.records.write().await;
        let existing = records
            .get_mut(&record.id)
            .ok_or(HistoryError::NotFound(record.id))?;
        if existing.is_finalized() {
            debug!("Call history record {} already has an end time", record.id);
            return Ok(false);
        }

        *existing = record.clone();
        *self.updates.write().await.entry(record.id).or_insert(0) += 1;
        debug!("Updated call history record {}", record.id);
        Ok(true)
    }

    async fn get(&self, id: HistoryRecordId) -> Result<Option<CallHistoryRecord>, HistoryError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list_for_participant(
        &self,
        participant_id: &ParticipantId,
        limit: i64,
    ) -> Result<Vec<CallHistoryRecord>, HistoryError> {
        let records = self.records.read().await;
        let mut matching: Vec<CallHistoryRecord> = records
            .values()
            .filter(|record| {
                &record.caller_id == participant_id || &record.receiver_id == participant_id
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::history::{CallHistoryRecorder, CallStatus};

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = InMemoryCallHistoryRepository::new();
        let record = CallHistoryRecord::new(ParticipantId::new("alice"), ParticipantId::new("bob"));

        repo.insert(&record).await.unwrap();
        assert_eq!(repo.get(record.id).await.unwrap(), Some(record.clone()));
        assert!(repo.insert(&record).await.is_err());
    }

    #[tokio::test]
    async fn test_update_unknown_record() {
        let repo = InMemoryCallHistoryRepository::new();
        let record = CallHistoryRecord::new(ParticipantId::new("alice"), ParticipantId::new("bob"));

        assert_eq!(
            repo.update(&record).await,
            Err(HistoryError::NotFound(record.id))
        );
    }

    #[tokio::test]
    async fn test_update_skips_finalized_record() {
        let repo = InMemoryCallHistoryRepository::new();
        let pending = CallHistoryRecord::new(ParticipantId::new("alice"), ParticipantId::new("bob"));
        repo.insert(&pending).await.unwrap();

        let mut completed = pending.clone();
        completed.finalize(CallStatus::Completed).unwrap();
        let mut failed = pending.clone();
        failed.finalize(CallStatus::Failed).unwrap();

        assert!(repo.update(&completed).await.unwrap());
        assert!(!repo.update(&failed).await.unwrap());
        assert_eq!(repo.get(pending.id).await.unwrap().unwrap().status, CallStatus::Completed);
    }

    #[tokio::test]
    async fn test_list_for_participant() {
        let repo = InMemoryCallHistoryRepository::new();
        for (caller, receiver) in [("alice", "bob"), ("carol", "alice"), ("bob", "carol")] {
            let record = CallHistoryRecord::new(ParticipantId::new(caller), ParticipantId::new(receiver));
            repo.insert(&record).await.unwrap();
        }

        let alice = ParticipantId::new("alice");
        assert_eq!(repo.list_for_participant(&alice, 10).await.unwrap().len(), 2);
        assert_eq!(repo.list_for_participant(&alice, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recorder_finalizes_once() {
        let repo = Arc::new(InMemoryCallHistoryRepository::new());
        let recorder = CallHistoryRecorder::new(repo.clone());

        let id = recorder
            .start(&ParticipantId::new("alice"), &ParticipantId::new("bob"))
            .await
            .unwrap();
        assert!(recorder.finish(id, CallStatus::Completed).await.unwrap());
        assert!(!recorder.finish(id, CallStatus::Failed).await.unwrap());

        let record = repo.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, CallStatus::Completed);
        assert!(record.end_time.is_some());
        assert_eq!(repo.update_count(id).await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_finish_writes_once() {
        let repo = Arc::new(InMemoryCallHistoryRepository::new());
        let recorder = CallHistoryRecorder::new(repo.clone());
        let id = recorder
            .start(&ParticipantId::new("alice"), &ParticipantId::new("bob"))
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            recorder.finish(id, CallStatus::Completed),
            recorder.finish(id, CallStatus::Failed)
        );
        let applied = [first.unwrap(), second.unwrap()];
        assert_eq!(applied.iter().filter(|applied| **applied).count(), 1);
        assert_eq!(repo.update_count(id).await, 1);

        let record = repo.get(id).await.unwrap().unwrap();
        let winner = if applied[0] { CallStatus::Completed } else { CallStatus::Failed };
        assert_eq!(record.status, winner);
    }
}
