use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{AttemptId, AttemptPhase, CandidateId, PostingId, TierId};
use super::quota::ReservationTokenId;

/// Audit record for one pass through the application gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_id: AttemptId,
    pub candidate_id: CandidateId,
    pub posting_id: PostingId,
    pub resolved_tier: Option<TierId>,
    pub phase: AttemptPhase,
    pub token_id: Option<ReservationTokenId>,
    pub recorded_at: DateTime<Utc>,
    pub detail: String,
}

impl AttemptRecord {
    pub fn status_view(&self) -> AttemptStatusView {
        AttemptStatusView {
            attempt_id: self.attempt_id.clone(),
            phase: self.phase.label(),
            resolved_tier: self.resolved_tier.clone(),
            detail: self.detail.clone(),
        }
    }
}

/// Storage port so the gate can be exercised without a concrete database.
pub trait AttemptRepository: Send + Sync {
    fn insert(&self, record: AttemptRecord) -> Result<AttemptRecord, RepositoryError>;
    fn update(&self, record: AttemptRecord) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &AttemptId) -> Result<Option<AttemptRecord>, RepositoryError>;
    fn find_by_token(
        &self,
        token_id: &ReservationTokenId,
    ) -> Result<Option<AttemptRecord>, RepositoryError>;
    fn recent(&self, limit: usize) -> Result<Vec<AttemptRecord>, RepositoryError>;
}

/// Error enumeration for attempt-store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("attempt already recorded")]
    Conflict,
    #[error("attempt not found")]
    NotFound,
    #[error("attempt store unavailable: {0}")]
    Unavailable(String),
}

/// Sanitized attempt representation for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptStatusView {
    pub attempt_id: AttemptId,
    pub phase: &'static str,
    pub resolved_tier: Option<TierId>,
    pub detail: String,
}

/// In-process store backing the default binary and the test suites.
#[derive(Default, Clone)]
pub struct InMemoryAttemptRepository {
    records: Arc<Mutex<HashMap<AttemptId, AttemptRecord>>>,
}

impl AttemptRepository for InMemoryAttemptRepository {
    fn insert(&self, record: AttemptRecord) -> Result<AttemptRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("attempt store mutex poisoned");
        if guard.contains_key(&record.attempt_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.attempt_id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: AttemptRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("attempt store mutex poisoned");
        if guard.contains_key(&record.attempt_id) {
            guard.insert(record.attempt_id.clone(), record);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &AttemptId) -> Result<Option<AttemptRecord>, RepositoryError> {
        let guard = self.records.lock().expect("attempt store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_token(
        &self,
        token_id: &ReservationTokenId,
    ) -> Result<Option<AttemptRecord>, RepositoryError> {
        let guard = self.records.lock().expect("attempt store mutex poisoned");
        Ok(guard
            .values()
            .find(|record| record.token_id.as_ref() == Some(token_id))
            .cloned())
    }

    fn recent(&self, limit: usize) -> Result<Vec<AttemptRecord>, RepositoryError> {
        let guard = self.records.lock().expect("attempt store mutex poisoned");
        let mut records: Vec<AttemptRecord> = guard.values().cloned().collect();
        records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        records.truncate(limit);
        Ok(records)
    }
}
