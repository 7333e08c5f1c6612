use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::placements::catalog::TierCatalog;
use crate::workflows::placements::domain::{
    CandidateId, CandidateRecord, CompensationTier, PostingEligibilityCriteria, PostingId,
    PostingSnapshot, TierId,
};
use crate::workflows::placements::quota::{Clock, LedgerKey, QuotaTracker, ReservationTokenId};
use crate::workflows::placements::repository::{
    AttemptRecord, AttemptRepository, InMemoryAttemptRepository, RepositoryError,
};
use crate::workflows::placements::router::placement_router;
use crate::workflows::placements::service::{GateSettings, PlacementApplicationService};
use crate::workflows::placements::AttemptId;

pub(super) fn tier(
    id: &str,
    label: &str,
    lower: u64,
    upper: Option<u64>,
    cap: u32,
) -> CompensationTier {
    CompensationTier {
        id: TierId(id.to_string()),
        label: label.to_string(),
        lower_bound: lower,
        upper_bound: upper,
        application_cap: cap,
    }
}

pub(super) fn catalog() -> TierCatalog {
    TierCatalog::try_new(vec![
        tier("tier-1", "Tier I", 0, Some(500_000), 8),
        tier("tier-2", "Tier II", 500_000, Some(1_000_000), 15),
        tier("tier-3", "Tier III", 1_000_000, None, 3),
    ])
    .expect("valid test catalog")
}

pub(super) fn candidate(suffix: &str) -> CandidateRecord {
    CandidateRecord {
        id: CandidateId(format!("cand-{suffix}")),
        cumulative_grade: 7.2,
        department: "CSE".to_string(),
        backlog_count: 0,
        graduation_year: 2026,
    }
}

pub(super) fn criteria() -> PostingEligibilityCriteria {
    PostingEligibilityCriteria {
        minimum_grade: 7.0,
        allowed_departments: BTreeSet::from(["CSE".to_string(), "ECE".to_string()]),
        max_backlogs: 2,
        allowed_graduation_years: BTreeSet::new(),
    }
}

pub(super) fn wildcard_criteria() -> PostingEligibilityCriteria {
    PostingEligibilityCriteria {
        minimum_grade: 0.0,
        allowed_departments: BTreeSet::new(),
        max_backlogs: u32::MAX,
        allowed_graduation_years: BTreeSet::new(),
    }
}

pub(super) fn posting(suffix: &str, compensation_value: u64) -> PostingSnapshot {
    PostingSnapshot {
        posting_id: PostingId(format!("post-{suffix}")),
        compensation_value,
        criteria: criteria(),
    }
}

pub(super) fn key(candidate_id: &str, tier_id: &str) -> LedgerKey {
    LedgerKey {
        candidate_id: CandidateId(candidate_id.to_string()),
        tier_id: TierId(tier_id.to_string()),
    }
}

pub(super) fn tracker() -> QuotaTracker {
    QuotaTracker::new(Duration::minutes(15))
}

pub(super) fn tracker_with_clock(clock: ManualClock, ttl: Duration) -> QuotaTracker {
    QuotaTracker::with_clock(ttl, Arc::new(clock))
}

pub(super) fn build_service() -> (
    PlacementApplicationService<InMemoryAttemptRepository>,
    Arc<InMemoryAttemptRepository>,
) {
    build_service_with_catalog(catalog())
}

pub(super) fn build_service_with_catalog(
    catalog: TierCatalog,
) -> (
    PlacementApplicationService<InMemoryAttemptRepository>,
    Arc<InMemoryAttemptRepository>,
) {
    let repository = Arc::new(InMemoryAttemptRepository::default());
    let service =
        PlacementApplicationService::new(repository.clone(), catalog, GateSettings::default());
    (service, repository)
}

pub(super) fn build_service_with_clock(
    clock: ManualClock,
    ttl: Duration,
) -> (
    PlacementApplicationService<InMemoryAttemptRepository>,
    Arc<InMemoryAttemptRepository>,
) {
    let repository = Arc::new(InMemoryAttemptRepository::default());
    let service = PlacementApplicationService::with_clock(
        repository.clone(),
        catalog(),
        GateSettings {
            reservation_ttl: ttl,
        },
        Arc::new(clock),
    );
    (service, repository)
}

pub(super) fn router_with_service(
    service: PlacementApplicationService<InMemoryAttemptRepository>,
) -> axum::Router {
    placement_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Test clock advanced by hand so expiry paths are deterministic.
#[derive(Clone)]
pub(super) struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub(super) fn at_start() -> Self {
        let start = Utc
            .with_ymd_and_hms(2026, 7, 1, 9, 0, 0)
            .single()
            .expect("valid start instant");
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub(super) fn advance(&self, delta: Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard = *guard + delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

/// Attempt store that fails every call, for propagation tests.
pub(super) struct UnavailableAttemptStore;

impl AttemptRepository for UnavailableAttemptStore {
    fn insert(&self, _record: AttemptRecord) -> Result<AttemptRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("attempt store offline".to_string()))
    }

    fn update(&self, _record: AttemptRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("attempt store offline".to_string()))
    }

    fn fetch(&self, _id: &AttemptId) -> Result<Option<AttemptRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("attempt store offline".to_string()))
    }

    fn find_by_token(
        &self,
        _token_id: &ReservationTokenId,
    ) -> Result<Option<AttemptRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("attempt store offline".to_string()))
    }

    fn recent(&self, _limit: usize) -> Result<Vec<AttemptRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("attempt store offline".to_string()))
    }
}
