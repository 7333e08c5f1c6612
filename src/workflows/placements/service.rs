use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Duration;
use serde::Serialize;
use tracing::{info, warn};

use super::catalog::TierCatalog;
use super::domain::{
    AttemptId, AttemptPhase, CandidateId, CandidateRecord, CompensationTier, PostingSnapshot,
    TierId,
};
use super::eligibility::{EligibilityEvaluator, EligibilityOutcome, EligibilityViolation};
use super::migration::{self, MigrationReport, TierMigrationError};
use super::quota::{
    Clock, CommitOutcome, ExpiredReservation, LedgerKey, QuotaExceeded, QuotaStatus, QuotaTracker,
    ReleaseOutcome, ReservationToken, SystemClock,
};
use super::repository::{AttemptRecord, AttemptRepository, RepositoryError};

/// Knobs governing reservation lifetimes at the gate.
#[derive(Debug, Clone, Copy)]
pub struct GateSettings {
    /// How long an uncommitted hold stays valid before it is reclaimed.
    pub reservation_ttl: Duration,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::minutes(15),
        }
    }
}

/// Service composing the tier catalog, eligibility evaluator, and quota
/// ledger behind a single application entry point.
///
/// Gate operations take the shared side of the state lock, so attempts on
/// distinct ledger keys run in parallel; replacing the catalog takes the
/// exclusive side and swaps catalog plus migrated ledger as one unit.
pub struct PlacementApplicationService<R> {
    state: RwLock<EngineState>,
    evaluator: EligibilityEvaluator,
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
}

struct EngineState {
    catalog: Arc<TierCatalog>,
    quota: QuotaTracker,
}

static ATTEMPT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_attempt_id() -> AttemptId {
    let id = ATTEMPT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    AttemptId(format!("attempt-{id:06}"))
}

impl<R> PlacementApplicationService<R>
where
    R: AttemptRepository + 'static,
{
    pub fn new(repository: Arc<R>, catalog: TierCatalog, settings: GateSettings) -> Self {
        Self::with_clock(repository, catalog, settings, Arc::new(SystemClock))
    }

    pub(crate) fn with_clock(
        repository: Arc<R>,
        catalog: TierCatalog,
        settings: GateSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let quota = QuotaTracker::with_clock(settings.reservation_ttl, Arc::clone(&clock));
        Self {
            state: RwLock::new(EngineState {
                catalog: Arc::new(catalog),
                quota,
            }),
            evaluator: EligibilityEvaluator,
            repository,
            clock,
        }
    }

    /// Run one application attempt through the gate: resolve the tier,
    /// evaluate eligibility, then reserve quota. Rejections come back as
    /// tagged outcomes with the quota ledger untouched.
    pub fn attempt_apply(
        &self,
        candidate: &CandidateRecord,
        posting: &PostingSnapshot,
    ) -> Result<ApplicationOutcome, PlacementServiceError> {
        let state = self.state.read().expect("engine state lock poisoned");
        let now = self.clock.now();

        let mut record = AttemptRecord {
            attempt_id: next_attempt_id(),
            candidate_id: candidate.id.clone(),
            posting_id: posting.posting_id.clone(),
            resolved_tier: None,
            phase: AttemptPhase::Initiated,
            token_id: None,
            recorded_at: now,
            detail: "application received".to_string(),
        };
        self.repository.insert(record.clone())?;

        let Some(tier) = state.catalog.resolve(posting.compensation_value) else {
            warn!(
                posting = %posting.posting_id,
                compensation = posting.compensation_value,
                "posting does not map to any configured tier"
            );
            record.phase = AttemptPhase::RejectedConfiguration;
            record.detail = format!(
                "no tier covers compensation value {}",
                posting.compensation_value
            );
            self.repository.update(record)?;
            return Ok(ApplicationOutcome::RejectedConfiguration {
                compensation_value: posting.compensation_value,
            });
        };
        record.resolved_tier = Some(tier.id.clone());

        match self.evaluator.evaluate(candidate, &posting.criteria) {
            EligibilityOutcome::Ineligible { violations } => {
                record.phase = AttemptPhase::RejectedEligibility;
                record.detail = violations
                    .iter()
                    .map(EligibilityViolation::summary)
                    .collect::<Vec<_>>()
                    .join("; ");
                self.repository.update(record)?;
                info!(
                    candidate = %candidate.id,
                    posting = %posting.posting_id,
                    "application rejected on eligibility"
                );
                return Ok(ApplicationOutcome::RejectedEligibility { violations });
            }
            EligibilityOutcome::Eligible => {
                record.phase = AttemptPhase::EligibilityChecked;
            }
        }

        let key = LedgerKey {
            candidate_id: candidate.id.clone(),
            tier_id: tier.id.clone(),
        };
        match state
            .quota
            .reserve(&key, tier.application_cap, posting.compensation_value)
        {
            Err(exceeded) => {
                record.phase = AttemptPhase::RejectedQuota;
                record.detail = format!(
                    "tier '{}' limit reached: {}/{}",
                    tier.label, exceeded.consumed, exceeded.cap
                );
                self.repository.update(record)?;
                info!(
                    candidate = %candidate.id,
                    tier = %tier.id,
                    consumed = exceeded.consumed,
                    cap = exceeded.cap,
                    "application rejected on quota"
                );
                Ok(ApplicationOutcome::RejectedQuota(exceeded))
            }
            Ok(token) => {
                let quota = state.quota.status(&key, tier.application_cap);
                record.phase = AttemptPhase::Reserved;
                record.token_id = Some(token.id.clone());
                record.detail = format!(
                    "hold taken on tier '{}' ({} remaining)",
                    tier.label, quota.remaining
                );
                let attempt_id = record.attempt_id.clone();
                self.repository.update(record)?;
                info!(
                    candidate = %candidate.id,
                    tier = %tier.id,
                    remaining = quota.remaining,
                    "application hold reserved"
                );
                Ok(ApplicationOutcome::Pending {
                    attempt_id,
                    token,
                    tier: TierSummary::from(tier),
                    quota,
                })
            }
        }
    }

    /// Commit a pending reservation, consuming one unit of quota. Duplicate
    /// confirms and lost races report `InvalidToken` as a benign status.
    pub fn confirm(
        &self,
        token: &ReservationToken,
    ) -> Result<ConfirmOutcome, PlacementServiceError> {
        let state = self.state.read().expect("engine state lock poisoned");

        // the active catalog re-resolves the token's compensation value, so
        // holds taken before a re-partition settle against the new tier
        let Some(tier) = state.catalog.resolve(token.compensation_value) else {
            return Ok(ConfirmOutcome::InvalidToken);
        };
        let key = LedgerKey {
            candidate_id: token.candidate_id.clone(),
            tier_id: tier.id.clone(),
        };

        match state.quota.commit(&key, &token.id) {
            CommitOutcome::Committed => {
                if let Some(mut record) = self.repository.find_by_token(&token.id)? {
                    record.phase = AttemptPhase::Committed;
                    record.resolved_tier = Some(tier.id.clone());
                    record.detail = format!("application submitted against tier '{}'", tier.label);
                    self.repository.update(record)?;
                }
                let quota = state.quota.status(&key, tier.application_cap);
                info!(candidate = %token.candidate_id, tier = %tier.id, "reservation committed");
                Ok(ConfirmOutcome::Committed { quota })
            }
            CommitOutcome::InvalidToken => Ok(ConfirmOutcome::InvalidToken),
        }
    }

    /// Cancel a pending reservation without consuming quota. Duplicate aborts
    /// report `AlreadyReleased` as a benign status.
    pub fn abort(&self, token: &ReservationToken) -> Result<AbortOutcome, PlacementServiceError> {
        let state = self.state.read().expect("engine state lock poisoned");

        let Some(tier) = state.catalog.resolve(token.compensation_value) else {
            return Ok(AbortOutcome::AlreadyReleased);
        };
        let key = LedgerKey {
            candidate_id: token.candidate_id.clone(),
            tier_id: tier.id.clone(),
        };

        match state.quota.release(&key, &token.id) {
            ReleaseOutcome::Released => {
                if let Some(mut record) = self.repository.find_by_token(&token.id)? {
                    record.phase = AttemptPhase::Released;
                    record.detail = "hold released without submission".to_string();
                    self.repository.update(record)?;
                }
                let quota = state.quota.status(&key, tier.application_cap);
                info!(candidate = %token.candidate_id, tier = %tier.id, "reservation released");
                Ok(AbortOutcome::Released { quota })
            }
            ReleaseOutcome::AlreadyReleased => Ok(AbortOutcome::AlreadyReleased),
        }
    }

    /// Read-only usage view for UI display.
    pub fn quota_status(
        &self,
        candidate_id: &CandidateId,
        tier_id: &TierId,
    ) -> Result<QuotaStatusView, PlacementServiceError> {
        let state = self.state.read().expect("engine state lock poisoned");
        let tier = state
            .catalog
            .tier(tier_id)
            .ok_or_else(|| PlacementServiceError::UnknownTier {
                tier_id: tier_id.clone(),
            })?;

        let key = LedgerKey {
            candidate_id: candidate_id.clone(),
            tier_id: tier.id.clone(),
        };
        let status = state.quota.status(&key, tier.application_cap);
        Ok(QuotaStatusView {
            candidate_id: candidate_id.clone(),
            tier_id: tier.id.clone(),
            tier_label: tier.label.clone(),
            consumed: status.consumed,
            reserved: status.reserved,
            cap: status.cap,
            remaining: status.remaining,
        })
    }

    /// Replace the tier catalog mid-cycle, migrating the ledger by original
    /// compensation values. On any conflict the outgoing catalog stays
    /// active and the error is surfaced for manual reconciliation.
    pub fn replace_catalog(
        &self,
        replacement: TierCatalog,
    ) -> Result<MigrationReport, PlacementServiceError> {
        let mut state = self.state.write().expect("engine state lock poisoned");

        let snapshot = state.quota.snapshot();
        let (entries, report) = migration::rebucket(snapshot, &replacement)?;
        state.quota.replace_entries(entries);
        state.catalog = Arc::new(replacement);

        info!(
            entries = report.entries_after,
            reservations = report.reservations_carried,
            "tier catalog replaced and ledger migrated"
        );
        Ok(report)
    }

    /// Reclaim expired holds across the ledger and mark their attempts.
    pub fn sweep_expired(&self) -> Result<Vec<ExpiredReservation>, PlacementServiceError> {
        let state = self.state.read().expect("engine state lock poisoned");
        let reclaimed = state.quota.sweep_expired();

        for expired in &reclaimed {
            if let Some(mut record) = self.repository.find_by_token(&expired.token_id)? {
                if record.phase == AttemptPhase::Reserved {
                    record.phase = AttemptPhase::Expired;
                    record.detail = "reservation expired before confirmation".to_string();
                    self.repository.update(record)?;
                }
            }
        }

        if !reclaimed.is_empty() {
            info!(count = reclaimed.len(), "expired reservations reclaimed");
        }
        Ok(reclaimed)
    }

    /// Drop all ledger usage for a new placement cycle. The trigger cadence
    /// belongs to the deploying organization.
    pub fn reset_cycle(&self) {
        let state = self.state.read().expect("engine state lock poisoned");
        state.quota.clear();
        info!("placement cycle ledger reset");
    }

    pub fn recent_attempts(
        &self,
        limit: usize,
    ) -> Result<Vec<AttemptRecord>, PlacementServiceError> {
        Ok(self.repository.recent(limit)?)
    }

    /// Fetch a recorded attempt for status display.
    pub fn attempt(&self, id: &AttemptId) -> Result<AttemptRecord, PlacementServiceError> {
        let record = self.repository.fetch(id)?.ok_or(RepositoryError::NotFound)?;
        Ok(record)
    }
}

/// Tier identity surfaced with gate outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierSummary {
    pub id: TierId,
    pub label: String,
    pub application_cap: u32,
}

impl From<&CompensationTier> for TierSummary {
    fn from(tier: &CompensationTier) -> Self {
        Self {
            id: tier.id.clone(),
            label: tier.label.clone(),
            application_cap: tier.application_cap,
        }
    }
}

/// Tagged outcome of an application attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ApplicationOutcome {
    /// Quota is held; the caller finishes with `confirm` or `abort`.
    Pending {
        attempt_id: AttemptId,
        token: ReservationToken,
        tier: TierSummary,
        quota: QuotaStatus,
    },
    RejectedConfiguration {
        compensation_value: u64,
    },
    RejectedEligibility {
        violations: Vec<EligibilityViolation>,
    },
    RejectedQuota(QuotaExceeded),
}

/// Outcome of confirming a pending attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConfirmOutcome {
    Committed { quota: QuotaStatus },
    InvalidToken,
}

/// Outcome of aborting a pending attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AbortOutcome {
    Released { quota: QuotaStatus },
    AlreadyReleased,
}

/// Read-only quota view exposed for UI display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatusView {
    pub candidate_id: CandidateId,
    pub tier_id: TierId,
    pub tier_label: String,
    pub consumed: u32,
    pub reserved: u32,
    pub cap: u32,
    pub remaining: u32,
}

/// Error raised by the placement gate; everything else is a typed outcome.
#[derive(Debug, thiserror::Error)]
pub enum PlacementServiceError {
    #[error(transparent)]
    Migration(#[from] TierMigrationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("unknown tier '{tier_id}'")]
    UnknownTier { tier_id: TierId },
}
