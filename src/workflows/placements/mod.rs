//! Tiered application-eligibility and quota enforcement for placement drives.
//!
//! The gate answers one question for any caller wanting to submit an
//! application: may this candidate apply to this posting, and does quota
//! remain within the posting's compensation tier? Decisions come back as
//! tagged outcomes; only catalog misconfiguration, migration conflicts, and
//! store failures abort an operation.

pub mod catalog;
pub mod domain;
pub mod eligibility;
pub mod migration;
pub mod quota;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use catalog::{CatalogConfigError, CatalogImportError, TierCatalog};
pub use domain::{
    AttemptId, AttemptPhase, CandidateId, CandidateRecord, CompensationTier,
    PostingEligibilityCriteria, PostingId, PostingSnapshot, TierId,
};
pub use eligibility::{EligibilityEvaluator, EligibilityOutcome, EligibilityViolation};
pub use migration::{MigrationReport, TierMigrationError};
pub use quota::{
    Clock, CommitOutcome, ExpiredReservation, LedgerKey, QuotaExceeded, QuotaStatus, QuotaTracker,
    ReleaseOutcome, ReservationToken, ReservationTokenId, SystemClock,
};
pub use repository::{
    AttemptRecord, AttemptRepository, AttemptStatusView, InMemoryAttemptRepository, RepositoryError,
};
pub use router::{placement_router, ApplicationAttemptRequest};
pub use service::{
    AbortOutcome, ApplicationOutcome, ConfirmOutcome, GateSettings, PlacementApplicationService,
    PlacementServiceError, QuotaStatusView, TierSummary,
};
