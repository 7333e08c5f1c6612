use std::sync::Arc;

use chrono::Duration;

use super::common::*;
use crate::workflows::placements::domain::{AttemptPhase, TierId};
use crate::workflows::placements::eligibility::EligibilityViolation;
use crate::workflows::placements::repository::{AttemptRepository, RepositoryError};
use crate::workflows::placements::service::{
    AbortOutcome, ApplicationOutcome, ConfirmOutcome, GateSettings, PlacementApplicationService,
    PlacementServiceError,
};

#[test]
fn eligible_attempt_reserves_and_confirms() {
    let (service, repository) = build_service();
    let applicant = candidate("flow");
    let snapshot = posting("flow", 750_000);

    let outcome = service
        .attempt_apply(&applicant, &snapshot)
        .expect("gate accepts the attempt");

    let (token, quota) = match outcome {
        ApplicationOutcome::Pending { token, tier, quota, .. } => {
            assert_eq!(tier.id, TierId("tier-2".into()));
            assert_eq!(tier.application_cap, 15);
            assert_eq!(quota.remaining, 14);
            (token, quota)
        }
        other => panic!("expected pending outcome, got {other:?}"),
    };
    assert_eq!(quota.reserved, 1);

    let stored = repository
        .find_by_token(&token.id)
        .expect("fetch succeeds")
        .expect("attempt recorded");
    assert_eq!(stored.phase, AttemptPhase::Reserved);
    assert_eq!(stored.resolved_tier, Some(TierId("tier-2".into())));

    match service.confirm(&token).expect("confirm succeeds") {
        ConfirmOutcome::Committed { quota } => {
            assert_eq!(quota.consumed, 1);
            assert_eq!(quota.reserved, 0);
            assert_eq!(quota.remaining, 14);
        }
        other => panic!("expected committed outcome, got {other:?}"),
    }

    let stored = repository
        .find_by_token(&token.id)
        .expect("fetch succeeds")
        .expect("attempt recorded");
    assert_eq!(stored.phase, AttemptPhase::Committed);
    assert!(stored.phase.is_terminal());
}

#[test]
fn ineligible_attempt_leaves_quota_untouched() {
    let (service, _) = build_service();
    let mut applicant = candidate("backlogs");
    applicant.backlog_count = 3;
    let snapshot = posting("backlogs", 750_000);

    let outcome = service
        .attempt_apply(&applicant, &snapshot)
        .expect("gate evaluates the attempt");

    match outcome {
        ApplicationOutcome::RejectedEligibility { violations } => {
            assert_eq!(
                violations,
                vec![EligibilityViolation::BacklogsOverLimit {
                    limit: 2,
                    actual: 3
                }]
            );
        }
        other => panic!("expected eligibility rejection, got {other:?}"),
    }

    let view = service
        .quota_status(&applicant.id, &TierId("tier-2".into()))
        .expect("tier exists");
    assert_eq!(view.consumed, 0);
    assert_eq!(view.reserved, 0);
    assert_eq!(view.remaining, 15);
}

#[test]
fn quota_rejection_carries_cap_and_consumed() {
    let (service, repository) = build_service();
    let applicant = candidate("cap");

    // tier-3 caps at 3 applications
    for round in 0..3 {
        let snapshot = posting(&format!("cap-{round}"), 1_200_000);
        match service.attempt_apply(&applicant, &snapshot).expect("accepted") {
            ApplicationOutcome::Pending { token, .. } => {
                service.confirm(&token).expect("confirm succeeds");
            }
            other => panic!("expected pending outcome, got {other:?}"),
        }
    }

    let snapshot = posting("cap-final", 1_200_000);
    let outcome = service
        .attempt_apply(&applicant, &snapshot)
        .expect("gate evaluates the attempt");

    match outcome {
        ApplicationOutcome::RejectedQuota(exceeded) => {
            assert_eq!(exceeded.tier_id, TierId("tier-3".into()));
            assert_eq!(exceeded.cap, 3);
            assert_eq!(exceeded.consumed, 3);
        }
        other => panic!("expected quota rejection, got {other:?}"),
    }

    let recent = repository.recent(1).expect("recent attempts load");
    assert_eq!(recent[0].phase, AttemptPhase::RejectedQuota);
}

#[test]
fn unresolvable_compensation_is_a_configuration_rejection() {
    let catalog = crate::workflows::placements::catalog::TierCatalog::try_new(vec![
        tier("tier-1", "Tier I", 100_000, Some(500_000), 5),
        tier("tier-2", "Tier II", 500_000, None, 3),
    ])
    .expect("valid catalog");
    let (service, repository) = build_service_with_catalog(catalog);

    let outcome = service
        .attempt_apply(&candidate("low"), &posting("low", 50_000))
        .expect("gate evaluates the attempt");

    match outcome {
        ApplicationOutcome::RejectedConfiguration { compensation_value } => {
            assert_eq!(compensation_value, 50_000);
        }
        other => panic!("expected configuration rejection, got {other:?}"),
    }

    let recent = repository.recent(1).expect("recent attempts load");
    assert_eq!(recent[0].phase, AttemptPhase::RejectedConfiguration);
    assert_eq!(recent[0].resolved_tier, None);
}

#[test]
fn abort_returns_capacity_for_a_fresh_attempt() {
    let (service, repository) = build_service();
    let applicant = candidate("abort");
    let before = service
        .quota_status(&applicant.id, &TierId("tier-2".into()))
        .expect("tier exists");

    let token = match service
        .attempt_apply(&applicant, &posting("abort", 750_000))
        .expect("accepted")
    {
        ApplicationOutcome::Pending { token, .. } => token,
        other => panic!("expected pending outcome, got {other:?}"),
    };

    match service.abort(&token).expect("abort succeeds") {
        AbortOutcome::Released { quota } => assert_eq!(quota.remaining, before.remaining),
        other => panic!("expected released outcome, got {other:?}"),
    }

    let stored = repository
        .find_by_token(&token.id)
        .expect("fetch succeeds")
        .expect("attempt recorded");
    assert_eq!(stored.phase, AttemptPhase::Released);

    service
        .attempt_apply(&applicant, &posting("abort-retry", 750_000))
        .expect("accepted");
}

#[test]
fn duplicate_confirm_reports_invalid_token() {
    let (service, _) = build_service();

    let token = match service
        .attempt_apply(&candidate("dup"), &posting("dup", 750_000))
        .expect("accepted")
    {
        ApplicationOutcome::Pending { token, .. } => token,
        other => panic!("expected pending outcome, got {other:?}"),
    };

    assert!(matches!(
        service.confirm(&token).expect("confirm succeeds"),
        ConfirmOutcome::Committed { .. }
    ));
    assert!(matches!(
        service.confirm(&token).expect("second confirm is benign"),
        ConfirmOutcome::InvalidToken
    ));

    let view = service
        .quota_status(&candidate("dup").id, &TierId("tier-2".into()))
        .expect("tier exists");
    assert_eq!(view.consumed, 1, "double confirm must not double count");
}

#[test]
fn abort_after_confirm_is_benign() {
    let (service, _) = build_service();

    let token = match service
        .attempt_apply(&candidate("late-abort"), &posting("late-abort", 750_000))
        .expect("accepted")
    {
        ApplicationOutcome::Pending { token, .. } => token,
        other => panic!("expected pending outcome, got {other:?}"),
    };

    service.confirm(&token).expect("confirm succeeds");
    assert!(matches!(
        service.abort(&token).expect("abort is benign"),
        AbortOutcome::AlreadyReleased
    ));
}

#[test]
fn quota_status_rejects_unknown_tiers() {
    let (service, _) = build_service();

    match service.quota_status(&candidate("status").id, &TierId("tier-99".into())) {
        Err(PlacementServiceError::UnknownTier { tier_id }) => {
            assert_eq!(tier_id, TierId("tier-99".into()));
        }
        other => panic!("expected unknown tier error, got {other:?}"),
    }
}

#[test]
fn sweep_marks_expired_attempts() {
    let clock = ManualClock::at_start();
    let (service, repository) = build_service_with_clock(clock.clone(), Duration::minutes(10));
    let applicant = candidate("expiry");

    let token = match service
        .attempt_apply(&applicant, &posting("expiry", 750_000))
        .expect("accepted")
    {
        ApplicationOutcome::Pending { token, .. } => token,
        other => panic!("expected pending outcome, got {other:?}"),
    };

    clock.advance(Duration::minutes(11));
    let reclaimed = service.sweep_expired().expect("sweep runs");
    assert_eq!(reclaimed.len(), 1);

    let stored = repository
        .find_by_token(&token.id)
        .expect("fetch succeeds")
        .expect("attempt recorded");
    assert_eq!(stored.phase, AttemptPhase::Expired);

    assert!(matches!(
        service.confirm(&token).expect("confirm is benign"),
        ConfirmOutcome::InvalidToken
    ));
    let view = service
        .quota_status(&applicant.id, &TierId("tier-2".into()))
        .expect("tier exists");
    assert_eq!(view.remaining, 15, "expired hold returned its capacity");
}

#[test]
fn reset_cycle_clears_the_ledger() {
    let (service, _) = build_service();
    let applicant = candidate("reset");

    match service
        .attempt_apply(&applicant, &posting("reset", 750_000))
        .expect("accepted")
    {
        ApplicationOutcome::Pending { token, .. } => {
            service.confirm(&token).expect("confirm succeeds");
        }
        other => panic!("expected pending outcome, got {other:?}"),
    }

    service.reset_cycle();

    let view = service
        .quota_status(&applicant.id, &TierId("tier-2".into()))
        .expect("tier exists");
    assert_eq!(view.consumed, 0);
    assert_eq!(view.remaining, 15);
}

#[test]
fn repository_failures_abort_the_attempt() {
    let service = PlacementApplicationService::new(
        Arc::new(UnavailableAttemptStore),
        catalog(),
        GateSettings::default(),
    );

    match service.attempt_apply(&candidate("store"), &posting("store", 750_000)) {
        Err(PlacementServiceError::Repository(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected repository error, got {other:?}"),
    }
}

#[test]
fn recent_attempts_returns_the_latest_first() {
    let (service, _) = build_service();

    for round in 0..3 {
        service
            .attempt_apply(&candidate(&format!("audit-{round}")), &posting("audit", 750_000))
            .expect("accepted");
    }

    let recent = service.recent_attempts(2).expect("recent attempts load");
    assert_eq!(recent.len(), 2);
}
