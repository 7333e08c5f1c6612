use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{AttemptId, CandidateId, CandidateRecord, PostingSnapshot, TierId};
use super::eligibility::EligibilityViolation;
use super::quota::ReservationToken;
use super::repository::{AttemptRepository, RepositoryError};
use super::service::{
    AbortOutcome, ApplicationOutcome, ConfirmOutcome, PlacementApplicationService,
    PlacementServiceError,
};

/// Request payload pairing the roster and posting snapshots for one attempt.
#[derive(Debug, Deserialize)]
pub struct ApplicationAttemptRequest {
    pub candidate: CandidateRecord,
    pub posting: PostingSnapshot,
}

/// Router builder exposing the gate operations as JSON endpoints.
pub fn placement_router<R>(service: Arc<PlacementApplicationService<R>>) -> Router
where
    R: AttemptRepository + 'static,
{
    Router::new()
        .route("/api/v1/placements/applications", post(attempt_handler::<R>))
        .route(
            "/api/v1/placements/applications/confirm",
            post(confirm_handler::<R>),
        )
        .route(
            "/api/v1/placements/applications/abort",
            post(abort_handler::<R>),
        )
        .route(
            "/api/v1/placements/applications/:attempt_id",
            get(attempt_status_handler::<R>),
        )
        .route(
            "/api/v1/placements/quota/:candidate_id/:tier_id",
            get(quota_status_handler::<R>),
        )
        .with_state(service)
}

pub(crate) async fn attempt_handler<R>(
    State(service): State<Arc<PlacementApplicationService<R>>>,
    axum::Json(request): axum::Json<ApplicationAttemptRequest>,
) -> Response
where
    R: AttemptRepository + 'static,
{
    match service.attempt_apply(&request.candidate, &request.posting) {
        Ok(ApplicationOutcome::Pending {
            attempt_id,
            token,
            tier,
            quota,
        }) => {
            let payload = json!({
                "status": "reserved",
                "attempt_id": attempt_id,
                "token": token,
                "tier": tier,
                "quota": quota,
            });
            (StatusCode::ACCEPTED, axum::Json(payload)).into_response()
        }
        Ok(ApplicationOutcome::RejectedEligibility { violations }) => {
            let reasons: Vec<String> = violations.iter().map(EligibilityViolation::summary).collect();
            let payload = json!({
                "status": "rejected_eligibility",
                "violations": violations,
                "reasons": reasons,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        Ok(ApplicationOutcome::RejectedQuota(exceeded)) => {
            let payload = json!({
                "status": "rejected_quota",
                "tier_id": exceeded.tier_id,
                "cap": exceeded.cap,
                "consumed": exceeded.consumed,
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        Ok(ApplicationOutcome::RejectedConfiguration { compensation_value }) => {
            let payload = json!({
                "status": "rejected_configuration",
                "compensation_value": compensation_value,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        Err(other) => {
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn confirm_handler<R>(
    State(service): State<Arc<PlacementApplicationService<R>>>,
    axum::Json(token): axum::Json<ReservationToken>,
) -> Response
where
    R: AttemptRepository + 'static,
{
    match service.confirm(&token) {
        Ok(ConfirmOutcome::Committed { quota }) => {
            let payload = json!({
                "status": "committed",
                "quota": quota,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        // benign duplicate/race outcome, reported as status rather than fault
        Ok(ConfirmOutcome::InvalidToken) => {
            let payload = json!({
                "status": "invalid_token",
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(other) => {
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn abort_handler<R>(
    State(service): State<Arc<PlacementApplicationService<R>>>,
    axum::Json(token): axum::Json<ReservationToken>,
) -> Response
where
    R: AttemptRepository + 'static,
{
    match service.abort(&token) {
        Ok(AbortOutcome::Released { quota }) => {
            let payload = json!({
                "status": "released",
                "quota": quota,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Ok(AbortOutcome::AlreadyReleased) => {
            let payload = json!({
                "status": "already_released",
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(other) => {
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn attempt_status_handler<R>(
    State(service): State<Arc<PlacementApplicationService<R>>>,
    Path(attempt_id): Path<String>,
) -> Response
where
    R: AttemptRepository + 'static,
{
    match service.attempt(&AttemptId(attempt_id)) {
        Ok(record) => {
            let view = record.status_view();
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(PlacementServiceError::Repository(RepositoryError::NotFound)) => {
            let payload = json!({
                "error": "attempt not found",
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(other) => {
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn quota_status_handler<R>(
    State(service): State<Arc<PlacementApplicationService<R>>>,
    Path((candidate_id, tier_id)): Path<(String, String)>,
) -> Response
where
    R: AttemptRepository + 'static,
{
    match service.quota_status(&CandidateId(candidate_id), &TierId(tier_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error @ PlacementServiceError::UnknownTier { .. }) => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(other) => {
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
