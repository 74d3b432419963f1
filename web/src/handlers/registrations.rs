//! Moderation endpoints.

use crate::error::AppError;
use crate::extractors::{ApiPath, CurrentActor};
use crate::state::AppState;
use axum::{Json, extract::State};
use rollcall_core::types::RegistrationId;
use rollcall_runtime::{AcceptOutcome, RejectOutcome};

/// Accept a pending registration, rejecting the remaining pending ones if the
/// event becomes full.
///
/// ```text
/// POST /api/v1/registrations/:id/accept
/// ```
///
/// # Errors
///
/// 409 when the event is already full or the registration is no longer pending.
pub async fn accept(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    ApiPath(id): ApiPath<RegistrationId>,
) -> Result<Json<AcceptOutcome>, AppError> {
    Ok(Json(state.workflow.accept(actor, id).await?))
}

/// Reject a registration. Rejecting twice succeeds.
///
/// ```text
/// POST /api/v1/registrations/:id/reject
/// ```
///
/// # Errors
///
/// 409 when the registration was already accepted.
pub async fn reject(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    ApiPath(id): ApiPath<RegistrationId>,
) -> Result<Json<RejectOutcome>, AppError> {
    Ok(Json(state.workflow.reject(actor, id).await?))
}
