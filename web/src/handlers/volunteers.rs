//! Volunteer administration.

use crate::error::AppError;
use crate::extractors::{ApiPath, CurrentActor};
use crate::handlers::RemovedRegistrations;
use crate::state::AppState;
use axum::{Json, extract::State};
use rollcall_core::types::UserId;

/// Remove every registration a volunteer holds, across all events.
///
/// ```text
/// DELETE /api/v1/volunteers/:id/registrations
/// ```
///
/// # Errors
///
/// 403 for non-admins.
pub async fn forget_volunteer(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    ApiPath(volunteer_id): ApiPath<UserId>,
) -> Result<Json<RemovedRegistrations>, AppError> {
    let removed_registrations = state
        .workflow
        .forget_volunteer(actor, volunteer_id)
        .await?;
    Ok(Json(RemovedRegistrations {
        removed_registrations,
    }))
}
