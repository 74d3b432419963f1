//! Event endpoints.
//!
//! ```text
//! GET    /api/v1/events                     upcoming events (anyone)
//! POST   /api/v1/events                     create an event (admin)
//! GET    /api/v1/events/:id                 event overview (anyone)
//! PUT    /api/v1/events/:id                 edit an event (admin, moderator)
//! DELETE /api/v1/events/:id                 delete an event (admin)
//! POST   /api/v1/events/:id/registrations   apply to an event (volunteer)
//! ```

use crate::error::AppError;
use crate::extractors::{ApiJson, ApiPath, CurrentActor, MaybeActor};
use crate::handlers::RemovedRegistrations;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use rollcall_core::types::{Event, EventDraft, EventId, Registration};
use rollcall_runtime::{EventOverview, UpcomingEvent};
use serde::Deserialize;

/// Body of an application.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyRequest {
    /// How the organizer can reach the volunteer
    pub contact: String,
}

/// Events dated today or later, soonest first.
///
/// # Errors
///
/// 500 when the store cannot be read.
pub async fn list_events(
    State(state): State<AppState>,
) -> Result<Json<Vec<UpcomingEvent>>, AppError> {
    Ok(Json(state.workflow.list_upcoming_events().await?))
}

/// Create an event from a draft.
///
/// # Errors
///
/// 403 for non-admins, 422 when the draft fails validation.
pub async fn create_event(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    ApiJson(draft): ApiJson<EventDraft>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let event = state.workflow.create_event(actor, draft).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Event details with its accepted and pending registrations.
///
/// When the caller identifies themselves, their own registration is included
/// whatever its status. Contacts are only shown to moderators, admins and the
/// registration's own volunteer.
///
/// # Errors
///
/// 404 when the event does not exist.
pub async fn event_overview(
    State(state): State<AppState>,
    MaybeActor(viewer): MaybeActor,
    ApiPath(event_id): ApiPath<EventId>,
) -> Result<Json<EventOverview>, AppError> {
    let overview = state
        .workflow
        .event_overview(event_id, viewer)
        .await?;
    Ok(Json(overview))
}

/// Edit an event's name, description, date and place.
///
/// The body is a full draft; `volunteers_required` must repeat the current value.
///
/// # Errors
///
/// 403 for volunteers, 404 when the event does not exist, 422 when the draft
/// fails validation or changes `volunteers_required`.
pub async fn update_event(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    ApiPath(event_id): ApiPath<EventId>,
    ApiJson(draft): ApiJson<EventDraft>,
) -> Result<Json<Event>, AppError> {
    let event = state.workflow.update_event(actor, event_id, draft).await?;
    Ok(Json(event))
}

/// Delete an event together with its registrations.
///
/// # Errors
///
/// 403 for non-admins, 404 when the event does not exist.
pub async fn delete_event(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    ApiPath(event_id): ApiPath<EventId>,
) -> Result<Json<RemovedRegistrations>, AppError> {
    let removed_registrations = state.workflow.delete_event(actor, event_id).await?;
    Ok(Json(RemovedRegistrations {
        removed_registrations,
    }))
}

/// Apply to an event as the calling volunteer.
///
/// # Errors
///
/// 404 for an unknown event, 409 for a repeated application or a full event,
/// 422 for a blank contact.
pub async fn apply(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    ApiPath(event_id): ApiPath<EventId>,
    ApiJson(request): ApiJson<ApplyRequest>,
) -> Result<(StatusCode, Json<Registration>), AppError> {
    let registration = state
        .workflow
        .apply(actor, event_id, &request.contact)
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}
