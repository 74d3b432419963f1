//! Custom Axum extractors.
//!
//! - [`CurrentActor`] / [`MaybeActor`]: caller identity from gateway headers
//! - [`ApiPath`] / [`ApiJson`]: `Path` and `Json` whose rejections render as [`AppError`]
//!
//! # Examples
//!
//! ```ignore
//! async fn accept(
//!     State(state): State<AppState>,
//!     CurrentActor(actor): CurrentActor,
//!     ApiPath(id): ApiPath<RegistrationId>,
//! ) -> Result<Json<AcceptOutcome>, AppError> {
//!     Ok(Json(state.workflow.accept(actor, id).await?))
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use rollcall_core::types::{Actor, ActorRole, UserId};
use uuid::Uuid;

/// Header carrying the caller's user id (UUID).
pub const ACTOR_ID_HEADER: &str = "X-Actor-Id";

/// Header carrying the caller's role.
pub const ACTOR_ROLE_HEADER: &str = "X-Actor-Role";

/// Authenticated caller. Rejects with 401 when the actor headers are missing or invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)?
            .map(Self)
            .ok_or_else(|| {
                AppError::unauthorized(format!(
                    "{ACTOR_ID_HEADER} and {ACTOR_ROLE_HEADER} headers are required"
                ))
            })
    }
}

/// Caller identity for endpoints anyone may call.
///
/// Absent headers yield `None`; present but malformed headers still reject with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaybeActor(pub Option<Actor>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers).map(Self)
    }
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Option<Actor>, AppError> {
    match (headers.get(ACTOR_ID_HEADER), headers.get(ACTOR_ROLE_HEADER)) {
        (None, None) => Ok(None),
        (Some(id), Some(role)) => {
            let id = id
                .to_str()
                .ok()
                .and_then(|s| Uuid::parse_str(s.trim()).ok())
                .ok_or_else(|| AppError::unauthorized(format!("{ACTOR_ID_HEADER} must be a UUID")))?;
            let role = role
                .to_str()
                .ok()
                .and_then(|s| s.parse::<ActorRole>().ok())
                .ok_or_else(|| {
                    AppError::unauthorized(format!("{ACTOR_ROLE_HEADER} names an unknown role"))
                })?;
            Ok(Some(Actor::new(UserId::from_uuid(id), role)))
        },
        _ => Err(AppError::unauthorized(format!(
            "{ACTOR_ID_HEADER} and {ACTOR_ROLE_HEADER} must be sent together"
        ))),
    }
}

/// `Path` extractor rejecting with a JSON 400.
#[derive(FromRequestParts, Debug)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// `Json` body extractor rejecting with a JSON error body.
#[derive(FromRequest, Debug)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);
