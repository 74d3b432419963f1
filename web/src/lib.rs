//! JSON HTTP surface for the rollcall registration workflow.
//!
//! Handlers translate requests into [`RegistrationWorkflow`](rollcall_runtime::RegistrationWorkflow)
//! calls and map [`WorkflowError`](rollcall_core::error::WorkflowError)s onto
//! HTTP statuses through [`AppError`].
//!
//! The caller is identified by the `X-Actor-Id` and `X-Actor-Role` headers,
//! which an upstream gateway is expected to set after authenticating the user.
//!
//! # Example
//!
//! ```ignore
//! let state = AppState::new(Arc::new(workflow));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, rollcall_web::router(state)).await?;
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

pub use error::AppError;
pub use extractors::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER, CurrentActor, MaybeActor};
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, correlation_id_layer};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the application router.
///
/// ```text
/// GET    /health
/// GET    /api/v1/events
/// POST   /api/v1/events
/// GET    /api/v1/events/:id
/// PUT    /api/v1/events/:id
/// DELETE /api/v1/events/:id
/// POST   /api/v1/events/:id/registrations
/// POST   /api/v1/registrations/:id/accept
/// POST   /api/v1/registrations/:id/reject
/// DELETE /api/v1/volunteers/:id/registrations
/// ```
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/events",
            get(handlers::events::list_events).post(handlers::events::create_event),
        )
        .route(
            "/events/:id",
            get(handlers::events::event_overview)
                .put(handlers::events::update_event)
                .delete(handlers::events::delete_event),
        )
        .route("/events/:id/registrations", post(handlers::events::apply))
        .route(
            "/registrations/:id/accept",
            post(handlers::registrations::accept),
        )
        .route(
            "/registrations/:id/reject",
            post(handlers::registrations::reject),
        )
        .route(
            "/volunteers/:id/registrations",
            delete(handlers::volunteers::forget_volunteer),
        );

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
