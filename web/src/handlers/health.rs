//! Health check endpoint.
//!
//! Used by load balancers to verify the process is up.

use axum::http::StatusCode;

/// Liveness check.
///
/// Returns 200 OK without touching the database.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
