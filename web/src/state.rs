//! Application state for Axum handlers.

use rollcall_runtime::RegistrationWorkflow;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registration workflow engine every handler drives
    pub workflow: Arc<RegistrationWorkflow>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(workflow: Arc<RegistrationWorkflow>) -> Self {
        Self { workflow }
    }
}
