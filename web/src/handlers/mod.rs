//! HTTP request handlers, one module per resource.

pub mod events;
pub mod health;
pub mod registrations;
pub mod volunteers;

use serde::{Deserialize, Serialize};

pub use health::health_check;

/// Response body of the bulk removal endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedRegistrations {
    /// Number of registrations deleted
    pub removed_registrations: u64,
}
