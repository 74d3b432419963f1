//! # Rollcall Runtime
//!
//! The registration workflow engine.
//!
//! This crate drives the registration lifecycle on top of a
//! [`RegistrationStore`](rollcall_core::store::RegistrationStore):
//!
//! ## Core Components
//!
//! - **[`RegistrationWorkflow`]**: apply, accept (with the quota-fill cascade),
//!   reject, and event administration
//! - **[`retry`]**: exponential backoff for transient store conflicts
//! - **[`metrics`]**: Prometheus counters for workflow outcomes
//!
//! ## Example
//!
//! ```ignore
//! use rollcall_runtime::RegistrationWorkflow;
//! use rollcall_core::environment::SystemClock;
//! use std::sync::Arc;
//!
//! let workflow = RegistrationWorkflow::new(store, Arc::new(SystemClock));
//!
//! let registration = workflow.apply(volunteer, event_id, "vol@example.com").await?;
//! let outcome = workflow.accept(moderator, registration.id).await?;
//! if outcome.filled_event() {
//!     println!("{} pending registrations closed", outcome.cascaded_rejections);
//! }
//! ```

#![forbid(unsafe_code)]

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

/// The registration workflow engine
pub mod workflow;

pub use retry::RetryPolicy;
pub use workflow::{
    AcceptOutcome, EventOverview, RegistrationWorkflow, RejectOutcome, UpcomingEvent,
};
