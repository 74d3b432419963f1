//! # Rollcall Core
//!
//! Core types and traits for coordinating volunteers on capacity-bounded events.
//!
//! ## Core Concepts
//!
//! - **Event**: an activity with a fixed number of volunteer slots
//! - **Registration**: one volunteer's application, `pending` until a moderator decides
//! - **Store**: transactional persistence behind [`store::RegistrationStore`]
//! - **Transition rules**: pure checks in [`transition`] deciding what an operation may do
//! - **Environment**: injected dependencies such as the [`environment::Clock`]
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell: rules are pure, the engine does the I/O
//! - Every decision is re-read from the store inside the transaction that acts on it
//! - The caller's role is an explicit argument, never ambient state
//!
//! ## Example
//!
//! ```
//! use rollcall_core::error::Operation;
//! use rollcall_core::transition::authorize;
//! use rollcall_core::types::ActorRole;
//!
//! assert!(authorize(ActorRole::Moderator, Operation::Accept).is_ok());
//! assert!(authorize(ActorRole::Volunteer, Operation::Accept).is_err());
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod store;
pub mod transition;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, Utc};
pub use error::{Operation, WorkflowError};
pub use store::{RegistrationStore, StoreError, StoreFuture, StoreTransaction};
pub use types::{
    Actor, ActorRole, Event, EventDraft, EventId, NewEvent, NewRegistration, Registration,
    RegistrationId, RegistrationStatus, UserId,
};

/// Environment module - Dependency injection traits
///
/// External dependencies of the workflow are abstracted behind traits and
/// injected when the engine is built.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use rollcall_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
