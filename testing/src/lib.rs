//! # Rollcall Testing
//!
//! Testing utilities and helpers for Rollcall.
//!
//! This crate provides:
//! - Mock implementations of Environment traits
//! - An in-memory [`RegistrationStore`](rollcall_core::store::RegistrationStore)
//! - Fixtures for actors and event drafts
//!
//! ## Example
//!
//! ```ignore
//! use rollcall_testing::{InMemoryRegistrationStore, helpers, test_clock};
//! use rollcall_runtime::RegistrationWorkflow;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn volunteer_applies() {
//!     let store = Arc::new(InMemoryRegistrationStore::new());
//!     let workflow = RegistrationWorkflow::new(store, Arc::new(test_clock()));
//!
//!     let event = workflow.create_event(helpers::admin(), helpers::event_draft(2)).await.unwrap();
//!     let registration = workflow
//!         .apply(helpers::volunteer(), event.id, "vol@example.com")
//!         .await
//!         .unwrap();
//!     assert_eq!(registration.status, RegistrationStatus::Pending);
//! }
//! ```

use chrono::{DateTime, Utc};
use rollcall_core::environment::Clock;

/// In-memory registration store
pub mod memory_store;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use rollcall_testing::mocks::FixedClock;
    /// use rollcall_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that advances by a fixed step on every read.
    ///
    /// Gives registrations distinct, ordered `created_at` values.
    #[derive(Debug)]
    pub struct TickingClock {
        next: Mutex<DateTime<Utc>>,
        step: chrono::Duration,
    }

    impl TickingClock {
        /// Start at `start`, advancing by `step` after each call to `now`
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: chrono::Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }
    }

    impl Clock for TickingClock {
        fn now(&self) -> DateTime<Utc> {
            let mut next = self
                .next
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let now = *next;
            *next = now + self.step;
            now
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Ticking clock starting at the [`test_clock`] time, one second per read.
    #[must_use]
    pub fn ticking_clock() -> TickingClock {
        TickingClock::new(test_clock().now(), chrono::Duration::seconds(1))
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use chrono::NaiveDate;
    use rollcall_core::types::{Actor, ActorRole, EventDraft, UserId};

    /// A fresh admin.
    #[must_use]
    pub fn admin() -> Actor {
        Actor::new(UserId::new(), ActorRole::Admin)
    }

    /// A fresh moderator.
    #[must_use]
    pub fn moderator() -> Actor {
        Actor::new(UserId::new(), ActorRole::Moderator)
    }

    /// A fresh volunteer.
    #[must_use]
    pub fn volunteer() -> Actor {
        Actor::new(UserId::new(), ActorRole::Volunteer)
    }

    /// A valid event draft asking for `volunteers_required` volunteers.
    #[must_use]
    pub fn event_draft(volunteers_required: u32) -> EventDraft {
        EventDraft {
            name: "Community garden".to_string(),
            description: "Planting and weeding".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 5, 17).unwrap_or_default(),
            place: "Elm Street allotments".to_string(),
            volunteers_required,
        }
    }

    /// Install a test-writer tracing subscriber. Safe to call from every test.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "rollcall=debug".into()),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use memory_store::InMemoryRegistrationStore;
pub use mocks::{FixedClock, TickingClock, test_clock, ticking_clock};
