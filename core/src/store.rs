//! Registration store traits.
//!
//! The store owns every persisted event and registration row. All access goes
//! through a [`StoreTransaction`] so that check-then-act sequences (read the
//! accepted count, then write a status) commit or roll back as one unit.
//!
//! # Implementations
//!
//! - `PostgresRegistrationStore` (in `rollcall-postgres`): row locks via `SELECT … FOR UPDATE`
//! - `InMemoryRegistrationStore` (in `rollcall-testing`): one transaction at a time
//!
//! # Dyn Compatibility
//!
//! Methods return [`StoreFuture`] instead of using `async fn` so the engine can
//! hold an `Arc<dyn RegistrationStore>` and a `Box<dyn StoreTransaction>`.
//!
//! # Example
//!
//! ```no_run
//! use rollcall_core::store::{RegistrationStore, StoreError};
//! use rollcall_core::types::{EventId, RegistrationStatus};
//!
//! async fn accepted<S: RegistrationStore + ?Sized>(
//!     store: &S,
//!     event_id: EventId,
//! ) -> Result<u32, StoreError> {
//!     let mut tx = store.begin().await?;
//!     let count = tx.count_by_status(event_id, RegistrationStatus::Accepted).await?;
//!     tx.commit().await?;
//!     Ok(count)
//! }
//! ```

use crate::types::{
    Event, EventId, NewEvent, NewRegistration, Registration, RegistrationId, RegistrationStatus,
    UserId,
};
use chrono::NaiveDate;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A registration for the same (event, volunteer) pair already exists.
    #[error("Duplicate registration for event {event_id} and volunteer {volunteer_id}")]
    Duplicate {
        /// Event of the conflicting row
        event_id: EventId,
        /// Volunteer of the conflicting row
        volunteer_id: UserId,
    },

    /// Transient conflict with a concurrent transaction (serialization failure,
    /// deadlock). Safe to retry.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Entry point of the registration store.
pub trait RegistrationStore: Send + Sync {
    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// - `Database`: no connection could be obtained
    fn begin(&self) -> StoreFuture<'_, Box<dyn StoreTransaction>>;
}

/// A unit of work against the store.
///
/// Reads observe committed rows plus the transaction's own writes. Dropping a
/// transaction without calling [`commit`](Self::commit) discards every write.
pub trait StoreTransaction: Send {
    /// Read an event without locking it.
    fn get_event(&mut self, event_id: EventId) -> StoreFuture<'_, Option<Event>>;

    /// Read an event and hold its row lock until the transaction ends.
    ///
    /// Every capacity decision for the event is taken under this lock.
    fn lock_event(&mut self, event_id: EventId) -> StoreFuture<'_, Option<Event>>;

    /// Insert an event.
    fn insert_event(&mut self, event: NewEvent) -> StoreFuture<'_, Event>;

    /// Overwrite an event's name, description, date and place.
    ///
    /// Capacity, organizer and creation time are never written. Returns `false`
    /// if the event does not exist.
    fn update_event(&mut self, event: Event) -> StoreFuture<'_, bool>;

    /// Events dated on or after `from`, soonest first, each with its accepted count.
    ///
    /// Events on the same day are ordered by creation time.
    fn list_upcoming_events(&mut self, from: NaiveDate) -> StoreFuture<'_, Vec<(Event, u32)>>;

    /// Delete an event and all its registrations.
    ///
    /// Returns the number of registrations removed, or `None` if the event did not exist.
    fn delete_event(&mut self, event_id: EventId) -> StoreFuture<'_, Option<u64>>;

    /// Read a registration without locking it.
    ///
    /// Used to find the event whose lock must be taken first.
    fn get_registration(
        &mut self,
        registration_id: RegistrationId,
    ) -> StoreFuture<'_, Option<Registration>>;

    /// Read a registration and hold its row lock until the transaction ends.
    ///
    /// Take the event lock before this one.
    fn lock_registration(
        &mut self,
        registration_id: RegistrationId,
    ) -> StoreFuture<'_, Option<Registration>>;

    /// Find the registration of a volunteer for an event.
    fn find_registration(
        &mut self,
        event_id: EventId,
        volunteer_id: UserId,
    ) -> StoreFuture<'_, Option<Registration>>;

    /// Insert a `pending` registration.
    ///
    /// # Errors
    ///
    /// - `Duplicate`: the (event, volunteer) pair already has a registration
    fn create_registration(&mut self, registration: NewRegistration)
    -> StoreFuture<'_, Registration>;

    /// Count the event's registrations in `status`.
    fn count_by_status(
        &mut self,
        event_id: EventId,
        status: RegistrationStatus,
    ) -> StoreFuture<'_, u32>;

    /// Unconditionally set one registration's status.
    ///
    /// Returns `false` if no such registration exists. Callers check invariants first.
    fn set_status(
        &mut self,
        registration_id: RegistrationId,
        status: RegistrationStatus,
    ) -> StoreFuture<'_, bool>;

    /// Move every registration of the event from `from` to `to` in one statement.
    ///
    /// Returns the number of rows changed.
    fn bulk_set_status(
        &mut self,
        event_id: EventId,
        from: RegistrationStatus,
        to: RegistrationStatus,
    ) -> StoreFuture<'_, u64>;

    /// List the event's registrations, oldest first, optionally filtered by status.
    fn list_registrations(
        &mut self,
        event_id: EventId,
        status: Option<RegistrationStatus>,
    ) -> StoreFuture<'_, Vec<Registration>>;

    /// Remove every registration of a volunteer. Returns the number removed.
    fn delete_registrations_for_volunteer(&mut self, volunteer_id: UserId)
    -> StoreFuture<'_, u64>;

    /// Make all writes of this transaction visible.
    ///
    /// # Errors
    ///
    /// - `Conflict`: the database aborted the transaction at commit time
    /// - `Database`: connection lost
    fn commit(self: Box<Self>) -> StoreFuture<'static, ()>;
}
