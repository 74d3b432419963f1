//! In-memory registration store.
//!
//! Provides a fast, deterministic [`RegistrationStore`] for engine tests:
//! - One transaction runs at a time (the store mutex is held until commit or drop)
//! - Writes go to a working copy that replaces the shared state only on commit
//! - Failure injection for exercising rollback paths

#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use rollcall_core::store::{RegistrationStore, StoreError, StoreFuture, StoreTransaction};
use rollcall_core::types::{
    Event, EventId, NewEvent, NewRegistration, Registration, RegistrationId, RegistrationStatus,
    UserId,
};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::future::ready;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
struct MemoryState {
    events: HashMap<EventId, Event>,
    registrations: HashMap<RegistrationId, Registration>,
}

impl MemoryState {
    fn count(&self, event_id: EventId, status: RegistrationStatus) -> u32 {
        let count = self
            .registrations
            .values()
            .filter(|r| r.event_id == event_id && r.status == status)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

/// In-memory registration store for fast, deterministic testing.
///
/// Transactions are fully serialised, which gives the same guarantees the
/// `PostgreSQL` store gets from row locks: a count read inside a transaction
/// cannot go stale before that transaction commits.
///
/// # Example
///
/// ```
/// use rollcall_testing::InMemoryRegistrationStore;
/// use rollcall_core::store::RegistrationStore;
/// use rollcall_core::types::{EventId, RegistrationStatus};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryRegistrationStore::new();
/// let mut tx = store.begin().await?;
/// let accepted = tx.count_by_status(EventId::new(), RegistrationStatus::Accepted).await?;
/// assert_eq!(accepted, 0);
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryRegistrationStore {
    state: Arc<Mutex<MemoryState>>,
    fail_bulk_updates: Arc<AtomicBool>,
}

impl InMemoryRegistrationStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `bulk_set_status` call fail with a database error.
    pub fn fail_bulk_updates(&self, fail: bool) {
        self.fail_bulk_updates.store(fail, Ordering::SeqCst);
    }

    /// Committed state of one registration.
    pub async fn registration(&self, id: RegistrationId) -> Option<Registration> {
        self.state.lock().await.registrations.get(&id).cloned()
    }

    /// Committed state of one event.
    pub async fn event(&self, id: EventId) -> Option<Event> {
        self.state.lock().await.events.get(&id).cloned()
    }

    /// Committed count of the event's registrations in `status`.
    pub async fn count(&self, event_id: EventId, status: RegistrationStatus) -> u32 {
        self.state.lock().await.count(event_id, status)
    }

    /// Number of committed registrations across all events.
    pub async fn registration_count(&self) -> usize {
        self.state.lock().await.registrations.len()
    }
}

impl RegistrationStore for InMemoryRegistrationStore {
    fn begin(&self) -> StoreFuture<'_, Box<dyn StoreTransaction>> {
        let state = Arc::clone(&self.state);
        let fail_bulk_updates = Arc::clone(&self.fail_bulk_updates);

        Box::pin(async move {
            let guard = state.lock_owned().await;
            let working = guard.clone();
            Ok(Box::new(InMemoryTransaction {
                guard,
                working,
                fail_bulk_updates,
            }) as Box<dyn StoreTransaction>)
        })
    }
}

/// Transaction over [`InMemoryRegistrationStore`]. Holds the store lock until it
/// is committed or dropped.
struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_bulk_updates: Arc<AtomicBool>,
}

impl StoreTransaction for InMemoryTransaction {
    fn get_event(&mut self, event_id: EventId) -> StoreFuture<'_, Option<Event>> {
        Box::pin(ready(Ok(self.working.events.get(&event_id).cloned())))
    }

    fn lock_event(&mut self, event_id: EventId) -> StoreFuture<'_, Option<Event>> {
        // The whole store is already locked for this transaction.
        self.get_event(event_id)
    }

    fn insert_event(&mut self, event: NewEvent) -> StoreFuture<'_, Event> {
        let event = event.into_event();
        self.working.events.insert(event.id, event.clone());
        Box::pin(ready(Ok(event)))
    }

    fn update_event(&mut self, event: Event) -> StoreFuture<'_, bool> {
        let updated = self
            .working
            .events
            .get_mut(&event.id)
            .map(|stored| {
                stored.name = event.name;
                stored.description = event.description;
                stored.date = event.date;
                stored.place = event.place;
            })
            .is_some();
        Box::pin(ready(Ok(updated)))
    }

    fn list_upcoming_events(&mut self, from: NaiveDate) -> StoreFuture<'_, Vec<(Event, u32)>> {
        let mut upcoming: Vec<(Event, u32)> = self
            .working
            .events
            .values()
            .filter(|e| e.date >= from)
            .map(|e| {
                let accepted = self.working.count(e.id, RegistrationStatus::Accepted);
                (e.clone(), accepted)
            })
            .collect();
        upcoming.sort_by(|(a, _), (b, _)| {
            a.date
                .cmp(&b.date)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Box::pin(ready(Ok(upcoming)))
    }

    fn delete_event(&mut self, event_id: EventId) -> StoreFuture<'_, Option<u64>> {
        let result = self.working.events.remove(&event_id).map(|_| {
            let before = self.working.registrations.len();
            self.working
                .registrations
                .retain(|_, r| r.event_id != event_id);
            (before - self.working.registrations.len()) as u64
        });
        Box::pin(ready(Ok(result)))
    }

    fn get_registration(
        &mut self,
        registration_id: RegistrationId,
    ) -> StoreFuture<'_, Option<Registration>> {
        Box::pin(ready(Ok(self
            .working
            .registrations
            .get(&registration_id)
            .cloned())))
    }

    fn lock_registration(
        &mut self,
        registration_id: RegistrationId,
    ) -> StoreFuture<'_, Option<Registration>> {
        self.get_registration(registration_id)
    }

    fn find_registration(
        &mut self,
        event_id: EventId,
        volunteer_id: UserId,
    ) -> StoreFuture<'_, Option<Registration>> {
        let found = self
            .working
            .registrations
            .values()
            .find(|r| r.event_id == event_id && r.volunteer_id == volunteer_id)
            .cloned();
        Box::pin(ready(Ok(found)))
    }

    fn create_registration(
        &mut self,
        registration: NewRegistration,
    ) -> StoreFuture<'_, Registration> {
        let duplicate = self.working.registrations.values().any(|r| {
            r.event_id == registration.event_id && r.volunteer_id == registration.volunteer_id
        });

        let result = if duplicate {
            Err(StoreError::Duplicate {
                event_id: registration.event_id,
                volunteer_id: registration.volunteer_id,
            })
        } else if !self.working.events.contains_key(&registration.event_id) {
            Err(StoreError::Database(format!(
                "foreign key violation: event {} does not exist",
                registration.event_id
            )))
        } else {
            let registration = registration.into_registration();
            self.working
                .registrations
                .insert(registration.id, registration.clone());
            Ok(registration)
        };

        Box::pin(ready(result))
    }

    fn count_by_status(
        &mut self,
        event_id: EventId,
        status: RegistrationStatus,
    ) -> StoreFuture<'_, u32> {
        Box::pin(ready(Ok(self.working.count(event_id, status))))
    }

    fn set_status(
        &mut self,
        registration_id: RegistrationId,
        status: RegistrationStatus,
    ) -> StoreFuture<'_, bool> {
        let updated = self
            .working
            .registrations
            .get_mut(&registration_id)
            .map(|r| r.status = status)
            .is_some();
        Box::pin(ready(Ok(updated)))
    }

    fn bulk_set_status(
        &mut self,
        event_id: EventId,
        from: RegistrationStatus,
        to: RegistrationStatus,
    ) -> StoreFuture<'_, u64> {
        if self.fail_bulk_updates.load(Ordering::SeqCst) {
            return Box::pin(ready(Err(StoreError::Database(
                "injected bulk update failure".to_string(),
            ))));
        }

        let mut changed = 0;
        for registration in self.working.registrations.values_mut() {
            if registration.event_id == event_id && registration.status == from {
                registration.status = to;
                changed += 1;
            }
        }
        Box::pin(ready(Ok(changed)))
    }

    fn list_registrations(
        &mut self,
        event_id: EventId,
        status: Option<RegistrationStatus>,
    ) -> StoreFuture<'_, Vec<Registration>> {
        let mut found: Vec<Registration> = self
            .working
            .registrations
            .values()
            .filter(|r| r.event_id == event_id && status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Box::pin(ready(Ok(found)))
    }

    fn delete_registrations_for_volunteer(
        &mut self,
        volunteer_id: UserId,
    ) -> StoreFuture<'_, u64> {
        let before = self.working.registrations.len();
        self.working
            .registrations
            .retain(|_, r| r.volunteer_id != volunteer_id);
        let removed = (before - self.working.registrations.len()) as u64;
        Box::pin(ready(Ok(removed)))
    }

    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        let Self {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Box::pin(ready(Ok(())))
    }
}
