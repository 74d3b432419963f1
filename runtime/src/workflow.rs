//! The registration workflow engine.
//!
//! Every public operation:
//!
//! 1. checks the actor's role,
//! 2. opens one store transaction and takes the event row lock,
//! 3. re-reads whatever its decision depends on and applies the pure rules in
//!    [`rollcall_core::transition`],
//! 4. writes and commits.
//!
//! Any error drops the transaction, so accept and its quota-fill cascade either
//! both commit or both roll back. Transient store conflicts are retried with
//! the engine's [`RetryPolicy`].

use crate::metrics::WorkflowMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use rollcall_core::environment::Clock;
use rollcall_core::error::{Operation, WorkflowError};
use rollcall_core::store::{RegistrationStore, StoreError, StoreTransaction};
use rollcall_core::transition::{
    RejectDecision, authorize, check_accept, check_apply, check_event_draft, check_event_update,
    check_reject, may_see_contact, quota_filled,
};
use rollcall_core::types::{
    Actor, Event, EventDraft, EventId, NewEvent, NewRegistration, Registration, RegistrationId,
    RegistrationStatus, UserId,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// Result of a successful accept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AcceptOutcome {
    /// The registration, now `accepted`
    pub registration: Registration,
    /// Accepted registrations of the event after this accept
    pub accepted_count: u32,
    /// The event's capacity
    pub capacity: u32,
    /// Pending registrations rejected because this accept filled the event
    pub cascaded_rejections: u64,
}

impl AcceptOutcome {
    /// Whether this accept took the last slot.
    #[must_use]
    pub const fn filled_event(&self) -> bool {
        quota_filled(self.accepted_count, self.capacity)
    }
}

/// Result of a successful reject.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RejectOutcome {
    /// The registration moved from `pending` to `rejected`
    Rejected {
        /// The registration after the update
        registration: Registration,
    },
    /// The registration was already `rejected`; nothing was written
    AlreadyRejected {
        /// The registration as stored
        registration: Registration,
    },
}

impl RejectOutcome {
    /// The rejected registration.
    #[must_use]
    pub const fn registration(&self) -> &Registration {
        match self {
            Self::Rejected { registration } | Self::AlreadyRejected { registration } => {
                registration
            },
        }
    }
}

/// One entry of the upcoming-events listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpcomingEvent {
    /// The event
    pub event: Event,
    /// Number of accepted registrations
    pub accepted_count: u32,
    /// Slots still open
    pub remaining_slots: u32,
}

/// Everything an event page shows.
///
/// Contact information is only included for registrations the viewer may see
/// it on: all of them for moderators and admins, their own for volunteers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventOverview {
    /// The event
    pub event: Event,
    /// Accepted registrations, oldest first
    pub accepted: Vec<Registration>,
    /// Pending registrations, oldest first
    pub pending: Vec<Registration>,
    /// Number of accepted registrations
    pub accepted_count: u32,
    /// Slots still open
    pub remaining_slots: u32,
    /// The viewer's own registration, whatever its status
    pub viewer_registration: Option<Registration>,
}

/// Capacity-aware registration workflow.
///
/// Holds no state between calls; every decision is taken from rows read inside
/// the transaction that acts on it.
///
/// # Example
///
/// ```ignore
/// let workflow = RegistrationWorkflow::new(store, Arc::new(SystemClock));
/// let event = workflow.create_event(admin, draft).await?;
/// let registration = workflow.apply(volunteer, event.id, "vol@example.com").await?;
/// let outcome = workflow.accept(moderator, registration.id).await?;
/// ```
#[derive(Clone)]
pub struct RegistrationWorkflow {
    store: Arc<dyn RegistrationStore>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for RegistrationWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationWorkflow")
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

impl RegistrationWorkflow {
    /// Create an engine over `store`, stamping rows with `clock`.
    #[must_use]
    pub fn new(store: Arc<dyn RegistrationStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy for transient store conflicts.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// The active retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    async fn with_retry<T, F, Fut>(&self, attempt: F) -> Result<T, WorkflowError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, WorkflowError>>,
    {
        retry_with_predicate(
            self.retry_policy.clone(),
            attempt,
            WorkflowError::is_retryable,
        )
        .await
    }

    // ========================================================================
    // Registration lifecycle
    // ========================================================================

    /// A volunteer applies to an event.
    ///
    /// Creates a `pending` registration stamped with the engine's clock.
    ///
    /// # Errors
    ///
    /// Checked in this order:
    /// - [`WorkflowError::Permission`] unless the actor is a volunteer
    /// - [`WorkflowError::NotFound`] if the event does not exist
    /// - [`WorkflowError::DuplicateApplication`] if the volunteer already applied
    /// - [`WorkflowError::CapacityExceeded`] if the event is full
    /// - [`WorkflowError::InvalidInput`] if the contact is blank
    #[tracing::instrument(skip(self, contact), fields(actor_id = %actor.id, role = %actor.role))]
    pub async fn apply(
        &self,
        actor: Actor,
        event_id: EventId,
        contact: &str,
    ) -> Result<Registration, WorkflowError> {
        let result = match authorize(actor.role, Operation::Apply) {
            Ok(()) => {
                self.with_retry(|| self.try_apply(actor.id, event_id, contact))
                    .await
            },
            Err(err) => Err(err),
        };
        WorkflowMetrics::record_outcome(Operation::Apply, &result, "applied");
        result
    }

    async fn try_apply(
        &self,
        volunteer_id: UserId,
        event_id: EventId,
        contact: &str,
    ) -> Result<Registration, WorkflowError> {
        let mut tx = self.store.begin().await?;

        let event = tx
            .lock_event(event_id)
            .await?
            .ok_or_else(|| WorkflowError::event_not_found(event_id))?;
        let existing = tx.find_registration(event_id, volunteer_id).await?;
        let accepted = tx
            .count_by_status(event_id, RegistrationStatus::Accepted)
            .await?;

        let contact = check_apply(&event, volunteer_id, existing.as_ref(), accepted, contact)?;

        let registration = tx
            .create_registration(NewRegistration {
                id: RegistrationId::new(),
                event_id,
                volunteer_id,
                contact,
                created_at: self.clock.now(),
            })
            .await
            .map_err(|err| match err {
                // Lost a race against the same volunteer's other request.
                StoreError::Duplicate {
                    event_id,
                    volunteer_id,
                } => WorkflowError::DuplicateApplication {
                    event_id,
                    volunteer_id,
                },
                other => WorkflowError::Store(other),
            })?;

        tx.commit().await?;

        tracing::info!(registration_id = %registration.id, "Volunteer applied");
        Ok(registration)
    }

    /// A moderator accepts a pending registration.
    ///
    /// When this accept brings the event's accepted count to its capacity, every
    /// other pending registration of the event is rejected in the same transaction.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Permission`] unless the actor is a moderator or admin
    /// - [`WorkflowError::NotFound`] if the registration does not exist
    /// - [`WorkflowError::WrongState`] if it is already accepted, or rejected while
    ///   slots remain
    /// - [`WorkflowError::CapacityExceeded`] if no slot is left
    /// - [`WorkflowError::Store`] if the update or the cascade fails; nothing is changed
    #[tracing::instrument(skip(self), fields(actor_id = %actor.id, role = %actor.role))]
    pub async fn accept(
        &self,
        actor: Actor,
        registration_id: RegistrationId,
    ) -> Result<AcceptOutcome, WorkflowError> {
        let result = match authorize(actor.role, Operation::Accept) {
            Ok(()) => self.with_retry(|| self.try_accept(registration_id)).await,
            Err(err) => Err(err),
        };
        WorkflowMetrics::record_outcome(Operation::Accept, &result, "accepted");
        if let Ok(outcome) = &result {
            WorkflowMetrics::record_cascade(outcome.cascaded_rejections);
        }
        result
    }

    async fn try_accept(
        &self,
        registration_id: RegistrationId,
    ) -> Result<AcceptOutcome, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let (event, registration) = lock_target(&mut tx, registration_id).await?;

        let accepted = tx
            .count_by_status(event.id, RegistrationStatus::Accepted)
            .await?;
        check_accept(&registration, accepted, event.capacity)?;

        if !tx
            .set_status(registration_id, RegistrationStatus::Accepted)
            .await?
        {
            return Err(WorkflowError::registration_not_found(registration_id));
        }

        let accepted_count = tx
            .count_by_status(event.id, RegistrationStatus::Accepted)
            .await?;

        let cascaded_rejections = if quota_filled(accepted_count, event.capacity) {
            tx.bulk_set_status(
                event.id,
                RegistrationStatus::Pending,
                RegistrationStatus::Rejected,
            )
            .await?
        } else {
            0
        };

        tx.commit().await?;

        tracing::info!(
            event_id = %event.id,
            accepted_count,
            capacity = event.capacity,
            "Registration accepted"
        );
        if cascaded_rejections > 0 {
            tracing::info!(
                event_id = %event.id,
                cascaded_rejections,
                "Event filled, rejected remaining pending registrations"
            );
        }

        Ok(AcceptOutcome {
            registration: Registration {
                status: RegistrationStatus::Accepted,
                ..registration
            },
            accepted_count,
            capacity: event.capacity,
            cascaded_rejections,
        })
    }

    /// A moderator rejects a registration.
    ///
    /// Rejecting an already rejected registration succeeds without writing.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Permission`] unless the actor is a moderator or admin
    /// - [`WorkflowError::NotFound`] if the registration does not exist
    /// - [`WorkflowError::WrongState`] if the registration is accepted
    #[tracing::instrument(skip(self), fields(actor_id = %actor.id, role = %actor.role))]
    pub async fn reject(
        &self,
        actor: Actor,
        registration_id: RegistrationId,
    ) -> Result<RejectOutcome, WorkflowError> {
        let result = match authorize(actor.role, Operation::Reject) {
            Ok(()) => self.with_retry(|| self.try_reject(registration_id)).await,
            Err(err) => Err(err),
        };
        let success = match &result {
            Ok(RejectOutcome::AlreadyRejected { .. }) => "already_rejected",
            _ => "rejected",
        };
        WorkflowMetrics::record_outcome(Operation::Reject, &result, success);
        result
    }

    async fn try_reject(
        &self,
        registration_id: RegistrationId,
    ) -> Result<RejectOutcome, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let (_event, registration) = lock_target(&mut tx, registration_id).await?;

        match check_reject(&registration)? {
            RejectDecision::AlreadyRejected => {
                tracing::debug!("Registration already rejected");
                Ok(RejectOutcome::AlreadyRejected { registration })
            },
            RejectDecision::Transition => {
                if !tx
                    .set_status(registration_id, RegistrationStatus::Rejected)
                    .await?
                {
                    return Err(WorkflowError::registration_not_found(registration_id));
                }
                tx.commit().await?;

                tracing::info!(event_id = %registration.event_id, "Registration rejected");
                Ok(RejectOutcome::Rejected {
                    registration: Registration {
                        status: RegistrationStatus::Rejected,
                        ..registration
                    },
                })
            },
        }
    }

    // ========================================================================
    // Event administration
    // ========================================================================

    /// An admin creates an event; the admin becomes its organizer.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Permission`] unless the actor is an admin
    /// - [`WorkflowError::InvalidInput`] for a blank name or place, or zero volunteers
    #[tracing::instrument(skip(self, draft), fields(actor_id = %actor.id, role = %actor.role))]
    pub async fn create_event(
        &self,
        actor: Actor,
        draft: EventDraft,
    ) -> Result<Event, WorkflowError> {
        let result = self.try_create_event(actor, draft).await;
        WorkflowMetrics::record_outcome(Operation::CreateEvent, &result, "created");
        result
    }

    async fn try_create_event(
        &self,
        actor: Actor,
        draft: EventDraft,
    ) -> Result<Event, WorkflowError> {
        authorize(actor.role, Operation::CreateEvent)?;
        let draft = check_event_draft(draft)?;

        let new_event = NewEvent {
            id: EventId::new(),
            name: draft.name,
            description: draft.description,
            date: draft.date,
            place: draft.place,
            capacity: draft.volunteers_required,
            organizer_id: actor.id,
            created_at: self.clock.now(),
        };

        let event = self
            .with_retry(|| {
                let new_event = new_event.clone();
                async move {
                    let mut tx = self.store.begin().await?;
                    let event = tx.insert_event(new_event).await?;
                    tx.commit().await?;
                    Ok(event)
                }
            })
            .await?;

        tracing::info!(event_id = %event.id, capacity = event.capacity, "Event created");
        Ok(event)
    }

    /// An admin or moderator edits an event's name, description, date and place.
    ///
    /// `draft.volunteers_required` must equal the event's current capacity.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Permission`] unless the actor is an admin or moderator
    /// - [`WorkflowError::NotFound`] if the event does not exist
    /// - [`WorkflowError::InvalidInput`] for a blank name or place, or a capacity change
    #[tracing::instrument(skip(self, draft), fields(actor_id = %actor.id, role = %actor.role))]
    pub async fn update_event(
        &self,
        actor: Actor,
        event_id: EventId,
        draft: EventDraft,
    ) -> Result<Event, WorkflowError> {
        let result = match authorize(actor.role, Operation::UpdateEvent) {
            Ok(()) => {
                self.with_retry(|| {
                    let draft = draft.clone();
                    async move {
                        let mut tx = self.store.begin().await?;
                        let event = tx
                            .lock_event(event_id)
                            .await?
                            .ok_or_else(|| WorkflowError::event_not_found(event_id))?;
                        let updated = check_event_update(&event, draft)?;
                        if !tx.update_event(updated.clone()).await? {
                            return Err(WorkflowError::event_not_found(event_id));
                        }
                        tx.commit().await?;
                        Ok(updated)
                    }
                })
                .await
            },
            Err(err) => Err(err),
        };

        if let Ok(event) = &result {
            tracing::info!(event_id = %event.id, date = %event.date, "Event updated");
        }
        WorkflowMetrics::record_outcome(Operation::UpdateEvent, &result, "updated");
        result
    }

    /// An admin deletes an event together with all its registrations.
    ///
    /// Returns the number of registrations removed.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Permission`] unless the actor is an admin
    /// - [`WorkflowError::NotFound`] if the event does not exist
    #[tracing::instrument(skip(self), fields(actor_id = %actor.id, role = %actor.role))]
    pub async fn delete_event(&self, actor: Actor, event_id: EventId) -> Result<u64, WorkflowError> {
        let result = match authorize(actor.role, Operation::DeleteEvent) {
            Ok(()) => {
                self.with_retry(|| async move {
                    let mut tx = self.store.begin().await?;
                    let removed = tx
                        .delete_event(event_id)
                        .await?
                        .ok_or_else(|| WorkflowError::event_not_found(event_id))?;
                    tx.commit().await?;
                    Ok(removed)
                })
                .await
            },
            Err(err) => Err(err),
        };

        if let Ok(removed) = &result {
            tracing::info!(removed_registrations = *removed, "Event deleted");
        }
        WorkflowMetrics::record_outcome(Operation::DeleteEvent, &result, "deleted");
        result
    }

    /// An admin removes every registration of a volunteer whose account is gone.
    ///
    /// Returns the number of registrations removed. Accepted slots they held open up again.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Permission`] unless the actor is an admin
    #[tracing::instrument(skip(self), fields(actor_id = %actor.id, role = %actor.role))]
    pub async fn forget_volunteer(
        &self,
        actor: Actor,
        volunteer_id: UserId,
    ) -> Result<u64, WorkflowError> {
        let result = match authorize(actor.role, Operation::ForgetVolunteer) {
            Ok(()) => {
                self.with_retry(|| async move {
                    let mut tx = self.store.begin().await?;
                    let removed = tx.delete_registrations_for_volunteer(volunteer_id).await?;
                    tx.commit().await?;
                    Ok(removed)
                })
                .await
            },
            Err(err) => Err(err),
        };

        if let Ok(removed) = &result {
            tracing::info!(
                removed_registrations = *removed,
                "Volunteer registrations removed"
            );
        }
        WorkflowMetrics::record_outcome(Operation::ForgetVolunteer, &result, "forgotten");
        result
    }

    /// Events dated today or later, soonest first, with their accepted counts.
    ///
    /// "Today" is the UTC date of the engine's clock. Anyone may list events.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Store`] if the events cannot be read
    #[tracing::instrument(skip(self))]
    pub async fn list_upcoming_events(&self) -> Result<Vec<UpcomingEvent>, WorkflowError> {
        let today = self.clock.now().date_naive();

        let listed = self
            .with_retry(|| async move {
                let mut tx = self.store.begin().await?;
                let listed = tx.list_upcoming_events(today).await?;
                drop(tx);
                Ok(listed)
            })
            .await?;

        tracing::debug!(%today, count = listed.len(), "Listed upcoming events");
        Ok(listed
            .into_iter()
            .map(|(event, accepted_count)| UpcomingEvent {
                remaining_slots: event.capacity.saturating_sub(accepted_count),
                accepted_count,
                event,
            })
            .collect())
    }

    /// Read an event with its accepted and pending registrations.
    ///
    /// `viewer` is the caller, if known; their own registration is returned
    /// whatever its status. Anyone may read an overview, but contacts are
    /// withheld from registrations the viewer may not see them on.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`] if the event does not exist
    #[tracing::instrument(skip(self))]
    pub async fn event_overview(
        &self,
        event_id: EventId,
        viewer: Option<Actor>,
    ) -> Result<EventOverview, WorkflowError> {
        self.with_retry(|| self.try_event_overview(event_id, viewer))
            .await
    }

    async fn try_event_overview(
        &self,
        event_id: EventId,
        viewer: Option<Actor>,
    ) -> Result<EventOverview, WorkflowError> {
        let mut tx = self.store.begin().await?;

        let event = tx
            .get_event(event_id)
            .await?
            .ok_or_else(|| WorkflowError::event_not_found(event_id))?;
        let registrations: Vec<Registration> = tx
            .list_registrations(event_id, None)
            .await?
            .into_iter()
            .map(|r| {
                if may_see_contact(viewer.as_ref(), &r) {
                    r
                } else {
                    r.without_contact()
                }
            })
            .collect();
        drop(tx);

        let viewer_registration = viewer.and_then(|viewer| {
            registrations
                .iter()
                .find(|r| r.volunteer_id == viewer.id)
                .cloned()
        });

        let (accepted, rest): (Vec<_>, Vec<_>) = registrations
            .into_iter()
            .partition(|r| r.status == RegistrationStatus::Accepted);
        let pending: Vec<_> = rest
            .into_iter()
            .filter(|r| r.status == RegistrationStatus::Pending)
            .collect();

        let accepted_count = u32::try_from(accepted.len()).unwrap_or(u32::MAX);
        let remaining_slots = event.capacity.saturating_sub(accepted_count);

        Ok(EventOverview {
            event,
            accepted,
            pending,
            accepted_count,
            remaining_slots,
            viewer_registration,
        })
    }
}

/// Lock the registration's event, then the registration itself.
///
/// The event lock comes first so accepts, rejects and cascades on one event
/// always acquire locks in the same order.
async fn lock_target(
    tx: &mut Box<dyn StoreTransaction>,
    registration_id: RegistrationId,
) -> Result<(Event, Registration), WorkflowError> {
    let target = tx
        .get_registration(registration_id)
        .await?
        .ok_or_else(|| WorkflowError::registration_not_found(registration_id))?;

    let event = tx
        .lock_event(target.event_id)
        .await?
        .ok_or_else(|| WorkflowError::event_not_found(target.event_id))?;

    // Re-read under lock; the row may have changed or gone since the first read.
    let registration = tx
        .lock_registration(registration_id)
        .await?
        .ok_or_else(|| WorkflowError::registration_not_found(registration_id))?;

    Ok((event, registration))
}
