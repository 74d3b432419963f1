//! Registration state machine rules.
//!
//! These functions decide whether an operation may proceed given the state the
//! engine has just read under lock. They perform no I/O, so every branch of the
//! workflow can be tested without a store.
//!
//! ```text
//!            accept (slots left)
//!   pending ────────────────────▶ accepted
//!      │
//!      │ reject, or quota-fill cascade
//!      ▼
//!   rejected
//! ```

use crate::error::{Operation, WorkflowError};
use crate::types::{
    Actor, ActorRole, Event, EventDraft, Registration, RegistrationStatus, UserId,
};

/// Check that `role` may perform `operation`.
///
/// # Errors
///
/// Returns [`WorkflowError::Permission`] when the role lacks the capability.
pub const fn authorize(role: ActorRole, operation: Operation) -> Result<(), WorkflowError> {
    let allowed = match operation {
        Operation::Apply => matches!(role, ActorRole::Volunteer),
        Operation::Accept | Operation::Reject | Operation::UpdateEvent => role.can_moderate(),
        Operation::CreateEvent | Operation::DeleteEvent | Operation::ForgetVolunteer => {
            matches!(role, ActorRole::Admin)
        },
    };

    if allowed {
        Ok(())
    } else {
        Err(WorkflowError::Permission { role, operation })
    }
}

/// Whether `viewer` may read the contact information of `registration`.
///
/// Moderators and admins see every contact; a volunteer sees only their own.
#[must_use]
pub fn may_see_contact(viewer: Option<&Actor>, registration: &Registration) -> bool {
    viewer.is_some_and(|viewer| {
        viewer.role.can_moderate() || viewer.id == registration.volunteer_id
    })
}

/// Whether `accepted` registrations fill an event of `capacity` slots.
#[must_use]
pub const fn quota_filled(accepted: u32, capacity: u32) -> bool {
    accepted >= capacity
}

/// Decide whether a volunteer may apply. Returns the trimmed contact string.
///
/// Checks run in the order the caller sees them: duplicate, capacity, contact.
///
/// # Errors
///
/// - [`WorkflowError::DuplicateApplication`] if `existing` is present
/// - [`WorkflowError::CapacityExceeded`] if the event is full
/// - [`WorkflowError::InvalidInput`] if the contact is blank
pub fn check_apply(
    event: &Event,
    volunteer_id: UserId,
    existing: Option<&Registration>,
    accepted: u32,
    contact: &str,
) -> Result<String, WorkflowError> {
    if existing.is_some() {
        return Err(WorkflowError::DuplicateApplication {
            event_id: event.id,
            volunteer_id,
        });
    }

    if quota_filled(accepted, event.capacity) {
        return Err(WorkflowError::CapacityExceeded {
            event_id: event.id,
            capacity: event.capacity,
        });
    }

    let contact = contact.trim();
    if contact.is_empty() {
        return Err(WorkflowError::InvalidInput(
            "contact information is required".to_string(),
        ));
    }

    Ok(contact.to_string())
}

/// Decide whether a registration may be accepted.
///
/// An already accepted registration is reported as such even when the event is
/// full. Otherwise a full event wins over the registration's own status, so the
/// loser of a race for the last slot sees `CapacityExceeded` even though the
/// winner's cascade has already rejected its registration.
///
/// # Errors
///
/// - [`WorkflowError::WrongState`] for accepted registrations, and for rejected
///   ones while slots remain
/// - [`WorkflowError::CapacityExceeded`] if no slot is left
pub const fn check_accept(
    registration: &Registration,
    accepted: u32,
    capacity: u32,
) -> Result<(), WorkflowError> {
    if matches!(registration.status, RegistrationStatus::Accepted) {
        return Err(WorkflowError::WrongState {
            registration_id: registration.id,
            status: registration.status,
        });
    }

    if quota_filled(accepted, capacity) {
        return Err(WorkflowError::CapacityExceeded {
            event_id: registration.event_id,
            capacity,
        });
    }

    match registration.status {
        RegistrationStatus::Pending => Ok(()),
        status => Err(WorkflowError::WrongState {
            registration_id: registration.id,
            status,
        }),
    }
}

/// What a reject call has to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectDecision {
    /// Move the registration from pending to rejected
    Transition,
    /// Nothing to write; rejecting twice is allowed
    AlreadyRejected,
}

/// Decide whether a registration may be rejected.
///
/// # Errors
///
/// Returns [`WorkflowError::WrongState`] for accepted registrations.
pub const fn check_reject(registration: &Registration) -> Result<RejectDecision, WorkflowError> {
    match registration.status {
        RegistrationStatus::Pending => Ok(RejectDecision::Transition),
        RegistrationStatus::Rejected => Ok(RejectDecision::AlreadyRejected),
        RegistrationStatus::Accepted => Err(WorkflowError::WrongState {
            registration_id: registration.id,
            status: registration.status,
        }),
    }
}

/// Validate an edit of `event` and return the event as it will be stored.
///
/// The edit must repeat the event's current `volunteers_required`: capacity is
/// fixed at creation because the quota-fill cascade may already have run.
///
/// # Errors
///
/// Returns [`WorkflowError::InvalidInput`] if the draft is invalid or changes capacity.
pub fn check_event_update(event: &Event, draft: EventDraft) -> Result<Event, WorkflowError> {
    let draft = check_event_draft(draft)?;
    if draft.volunteers_required != event.capacity {
        return Err(WorkflowError::InvalidInput(format!(
            "volunteers_required cannot be changed (event has {} slots)",
            event.capacity
        )));
    }

    Ok(Event {
        name: draft.name,
        description: draft.description,
        date: draft.date,
        place: draft.place,
        ..event.clone()
    })
}

/// Validate and normalise an admin's event draft.
///
/// # Errors
///
/// Returns [`WorkflowError::InvalidInput`] for a blank name or place, or zero capacity.
pub fn check_event_draft(draft: EventDraft) -> Result<EventDraft, WorkflowError> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(WorkflowError::InvalidInput("event name is required".to_string()));
    }

    let place = draft.place.trim();
    if place.is_empty() {
        return Err(WorkflowError::InvalidInput("event place is required".to_string()));
    }

    if draft.volunteers_required == 0 {
        return Err(WorkflowError::InvalidInput(
            "an event needs at least one volunteer".to_string(),
        ));
    }

    Ok(EventDraft {
        name: name.to_string(),
        description: draft.description,
        date: draft.date,
        place: place.to_string(),
        volunteers_required: draft.volunteers_required,
    })
}
