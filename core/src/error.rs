//! Error taxonomy for workflow operations.
//!
//! Every error is local to a single operation. Whatever the variant, the store
//! transaction the operation was running in is dropped and therefore rolled back.

use crate::store::StoreError;
use crate::types::{ActorRole, EventId, RegistrationId, RegistrationStatus, UserId};
use thiserror::Error;

/// Operation names used in permission errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Volunteer applies to an event
    Apply,
    /// Moderator accepts a registration
    Accept,
    /// Moderator rejects a registration
    Reject,
    /// Admin creates an event
    CreateEvent,
    /// Admin or moderator edits an event's details
    UpdateEvent,
    /// Admin deletes an event
    DeleteEvent,
    /// Admin removes all registrations of a volunteer
    ForgetVolunteer,
}

impl Operation {
    /// Operation name as used in logs and metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::CreateEvent => "create_event",
            Self::UpdateEvent => "update_event",
            Self::DeleteEvent => "delete_event",
            Self::ForgetVolunteer => "forget_volunteer",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the registration workflow.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Referenced event or registration does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of entity ("event", "registration")
        resource: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The volunteer already has a registration for this event.
    #[error("Volunteer {volunteer_id} has already applied to event {event_id}")]
    DuplicateApplication {
        /// Event applied to
        event_id: EventId,
        /// Applicant
        volunteer_id: UserId,
    },

    /// Every slot of the event is already taken.
    #[error("Event {event_id} already has all {capacity} volunteers it needs")]
    CapacityExceeded {
        /// Full event
        event_id: EventId,
        /// Its capacity
        capacity: u32,
    },

    /// The registration is not in a status the operation can start from.
    #[error("Registration {registration_id} is already {status}")]
    WrongState {
        /// Target registration
        registration_id: RegistrationId,
        /// Its current status
        status: RegistrationStatus,
    },

    /// The actor's role does not allow the operation.
    #[error("Role {role} may not {operation}")]
    Permission {
        /// Caller role
        role: ActorRole,
        /// Attempted operation
        operation: Operation,
    },

    /// Input failed validation (empty contact, zero capacity, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage layer failure. The transaction has been rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// Shorthand for a missing event.
    #[must_use]
    pub fn event_not_found(id: EventId) -> Self {
        Self::NotFound {
            resource: "event",
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing registration.
    #[must_use]
    pub fn registration_not_found(id: RegistrationId) -> Self {
        Self::NotFound {
            resource: "registration",
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code, used in API responses and metric labels.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::DuplicateApplication { .. } => "duplicate_application",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::WrongState { .. } => "wrong_state",
            Self::Permission { .. } => "permission_denied",
            Self::InvalidInput(_) => "invalid_input",
            Self::Store(StoreError::Conflict(_)) => "conflict",
            Self::Store(_) => "store_error",
        }
    }

    /// Whether retrying the whole operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict(_)))
    }
}
