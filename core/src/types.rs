//! Domain types for volunteer coordination.
//!
//! Events carry a fixed number of volunteer slots. Registrations are a single
//! volunteer's application to one event and move from `pending` to exactly one
//! terminal status.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for an event
    EventId
);

define_id!(
    /// Unique identifier for a registration
    RegistrationId
);

define_id!(
    /// Identity of an external user (volunteer, organizer, moderator or admin)
    UserId
);

// ============================================================================
// Status & Roles
// ============================================================================

/// Status of a registration.
///
/// `Pending` is the only non-terminal status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// Waiting for a moderator decision
    Pending,
    /// Holds one of the event's slots
    Accepted,
    /// Declined, either directly or by the quota-fill cascade
    Rejected,
}

impl RegistrationStatus {
    /// Convert status to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    /// Whether no further transitions are defined from this status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for status and role parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl FromStr for RegistrationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseEnumError {
                kind: "registration status",
                value: other.to_string(),
            }),
        }
    }
}

/// Capability level of the caller invoking an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    /// Plain user who may apply to events
    Volunteer,
    /// May accept and reject registrations
    Moderator,
    /// Full control, including event administration
    Admin,
}

impl ActorRole {
    /// Role name as used in headers and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Volunteer => "volunteer",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    /// Admins and moderators decide on registrations.
    #[must_use]
    pub const fn can_moderate(&self) -> bool {
        matches!(self, Self::Moderator | Self::Admin)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "volunteer" => Ok(Self::Volunteer),
            "moderator" => Ok(Self::Moderator),
            "admin" => Ok(Self::Admin),
            _ => Err(ParseEnumError {
                kind: "actor role",
                value: s.to_string(),
            }),
        }
    }
}

/// The authenticated caller, as supplied by whoever invokes the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Caller identity
    pub id: UserId,
    /// Caller capability
    pub role: ActorRole,
}

impl Actor {
    /// Create a new actor.
    #[must_use]
    pub const fn new(id: UserId, role: ActorRole) -> Self {
        Self { id, role }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A capacity-bounded activity volunteers register for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event ID
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Free-form description (rendering happens elsewhere)
    pub description: String,
    /// Day the event takes place
    pub date: NaiveDate,
    /// Where it takes place
    pub place: String,
    /// Number of volunteer slots (`volunteers_required`), always at least 1
    pub capacity: u32,
    /// User who created the event
    pub organizer_id: UserId,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A single volunteer's application to an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Registration ID
    pub id: RegistrationId,
    /// Event applied to
    pub event_id: EventId,
    /// Applicant
    pub volunteer_id: UserId,
    /// How the organizer can reach the volunteer. Empty when withheld from the reader.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub contact: String,
    /// Current status
    pub status: RegistrationStatus,
    /// When the application was submitted
    pub created_at: DateTime<Utc>,
}

impl Registration {
    /// The same registration with its contact information removed.
    #[must_use]
    pub fn without_contact(self) -> Self {
        Self {
            contact: String::new(),
            ..self
        }
    }
}

/// Event details supplied by an admin; validated before becoming a [`NewEvent`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Display name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Event date
    pub date: NaiveDate,
    /// Location
    pub place: String,
    /// Volunteer slots
    pub volunteers_required: u32,
}

/// Values for a new event row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEvent {
    /// Pre-generated event ID
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Description
    pub description: String,
    /// Event date
    pub date: NaiveDate,
    /// Location
    pub place: String,
    /// Volunteer slots
    pub capacity: u32,
    /// Creating user
    pub organizer_id: UserId,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl NewEvent {
    /// Materialize the stored event.
    #[must_use]
    pub fn into_event(self) -> Event {
        Event {
            id: self.id,
            name: self.name,
            description: self.description,
            date: self.date,
            place: self.place,
            capacity: self.capacity,
            organizer_id: self.organizer_id,
            created_at: self.created_at,
        }
    }
}

/// Values for a new registration row. Registrations are always created `pending`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRegistration {
    /// Pre-generated registration ID
    pub id: RegistrationId,
    /// Event applied to
    pub event_id: EventId,
    /// Applicant
    pub volunteer_id: UserId,
    /// Contact information, already trimmed
    pub contact: String,
    /// Submission timestamp
    pub created_at: DateTime<Utc>,
}

impl NewRegistration {
    /// Materialize the stored registration.
    #[must_use]
    pub fn into_registration(self) -> Registration {
        Registration {
            id: self.id,
            event_id: self.event_id,
            volunteer_id: self.volunteer_id,
            contact: self.contact,
            status: RegistrationStatus::Pending,
            created_at: self.created_at,
        }
    }
}
