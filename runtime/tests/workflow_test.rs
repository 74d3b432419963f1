//! Integration tests for the registration workflow.
//!
//! Runs the engine against the in-memory store: the registration lifecycle,
//! the quota-fill cascade, permissions, rollback and conflict retries.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use rollcall_core::error::WorkflowError;
use rollcall_core::store::{RegistrationStore, StoreError, StoreFuture, StoreTransaction};
use chrono::NaiveDate;
use rollcall_core::types::{Event, EventDraft, EventId, RegistrationStatus};
use rollcall_runtime::{RegistrationWorkflow, RejectOutcome, RetryPolicy};
use rollcall_testing::helpers::{admin, event_draft, moderator, volunteer};
use rollcall_testing::{InMemoryRegistrationStore, ticking_clock};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

fn engine() -> (Arc<InMemoryRegistrationStore>, RegistrationWorkflow) {
    let store = Arc::new(InMemoryRegistrationStore::new());
    let workflow = RegistrationWorkflow::new(store.clone(), Arc::new(ticking_clock()));
    (store, workflow)
}

async fn event_with_capacity(workflow: &RegistrationWorkflow, capacity: u32) -> Event {
    workflow
        .create_event(admin(), event_draft(capacity))
        .await
        .expect("event should be created")
}

/// Store whose first `conflicts` transactions fail to start with a serialization conflict.
struct FlakyStore {
    inner: InMemoryRegistrationStore,
    conflicts: AtomicUsize,
    begins: AtomicUsize,
}

impl FlakyStore {
    fn new(inner: InMemoryRegistrationStore) -> Self {
        Self {
            inner,
            conflicts: AtomicUsize::new(0),
            begins: AtomicUsize::new(0),
        }
    }

    fn conflict_next(&self, n: usize) {
        self.conflicts.store(n, Ordering::SeqCst);
        self.begins.store(0, Ordering::SeqCst);
    }
}

impl RegistrationStore for FlakyStore {
    fn begin(&self) -> StoreFuture<'_, Box<dyn StoreTransaction>> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        let conflicted = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflicted {
            return Box::pin(std::future::ready(Err(StoreError::Conflict(
                "could not serialize access due to concurrent update".to_string(),
            ))));
        }
        self.inner.begin()
    }
}

// ============================================================================
// Lifecycle scenarios
// ============================================================================

#[tokio::test]
async fn test_filling_the_last_slot_rejects_remaining_pending() {
    let (store, workflow) = engine();
    let event = event_with_capacity(&workflow, 2).await;

    let r1 = workflow.apply(volunteer(), event.id, "r1@example.com").await.unwrap();
    let r2 = workflow.apply(volunteer(), event.id, "r2@example.com").await.unwrap();
    let r3 = workflow.apply(volunteer(), event.id, "r3@example.com").await.unwrap();

    let first = workflow.accept(moderator(), r1.id).await.unwrap();
    assert_eq!(first.accepted_count, 1);
    assert_eq!(first.cascaded_rejections, 0);
    assert!(!first.filled_event());
    assert_eq!(
        store.registration(r2.id).await.unwrap().status,
        RegistrationStatus::Pending
    );
    assert_eq!(
        store.registration(r3.id).await.unwrap().status,
        RegistrationStatus::Pending
    );

    let second = workflow.accept(moderator(), r2.id).await.unwrap();
    assert_eq!(second.accepted_count, 2);
    assert_eq!(second.capacity, 2);
    assert_eq!(second.cascaded_rejections, 1);
    assert!(second.filled_event());
    assert_eq!(second.registration.status, RegistrationStatus::Accepted);

    assert_eq!(
        store.registration(r3.id).await.unwrap().status,
        RegistrationStatus::Rejected
    );
    assert_eq!(store.count(event.id, RegistrationStatus::Accepted).await, 2);
    assert_eq!(store.count(event.id, RegistrationStatus::Pending).await, 0);
}

#[tokio::test]
async fn test_second_application_is_duplicate() {
    let (store, workflow) = engine();
    let event = event_with_capacity(&workflow, 1).await;
    let applicant = volunteer();

    let registration = workflow
        .apply(applicant, event.id, "  +1 555 0100 ")
        .await
        .unwrap();
    assert_eq!(registration.status, RegistrationStatus::Pending);
    assert_eq!(registration.contact, "+1 555 0100");
    assert_eq!(registration.volunteer_id, applicant.id);

    let again = workflow.apply(applicant, event.id, "+1 555 0100").await;
    assert!(matches!(
        again,
        Err(WorkflowError::DuplicateApplication { volunteer_id, .. }) if volunteer_id == applicant.id
    ));
    assert_eq!(store.registration_count().await, 1);
}

#[tokio::test]
async fn test_apply_to_full_event_is_refused() {
    let (_store, workflow) = engine();
    let event = event_with_capacity(&workflow, 1).await;

    let registration = workflow.apply(volunteer(), event.id, "v@example.com").await.unwrap();
    workflow.accept(moderator(), registration.id).await.unwrap();

    let late = workflow.apply(volunteer(), event.id, "w@example.com").await;
    assert!(matches!(
        late,
        Err(WorkflowError::CapacityExceeded { capacity: 1, .. })
    ));
}

#[tokio::test]
async fn test_apply_checks_capacity_before_contact() {
    let (_store, workflow) = engine();
    let event = event_with_capacity(&workflow, 1).await;
    let registration = workflow.apply(volunteer(), event.id, "v@example.com").await.unwrap();
    workflow.accept(admin(), registration.id).await.unwrap();

    let result = workflow.apply(volunteer(), event.id, "   ").await;
    assert!(matches!(result, Err(WorkflowError::CapacityExceeded { .. })));
}

#[tokio::test]
async fn test_apply_requires_contact() {
    let (store, workflow) = engine();
    let event = event_with_capacity(&workflow, 3).await;

    let result = workflow.apply(volunteer(), event.id, " \t ").await;
    assert!(matches!(result, Err(WorkflowError::InvalidInput(_))));
    assert_eq!(store.registration_count().await, 0);
}

#[tokio::test]
async fn test_apply_to_unknown_event() {
    let (_store, workflow) = engine();
    let result = workflow
        .apply(volunteer(), rollcall_core::types::EventId::new(), "v@example.com")
        .await;
    assert!(matches!(
        result,
        Err(WorkflowError::NotFound {
            resource: "event",
            ..
        })
    ));
}

#[tokio::test]
async fn test_reject_is_idempotent() {
    let (store, workflow) = engine();
    let event = event_with_capacity(&workflow, 2).await;
    let registration = workflow.apply(volunteer(), event.id, "v@example.com").await.unwrap();

    let first = workflow.reject(moderator(), registration.id).await.unwrap();
    assert!(matches!(first, RejectOutcome::Rejected { .. }));
    assert_eq!(first.registration().status, RegistrationStatus::Rejected);

    let second = workflow.reject(moderator(), registration.id).await.unwrap();
    assert!(matches!(second, RejectOutcome::AlreadyRejected { .. }));
    assert_eq!(
        store.registration(registration.id).await.unwrap().status,
        RegistrationStatus::Rejected
    );
}

#[tokio::test]
async fn test_reject_never_cascades() {
    let (store, workflow) = engine();
    let event = event_with_capacity(&workflow, 1).await;
    let r1 = workflow.apply(volunteer(), event.id, "a").await.unwrap();
    let r2 = workflow.apply(volunteer(), event.id, "b").await.unwrap();

    workflow.reject(moderator(), r1.id).await.unwrap();

    assert_eq!(
        store.registration(r2.id).await.unwrap().status,
        RegistrationStatus::Pending
    );
}

#[tokio::test]
async fn test_accepted_registration_is_terminal() {
    let (_store, workflow) = engine();
    let event = event_with_capacity(&workflow, 2).await;
    let registration = workflow.apply(volunteer(), event.id, "v@example.com").await.unwrap();
    workflow.accept(moderator(), registration.id).await.unwrap();

    let reject = workflow.reject(moderator(), registration.id).await;
    assert!(matches!(
        reject,
        Err(WorkflowError::WrongState {
            status: RegistrationStatus::Accepted,
            ..
        })
    ));

    let accept_again = workflow.accept(moderator(), registration.id).await;
    assert!(matches!(
        accept_again,
        Err(WorkflowError::WrongState {
            status: RegistrationStatus::Accepted,
            ..
        })
    ));
}

#[tokio::test]
async fn test_rejected_registration_cannot_be_accepted() {
    let (_store, workflow) = engine();
    let event = event_with_capacity(&workflow, 2).await;
    let registration = workflow.apply(volunteer(), event.id, "v@example.com").await.unwrap();
    workflow.reject(moderator(), registration.id).await.unwrap();

    let result = workflow.accept(moderator(), registration.id).await;
    assert!(matches!(
        result,
        Err(WorkflowError::WrongState {
            status: RegistrationStatus::Rejected,
            ..
        })
    ));
}

#[tokio::test]
async fn test_unknown_registration_is_not_found() {
    let (_store, workflow) = engine();
    let missing = rollcall_core::types::RegistrationId::new();

    assert!(matches!(
        workflow.accept(moderator(), missing).await,
        Err(WorkflowError::NotFound {
            resource: "registration",
            ..
        })
    ));
    assert!(matches!(
        workflow.reject(moderator(), missing).await,
        Err(WorkflowError::NotFound { .. })
    ));
}

// ============================================================================
// Permissions
// ============================================================================

#[tokio::test]
async fn test_roles_are_enforced() {
    let (store, workflow) = engine();
    let event = event_with_capacity(&workflow, 2).await;

    assert!(matches!(
        workflow.apply(admin(), event.id, "a@example.com").await,
        Err(WorkflowError::Permission { .. })
    ));
    assert!(matches!(
        workflow.apply(moderator(), event.id, "m@example.com").await,
        Err(WorkflowError::Permission { .. })
    ));

    let registration = workflow.apply(volunteer(), event.id, "v@example.com").await.unwrap();
    assert!(matches!(
        workflow.accept(volunteer(), registration.id).await,
        Err(WorkflowError::Permission { .. })
    ));
    assert!(matches!(
        workflow.reject(volunteer(), registration.id).await,
        Err(WorkflowError::Permission { .. })
    ));
    assert!(matches!(
        workflow.create_event(moderator(), event_draft(1)).await,
        Err(WorkflowError::Permission { .. })
    ));
    assert!(matches!(
        workflow.delete_event(moderator(), event.id).await,
        Err(WorkflowError::Permission { .. })
    ));
    assert!(matches!(
        workflow.forget_volunteer(moderator(), registration.volunteer_id).await,
        Err(WorkflowError::Permission { .. })
    ));

    assert_eq!(
        store.registration(registration.id).await.unwrap().status,
        RegistrationStatus::Pending
    );
}

#[tokio::test]
async fn test_permission_is_checked_before_existence() {
    let (_store, workflow) = engine();
    let result = workflow
        .apply(admin(), rollcall_core::types::EventId::new(), "a@example.com")
        .await;
    assert!(matches!(result, Err(WorkflowError::Permission { .. })));
}

#[tokio::test]
async fn test_admin_can_moderate() {
    let (_store, workflow) = engine();
    let event = event_with_capacity(&workflow, 1).await;
    let registration = workflow.apply(volunteer(), event.id, "v@example.com").await.unwrap();

    let outcome = workflow.accept(admin(), registration.id).await.unwrap();
    assert_eq!(outcome.accepted_count, 1);
}

// ============================================================================
// Atomicity
// ============================================================================

#[tokio::test]
async fn test_failed_cascade_rolls_back_accept() {
    let (store, workflow) = engine();
    let event = event_with_capacity(&workflow, 1).await;
    let target = workflow.apply(volunteer(), event.id, "a").await.unwrap();
    let other = workflow.apply(volunteer(), event.id, "b").await.unwrap();

    store.fail_bulk_updates(true);
    let result = workflow.accept(moderator(), target.id).await;
    assert!(matches!(
        result,
        Err(WorkflowError::Store(StoreError::Database(_)))
    ));

    assert_eq!(
        store.registration(target.id).await.unwrap().status,
        RegistrationStatus::Pending
    );
    assert_eq!(
        store.registration(other.id).await.unwrap().status,
        RegistrationStatus::Pending
    );
    assert_eq!(store.count(event.id, RegistrationStatus::Accepted).await, 0);

    store.fail_bulk_updates(false);
    let outcome = workflow.accept(moderator(), target.id).await.unwrap();
    assert_eq!(outcome.cascaded_rejections, 1);
}

#[tokio::test]
async fn test_accept_below_capacity_does_not_touch_bulk_update() {
    let (store, workflow) = engine();
    let event = event_with_capacity(&workflow, 3).await;
    let target = workflow.apply(volunteer(), event.id, "a").await.unwrap();

    store.fail_bulk_updates(true);
    let outcome = workflow.accept(moderator(), target.id).await.unwrap();
    assert_eq!(outcome.cascaded_rejections, 0);
}

// ============================================================================
// Event administration
// ============================================================================

#[tokio::test]
async fn test_create_event_validates_and_records_organizer() {
    let (store, workflow) = engine();
    let organizer = admin();

    let mut draft = event_draft(4);
    draft.name = "  Food bank shift ".to_string();
    let event = workflow.create_event(organizer, draft).await.unwrap();
    assert_eq!(event.name, "Food bank shift");
    assert_eq!(event.capacity, 4);
    assert_eq!(event.organizer_id, organizer.id);
    assert!(store.event(event.id).await.is_some());

    let zero = workflow.create_event(organizer, event_draft(0)).await;
    assert!(matches!(zero, Err(WorkflowError::InvalidInput(_))));
}

#[tokio::test]
async fn test_delete_event_removes_registrations() {
    let (store, workflow) = engine();
    let event = event_with_capacity(&workflow, 2).await;
    let kept = event_with_capacity(&workflow, 2).await;
    workflow.apply(volunteer(), event.id, "a").await.unwrap();
    workflow.apply(volunteer(), event.id, "b").await.unwrap();
    workflow.apply(volunteer(), kept.id, "c").await.unwrap();

    let removed = workflow.delete_event(admin(), event.id).await.unwrap();
    assert_eq!(removed, 2);
    assert!(store.event(event.id).await.is_none());
    assert_eq!(store.registration_count().await, 1);

    assert!(matches!(
        workflow.delete_event(admin(), event.id).await,
        Err(WorkflowError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_forget_volunteer_frees_their_slot() {
    let (store, workflow) = engine();
    let first = event_with_capacity(&workflow, 1).await;
    let second = event_with_capacity(&workflow, 5).await;
    let leaving = volunteer();

    let slot = workflow.apply(leaving, first.id, "a").await.unwrap();
    workflow.apply(leaving, second.id, "a").await.unwrap();
    workflow.accept(moderator(), slot.id).await.unwrap();

    let removed = workflow.forget_volunteer(admin(), leaving.id).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.count(first.id, RegistrationStatus::Accepted).await, 0);

    // The slot is open again.
    workflow.apply(volunteer(), first.id, "b").await.unwrap();
}

#[tokio::test]
async fn test_event_overview() {
    let (_store, workflow) = engine();
    let event = event_with_capacity(&workflow, 3).await;
    let viewer = volunteer();

    let accepted = workflow.apply(volunteer(), event.id, "a").await.unwrap();
    let mine = workflow.apply(viewer, event.id, "mine").await.unwrap();
    let rejected = workflow.apply(volunteer(), event.id, "c").await.unwrap();
    workflow.accept(moderator(), accepted.id).await.unwrap();
    workflow.reject(moderator(), rejected.id).await.unwrap();

    let overview = workflow.event_overview(event.id, Some(viewer)).await.unwrap();
    assert_eq!(overview.event.id, event.id);
    assert_eq!(overview.accepted_count, 1);
    assert_eq!(overview.remaining_slots, 2);
    assert_eq!(
        overview.accepted.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![accepted.id]
    );
    assert_eq!(
        overview.pending.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![mine.id]
    );
    assert_eq!(overview.viewer_registration.map(|r| r.id), Some(mine.id));

    let anonymous = workflow.event_overview(event.id, None).await.unwrap();
    assert!(anonymous.viewer_registration.is_none());

    let stranger = workflow
        .event_overview(event.id, Some(volunteer()))
        .await
        .unwrap();
    assert!(stranger.viewer_registration.is_none());
}

#[tokio::test]
async fn test_event_overview_withholds_other_contacts() {
    let (_store, workflow) = engine();
    let event = event_with_capacity(&workflow, 3).await;
    let owner = volunteer();

    let accepted = workflow.apply(volunteer(), event.id, "a@example.com").await.unwrap();
    workflow.apply(owner, event.id, "owner@example.com").await.unwrap();
    workflow.accept(moderator(), accepted.id).await.unwrap();

    let anonymous = workflow.event_overview(event.id, None).await.unwrap();
    assert!(
        anonymous
            .accepted
            .iter()
            .chain(&anonymous.pending)
            .all(|r| r.contact.is_empty())
    );

    let own = workflow.event_overview(event.id, Some(owner)).await.unwrap();
    assert_eq!(own.pending[0].contact, "owner@example.com");
    assert!(own.accepted[0].contact.is_empty());
    assert_eq!(
        own.viewer_registration.map(|r| r.contact),
        Some("owner@example.com".to_string())
    );

    for reader in [moderator(), admin()] {
        let full = workflow.event_overview(event.id, Some(reader)).await.unwrap();
        assert_eq!(full.accepted[0].contact, "a@example.com");
        assert_eq!(full.pending[0].contact, "owner@example.com");
    }
}

// ============================================================================
// Event editing and listing
// ============================================================================

fn draft_on(date: NaiveDate, volunteers_required: u32) -> EventDraft {
    EventDraft {
        date,
        ..event_draft(volunteers_required)
    }
}

#[tokio::test]
async fn test_update_event_changes_details() {
    let (store, workflow) = engine();
    let event = event_with_capacity(&workflow, 2).await;

    let draft = EventDraft {
        name: "  Community garden, week two ".to_string(),
        description: "Harvest".to_string(),
        place: "Oak Street allotments".to_string(),
        ..draft_on(NaiveDate::from_ymd_opt(2025, 5, 24).unwrap(), 2)
    };
    let updated = workflow.update_event(moderator(), event.id, draft).await.unwrap();

    assert_eq!(updated.id, event.id);
    assert_eq!(updated.name, "Community garden, week two");
    assert_eq!(updated.place, "Oak Street allotments");
    assert_eq!(updated.date, NaiveDate::from_ymd_opt(2025, 5, 24).unwrap());
    assert_eq!(updated.organizer_id, event.organizer_id);
    assert_eq!(store.event(event.id).await, Some(updated));
}

#[tokio::test]
async fn test_update_event_cannot_change_capacity() {
    let (store, workflow) = engine();
    let event = event_with_capacity(&workflow, 2).await;

    let result = workflow
        .update_event(admin(), event.id, event_draft(4))
        .await;
    assert!(matches!(
        result,
        Err(WorkflowError::InvalidInput(ref msg)) if msg.contains("volunteers_required")
    ));
    assert_eq!(store.event(event.id).await, Some(event));
}

#[tokio::test]
async fn test_update_event_checks_role_and_existence() {
    let (_store, workflow) = engine();
    let event = event_with_capacity(&workflow, 2).await;

    assert!(matches!(
        workflow.update_event(volunteer(), event.id, event_draft(2)).await,
        Err(WorkflowError::Permission { .. })
    ));
    assert!(matches!(
        workflow
            .update_event(admin(), EventId::new(), event_draft(2))
            .await,
        Err(WorkflowError::NotFound { resource: "event", .. })
    ));
}

#[tokio::test]
async fn test_list_upcoming_events() {
    // The engine clock starts at 2025-01-01.
    let (_store, workflow) = engine();
    let past = workflow
        .create_event(admin(), draft_on(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(), 1))
        .await
        .unwrap();
    let later = workflow
        .create_event(admin(), draft_on(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(), 1))
        .await
        .unwrap();
    let sooner = workflow
        .create_event(admin(), draft_on(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(), 2))
        .await
        .unwrap();

    let registration = workflow.apply(volunteer(), sooner.id, "a").await.unwrap();
    workflow.accept(moderator(), registration.id).await.unwrap();
    workflow.apply(volunteer(), past.id, "b").await.unwrap();

    let upcoming = workflow.list_upcoming_events().await.unwrap();
    assert_eq!(
        upcoming
            .iter()
            .map(|u| (u.event.id, u.accepted_count, u.remaining_slots))
            .collect::<Vec<_>>(),
        vec![(sooner.id, 1, 1), (later.id, 0, 1)]
    );
}

#[tokio::test]
async fn test_event_overview_lists_pending_oldest_first() {
    let (_store, workflow) = engine();
    let event = event_with_capacity(&workflow, 5).await;

    let mut applied = Vec::new();
    for i in 0..4 {
        let registration = workflow
            .apply(volunteer(), event.id, &format!("v{i}@example.com"))
            .await
            .unwrap();
        applied.push(registration.id);
    }

    let overview = workflow.event_overview(event.id, None).await.unwrap();
    assert_eq!(
        overview.pending.iter().map(|r| r.id).collect::<Vec<_>>(),
        applied
    );
}

// ============================================================================
// Conflict retries
// ============================================================================

#[tokio::test]
async fn test_transient_conflicts_are_retried() {
    let store = Arc::new(FlakyStore::new(InMemoryRegistrationStore::new()));
    let workflow = RegistrationWorkflow::new(store.clone(), Arc::new(ticking_clock()))
        .with_retry_policy(
            RetryPolicy::builder()
                .max_retries(3)
                .initial_delay(Duration::from_millis(1))
                .build(),
        );
    let event = event_with_capacity(&workflow, 1).await;

    store.conflict_next(2);
    let registration = workflow.apply(volunteer(), event.id, "v@example.com").await.unwrap();
    assert_eq!(registration.status, RegistrationStatus::Pending);
    assert_eq!(store.begins.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_conflicts_surface_after_retries_are_exhausted() {
    let store = Arc::new(FlakyStore::new(InMemoryRegistrationStore::new()));
    let workflow = RegistrationWorkflow::new(store.clone(), Arc::new(ticking_clock()))
        .with_retry_policy(
            RetryPolicy::builder()
                .max_retries(1)
                .initial_delay(Duration::from_millis(1))
                .build(),
        );
    let event = event_with_capacity(&workflow, 1).await;
    let registration = workflow.apply(volunteer(), event.id, "v@example.com").await.unwrap();

    store.conflict_next(5);
    let result = workflow.accept(moderator(), registration.id).await;
    assert!(matches!(
        result,
        Err(ref err @ WorkflowError::Store(StoreError::Conflict(_))) if err.is_retryable()
    ));
    assert_eq!(store.begins.load(Ordering::SeqCst), 2);
    assert_eq!(
        store.inner.registration(registration.id).await.unwrap().status,
        RegistrationStatus::Pending
    );
}

#[tokio::test]
async fn test_business_errors_are_not_retried() {
    let store = Arc::new(FlakyStore::new(InMemoryRegistrationStore::new()));
    let workflow = RegistrationWorkflow::new(store.clone(), Arc::new(ticking_clock()));
    let event = event_with_capacity(&workflow, 1).await;

    store.conflict_next(0);
    let result = workflow.apply(volunteer(), event.id, "  ").await;
    assert!(matches!(result, Err(WorkflowError::InvalidInput(_))));
    assert_eq!(store.begins.load(Ordering::SeqCst), 1);
}
