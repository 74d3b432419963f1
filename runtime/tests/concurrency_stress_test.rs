//! Concurrency stress tests for last-slot scenarios.
//!
//! These tests verify that under concurrent load the engine never accepts more
//! volunteers than an event needs, and that the loser of a race for the last
//! slot sees `CapacityExceeded`.
//!
//! Run with: `cargo test --test concurrency_stress_test -- --nocapture`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use rollcall_core::error::WorkflowError;
use rollcall_core::types::{Registration, RegistrationStatus};
use rollcall_runtime::{AcceptOutcome, RegistrationWorkflow};
use rollcall_testing::helpers::{admin, event_draft, moderator, volunteer};
use rollcall_testing::{InMemoryRegistrationStore, ticking_clock};
use std::sync::Arc;

fn engine() -> (Arc<InMemoryRegistrationStore>, Arc<RegistrationWorkflow>) {
    let store = Arc::new(InMemoryRegistrationStore::new());
    let workflow = Arc::new(RegistrationWorkflow::new(
        store.clone(),
        Arc::new(ticking_clock()),
    ));
    (store, workflow)
}

async fn accept_all(
    workflow: &Arc<RegistrationWorkflow>,
    registrations: &[Registration],
) -> Vec<Result<AcceptOutcome, WorkflowError>> {
    let handles = registrations.iter().map(|registration| {
        let workflow = Arc::clone(workflow);
        let id = registration.id;
        tokio::spawn(async move { workflow.accept(moderator(), id).await })
    });

    futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("Task panicked"))
        .collect()
}

/// Two moderators accept different pending registrations for the last slot.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_accepts_for_one_slot() {
    for _ in 0..25 {
        let (store, workflow) = engine();
        let event = workflow.create_event(admin(), event_draft(1)).await.unwrap();
        let a = workflow.apply(volunteer(), event.id, "a").await.unwrap();
        let b = workflow.apply(volunteer(), event.id, "b").await.unwrap();

        let results = accept_all(&workflow, &[a, b]).await;

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let capacity_errors = results
            .iter()
            .filter(|r| matches!(r, Err(WorkflowError::CapacityExceeded { .. })))
            .count();
        assert_eq!(successes, 1, "exactly one accept wins: {results:?}");
        assert_eq!(capacity_errors, 1, "the loser sees CapacityExceeded: {results:?}");
        assert_eq!(store.count(event.id, RegistrationStatus::Accepted).await, 1);
        assert_eq!(store.count(event.id, RegistrationStatus::Pending).await, 0);
    }
}

/// Many accepts race for a handful of slots.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_accepts_never_exceed_capacity() {
    println!("🧪 Concurrency Stress Test: 40 concurrent accepts for 3 slots");

    let (store, workflow) = engine();
    let event = workflow.create_event(admin(), event_draft(3)).await.unwrap();

    let mut registrations = Vec::new();
    for i in 0..40 {
        registrations.push(
            workflow
                .apply(volunteer(), event.id, &format!("v{i}@example.com"))
                .await
                .unwrap(),
        );
    }

    let results = accept_all(&workflow, &registrations).await;

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let losers = results
        .iter()
        .filter(|r| matches!(r, Err(WorkflowError::CapacityExceeded { capacity: 3, .. })))
        .count();

    println!("  ✅ Accepted: {}", winners.len());
    println!("  ❌ CapacityExceeded: {losers}");

    assert_eq!(winners.len(), 3);
    assert_eq!(losers, 37);
    assert_eq!(
        winners.iter().filter(|o| o.cascaded_rejections > 0).count(),
        1,
        "only the accept that fills the event cascades"
    );
    assert_eq!(
        winners.iter().map(|o| o.cascaded_rejections).sum::<u64>(),
        37
    );
    assert_eq!(store.count(event.id, RegistrationStatus::Accepted).await, 3);
    assert_eq!(store.count(event.id, RegistrationStatus::Rejected).await, 37);
    assert_eq!(store.count(event.id, RegistrationStatus::Pending).await, 0);
}

/// Applications and accepts interleave on the same event.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_applies_and_accepts_interleaved() {
    let (store, workflow) = engine();
    let event = workflow.create_event(admin(), event_draft(3)).await.unwrap();

    let handles = (0..50).map(|i| {
        let workflow = Arc::clone(&workflow);
        let event_id = event.id;
        tokio::spawn(async move {
            match workflow
                .apply(volunteer(), event_id, &format!("v{i}@example.com"))
                .await
            {
                Ok(registration) => workflow.accept(moderator(), registration.id).await,
                Err(err) => Err(err),
            }
        })
    });

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("Task panicked"))
        .collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 3);
    assert!(results.iter().all(|r| matches!(
        r,
        Ok(_) | Err(WorkflowError::CapacityExceeded { .. })
    )));
    assert_eq!(store.count(event.id, RegistrationStatus::Accepted).await, 3);
    assert_eq!(store.count(event.id, RegistrationStatus::Pending).await, 0);
}

/// One volunteer submits the same application many times at once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_applications() {
    let (store, workflow) = engine();
    let event = workflow.create_event(admin(), event_draft(5)).await.unwrap();
    let applicant = volunteer();

    let handles = (0..20).map(|_| {
        let workflow = Arc::clone(&workflow);
        let event_id = event.id;
        tokio::spawn(async move { workflow.apply(applicant, event_id, "me@example.com").await })
    });

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("Task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(WorkflowError::DuplicateApplication { .. })))
            .count(),
        19
    );
    assert_eq!(store.registration_count().await, 1);
}
