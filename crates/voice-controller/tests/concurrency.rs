//! Concurrency tests for capacity and speaker-slot arbitration.
//!
//! Every operation on a session serializes through its actor mailbox, so
//! racing clients must see exact limit enforcement: no overshoot, no lost
//! updates, one winner per contested slot.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::types::{ChannelId, SessionId, UserId};
use voice_controller::actors::{ActorMetrics, CallControllerActorHandle};
use voice_controller::config::Config;
use voice_controller::directory::{ChannelEntry, StaticDirectory, TargetDirectory};
use voice_controller::errors::CallError;
use voice_controller::history::CallArchive;
use voice_controller::model::{CallStatus, CallTarget, ChannelKind, EventKind};
use voice_controller::signal::SignalBus;

// ============================================================================
// Test Harness
// ============================================================================

struct TestHarness {
    handle: CallControllerActorHandle,
    directory: Arc<StaticDirectory>,
}

fn harness() -> TestHarness {
    let config = Config::from_vars(&HashMap::new()).unwrap();
    let directory = Arc::new(StaticDirectory::new());
    let handle = CallControllerActorHandle::new(
        &config,
        Arc::clone(&directory) as Arc<dyn TargetDirectory>,
        Arc::new(SignalBus::new()),
        Arc::new(CallArchive::new()),
        ActorMetrics::new(),
    );
    TestHarness { handle, directory }
}

/// Start an accepted global call (seats 10, 5 speakers) and return its id.
async fn accepted_global_call(h: &TestHarness) -> SessionId {
    let owner = UserId::new();
    let initiated = h.handle.initiate(owner, CallTarget::Global).await.unwrap();
    h.handle.accept(initiated.session_id, owner).await.unwrap();
    initiated.session_id
}

// ============================================================================
// Capacity Under Contention
// ============================================================================

#[tokio::test]
async fn test_concurrent_joins_respect_user_limit() {
    let h = harness();
    let session_id = accepted_global_call(&h).await;

    let mut tasks = Vec::new();
    for _ in 0..25 {
        let handle = h.handle.clone();
        let user = UserId::new();
        tasks.push(tokio::spawn(
            async move { handle.join(session_id, user).await },
        ));
    }

    let mut admitted = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => admitted += 1,
            Err(err @ CallError::CapacityExceeded { limit: 10 }) => {
                assert_eq!(err.error_code(), 7);
                refused += 1;
            }
            other => assert!(other.is_ok(), "unexpected join result: {other:?}"),
        }
    }

    // Exactly the seat count wins; the mailbox admits no overshoot
    assert_eq!(admitted, 10);
    assert_eq!(refused, 15);

    let snapshot = h.handle.snapshot(session_id).await.unwrap();
    assert_eq!(snapshot.participants.len(), 10);
    assert_eq!(snapshot.status, CallStatus::Active);

    h.handle.cancel();
}

#[tokio::test]
async fn test_duplicate_join_races_admit_once() {
    let h = harness();
    let session_id = accepted_global_call(&h).await;
    let user = UserId::new();

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let handle = h.handle.clone();
        tasks.push(tokio::spawn(
            async move { handle.join(session_id, user).await },
        ));
    }

    let mut admitted = 0;
    let mut duplicates = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => admitted += 1,
            Err(CallError::AlreadyJoined(id)) => {
                assert_eq!(id, user);
                duplicates += 1;
            }
            other => assert!(other.is_ok(), "unexpected join result: {other:?}"),
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(duplicates, 1);

    let snapshot = h.handle.snapshot(session_id).await.unwrap();
    assert_eq!(snapshot.participants.len(), 1);

    h.handle.cancel();
}

#[tokio::test]
async fn test_concurrent_promotes_respect_speaker_limit() {
    let h = harness();
    let owner = UserId::new();
    let channel_id = ChannelId::new();
    h.directory.register_channel(
        channel_id,
        ChannelEntry {
            kind: ChannelKind::Clan,
            voice: true,
        },
    );

    let initiated = h
        .handle
        .initiate(
            owner,
            CallTarget::Channel {
                id: channel_id,
                kind: ChannelKind::Clan,
            },
        )
        .await
        .unwrap();
    let session_id = initiated.session_id;
    h.handle.accept(session_id, owner).await.unwrap();

    let members: Vec<UserId> = (0..10).map(|_| UserId::new()).collect();
    for member in &members {
        h.handle.join(session_id, *member).await.unwrap();
    }

    // The owner races 10 promotions against 5 speaker slots
    let mut tasks = Vec::new();
    for member in &members {
        let handle = h.handle.clone();
        let target = *member;
        tasks.push(tokio::spawn(async move {
            handle.promote_speaker(session_id, owner, target).await
        }));
    }

    let mut granted = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => granted += 1,
            Err(err @ CallError::SpeakerLimitExceeded { limit: 5 }) => {
                assert_eq!(err.error_code(), 7);
                refused += 1;
            }
            other => assert!(other.is_ok(), "unexpected promote result: {other:?}"),
        }
    }

    assert_eq!(granted, 5);
    assert_eq!(refused, 5);

    // The audit trail records exactly the grants that won
    let snapshot = h.handle.snapshot(session_id).await.unwrap();
    assert_eq!(snapshot.speaker_count(), 5);
    assert_eq!(snapshot.speaker_promotions.len(), 5);

    h.handle.cancel();
}

// ============================================================================
// Churn and Isolation
// ============================================================================

#[tokio::test]
async fn test_join_leave_churn_settles_empty() {
    let h = harness();
    let session_id = accepted_global_call(&h).await;

    // 15 users churn through 10 seats; each retries until admitted, then
    // leaves
    let mut tasks = Vec::new();
    for _ in 0..15 {
        let handle = h.handle.clone();
        let user = UserId::new();
        tasks.push(tokio::spawn(async move {
            let mut joined = false;
            for _ in 0..1000 {
                if handle.join(session_id, user).await.is_ok() {
                    joined = true;
                    break;
                }
                tokio::task::yield_now().await;
            }
            assert!(joined, "user was never admitted");
            handle.leave(session_id, user).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = h.handle.snapshot(session_id).await.unwrap();
    assert!(snapshot.participants.is_empty());
    assert_eq!(snapshot.status, CallStatus::Active);

    let joins = snapshot
        .events
        .iter()
        .filter(|e| e.kind == EventKind::Joined)
        .count();
    let leaves = snapshot
        .events
        .iter()
        .filter(|e| e.kind == EventKind::Left)
        .count();
    assert_eq!(joins, 15);
    assert_eq!(leaves, 15);

    h.handle.cancel();
}

#[tokio::test]
async fn test_parallel_sessions_progress_independently() {
    let h = harness();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let handle = h.handle.clone();
        let directory = Arc::clone(&h.directory);
        tasks.push(tokio::spawn(async move {
            let caller = UserId::new();
            let callee = UserId::new();
            directory.register_user(callee);

            let initiated = handle
                .initiate(caller, CallTarget::User(callee))
                .await
                .unwrap();
            let session_id = initiated.session_id;
            handle.accept(session_id, callee).await.unwrap();
            handle.join(session_id, caller).await.unwrap();
            handle.join(session_id, callee).await.unwrap();
            let ended = handle.end(session_id, caller).await.unwrap();
            assert_eq!(ended.session.status, CallStatus::Ended);
            session_id
        }));
    }

    let mut session_ids = Vec::new();
    for task in tasks {
        session_ids.push(task.await.unwrap());
    }

    // Every call ran to completion with its own roster and clock
    for session_id in session_ids {
        let snapshot = h.handle.snapshot(session_id).await.unwrap();
        assert_eq!(snapshot.status, CallStatus::Ended);
        assert_eq!(snapshot.participants.len(), 2);
    }

    h.handle.cancel();
}

// ============================================================================
// Shutdown Under Contention
// ============================================================================

#[tokio::test]
async fn test_initiates_racing_shutdown_resolve_typed() {
    // Repeat the race so every path gets hit: requests handled before the
    // drain starts, requests answered out of the closed mailbox, and
    // requests refused at the send side.
    for _ in 0..25 {
        let h = harness();

        let shutdown = {
            let handle = h.handle.clone();
            tokio::spawn(async move { handle.shutdown(Duration::from_secs(5)).await })
        };

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = h.handle.clone();
            tasks.push(tokio::spawn(async move {
                handle.initiate(UserId::new(), CallTarget::Global).await
            }));
        }

        shutdown.await.unwrap().unwrap();
        for task in tasks {
            match task.await.unwrap() {
                // Beating the shutdown to the mailbox is a legitimate win
                Ok(_) => {}
                Err(err @ CallError::Unavailable(_)) => assert_eq!(err.error_code(), 7),
                other => assert!(
                    other.is_ok(),
                    "unexpected initiate result during shutdown: {other:?}"
                ),
            }
        }
    }
}
