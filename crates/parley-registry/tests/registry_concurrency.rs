//! Concurrency tests for the shared registry.
//!
//! Many tasks race on the same identity or session name; the single lock
//! must let exactly one of them win.

use std::sync::Arc;

use parley_protocol::{SessionId, UserId};
use parley_registry::{Registry, RegistryError, RegistryLimits};
use parley_transport::ConnectionId;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

const RACERS: u64 = 16;

async fn registry_with_clients(n: u64) -> Arc<Registry> {
    let registry = Arc::new(Registry::new(RegistryLimits::default()));
    for i in 1..=n {
        let (tx, _rx) = mpsc::channel(8);
        registry.add_client(ConnectionId::new(i), tx).await.unwrap();
    }
    registry
}

// =========================================================================
// Login races
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_login_same_identity_one_winner() {
    let registry = registry_with_clients(RACERS).await;

    let mut tasks = JoinSet::new();
    for i in 1..=RACERS {
        let registry = Arc::clone(&registry);
        tasks.spawn(async move {
            registry
                .login(ConnectionId::new(i), UserId::new("ken"))
                .await
        });
    }

    let mut wins = 0;
    let mut duplicates = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(()) => wins += 1,
            Err(RegistryError::DuplicateIdentity(_)) => duplicates += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(wins, 1);
    assert_eq!(duplicates, RACERS - 1);
    assert!(registry.is_identity_logged_in(&UserId::new("ken")).await);
}

// =========================================================================
// Session creation races
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_create_same_session_one_winner() {
    let registry = registry_with_clients(RACERS).await;
    for i in 1..=RACERS {
        registry
            .login(ConnectionId::new(i), UserId::new(format!("user{i}")))
            .await
            .unwrap();
    }

    let mut tasks = JoinSet::new();
    for i in 1..=RACERS {
        let registry = Arc::clone(&registry);
        tasks.spawn(async move {
            registry
                .create_session_if_absent(
                    ConnectionId::new(i),
                    SessionId::new("room1"),
                )
                .await
        });
    }

    let mut created = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(()) => created += 1,
            Err(RegistryError::SessionExists(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(created, 1);
    let members = registry
        .find_clients_by_session(&SessionId::new("room1"))
        .await;
    assert_eq!(members.len(), 1);
}

// =========================================================================
// Join / leave churn
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_join_leave_keeps_invariants() {
    let registry = registry_with_clients(RACERS).await;
    for i in 1..=RACERS {
        registry
            .login(ConnectionId::new(i), UserId::new(format!("user{i}")))
            .await
            .unwrap();
    }

    let mut tasks = JoinSet::new();
    for i in 1..=RACERS {
        let registry = Arc::clone(&registry);
        tasks.spawn(async move {
            let conn_id = ConnectionId::new(i);
            let room = SessionId::new(format!("room{}", i % 3));
            for _ in 0..50 {
                if registry.join_session(conn_id, room.clone()).await.is_err() {
                    let _ = registry
                        .create_session_if_absent(conn_id, room.clone())
                        .await;
                }
                let _ = registry.leave_session(conn_id).await;
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    let snapshot = registry.snapshot_all().await;
    assert!(snapshot.check_invariants().is_ok());
    assert!(snapshot.sessions.is_empty(), "everyone left every session");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_disconnects_remove_session() {
    let registry = registry_with_clients(RACERS).await;
    let room = SessionId::new("room1");
    for i in 1..=RACERS {
        let conn_id = ConnectionId::new(i);
        registry
            .login(conn_id, UserId::new(format!("user{i}")))
            .await
            .unwrap();
        if i == 1 {
            registry
                .create_session_if_absent(conn_id, room.clone())
                .await
                .unwrap();
        } else {
            registry.join_session(conn_id, room.clone()).await.unwrap();
        }
    }

    let mut tasks = JoinSet::new();
    for i in 1..=RACERS {
        let registry = Arc::clone(&registry);
        tasks.spawn(async move { registry.remove_client(ConnectionId::new(i)).await });
    }

    let mut removed_session = 0;
    while let Some(result) = tasks.join_next().await {
        let departure = result.unwrap().unwrap();
        if departure.left.is_some_and(|left| left.removed) {
            removed_session += 1;
        }
    }

    assert_eq!(removed_session, 1, "only the last one out removes it");
    assert!(registry.find_session(&room).await.is_none());
    assert_eq!(registry.client_count().await, 0);
}
