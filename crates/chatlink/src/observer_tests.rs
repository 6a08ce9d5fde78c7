// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{ConnectionEvent, StateObserver, VisibleState};
use crate::config::ConnectionKind;
use crate::error::RequestError;

#[tokio::test]
async fn await_open_immediate_when_open() {
    let observer = StateObserver::new(ConnectionKind::Identified);
    observer.set_state(VisibleState::Open);

    let cancel = CancellationToken::new();
    observer.await_open(&cancel).await.unwrap();
    assert_eq!(observer.waiter_count(), 0);
}

#[tokio::test]
async fn await_open_resumes_on_transition() {
    let observer = Arc::new(StateObserver::new(ConnectionKind::Identified));

    let waiting = Arc::clone(&observer);
    let task = tokio::spawn(async move {
        let cancel = CancellationToken::new();
        waiting.await_open(&cancel).await
    });

    // Let the waiter register before flipping state.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(observer.waiter_count(), 1);

    observer.set_state(VisibleState::Connecting);
    observer.set_state(VisibleState::Open);

    task.await.unwrap().unwrap();
    assert_eq!(observer.waiter_count(), 0);
}

#[tokio::test]
async fn cancelled_waiter_is_removed_and_not_resumed() {
    let observer = Arc::new(StateObserver::new(ConnectionKind::Unidentified));
    let cancel = CancellationToken::new();

    let waiting = Arc::clone(&observer);
    let waiter_cancel = cancel.clone();
    let task = tokio::spawn(async move { waiting.await_open(&waiter_cancel).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(observer.waiter_count(), 1);

    cancel.cancel();
    assert_eq!(task.await.unwrap(), Err(RequestError::Cancelled));
    assert_eq!(observer.waiter_count(), 0);

    // A later open does not find a stale waiter.
    observer.set_state(VisibleState::Open);
    assert_eq!(observer.waiter_count(), 0);
}

#[tokio::test]
async fn state_changes_are_broadcast_once() {
    let observer = StateObserver::new(ConnectionKind::Identified);
    let mut events = observer.subscribe();

    observer.set_state(VisibleState::Connecting);
    observer.set_state(VisibleState::Connecting); // duplicate, suppressed
    observer.set_state(VisibleState::Open);

    assert_eq!(
        events.recv().await.unwrap(),
        ConnectionEvent::StateChanged {
            kind: ConnectionKind::Identified,
            prev: VisibleState::Closed,
            next: VisibleState::Connecting,
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        ConnectionEvent::StateChanged {
            kind: ConnectionKind::Identified,
            prev: VisibleState::Connecting,
            next: VisibleState::Open,
        }
    );
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn shutdown_fails_waiters_with_cancelled() {
    let observer = Arc::new(StateObserver::new(ConnectionKind::Identified));

    let waiting = Arc::clone(&observer);
    let task = tokio::spawn(async move {
        let cancel = CancellationToken::new();
        waiting.await_open(&cancel).await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    observer.fail_all_waiters();

    assert_eq!(task.await.unwrap(), Err(RequestError::Cancelled));
}
