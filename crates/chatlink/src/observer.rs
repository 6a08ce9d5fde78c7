// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Visible connection state: change notifications and `await_open`.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::ConnectionKind;
use crate::error::RequestError;

/// Observable state of one chat connection.
///
/// Monotonic only within a single connection instance; a replacement
/// instance restarts at `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibleState {
    Closed,
    Connecting,
    Open,
}

impl VisibleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
        }
    }
}

impl std::fmt::Display for VisibleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events published to connection subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// The visible state changed.
    StateChanged { kind: ConnectionKind, prev: VisibleState, next: VisibleState },

    /// The server reported the initial message queue drained and all prior
    /// inbound messages were handed to processing. Latches once per
    /// connection instance.
    InitialQueueEmptied { kind: ConnectionKind },
}

struct ObserverInner {
    state: VisibleState,
    waiters: HashMap<u64, oneshot::Sender<()>>,
    next_waiter: u64,
}

/// Tracks the visible state of one connection and fans out change events.
///
/// Waiter registration and state changes share one short-lived lock so an
/// `await_open` can never miss the transition it is waiting for.
pub struct StateObserver {
    kind: ConnectionKind,
    inner: Mutex<ObserverInner>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl StateObserver {
    pub fn new(kind: ConnectionKind) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            kind,
            inner: Mutex::new(ObserverInner {
                state: VisibleState::Closed,
                waiters: HashMap::new(),
                next_waiter: 0,
            }),
            events,
        }
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn state(&self) -> VisibleState {
        self.inner.lock().state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Record a state change, notify subscribers, and resume `await_open`
    /// waiters when the new state is `Open`. No-op when unchanged.
    pub fn set_state(&self, next: VisibleState) {
        let (prev, resumed) = {
            let mut inner = self.inner.lock();
            if inner.state == next {
                return;
            }
            let prev = inner.state;
            inner.state = next;
            let resumed = if next == VisibleState::Open {
                inner.waiters.drain().map(|(_, tx)| tx).collect()
            } else {
                Vec::new()
            };
            (prev, resumed)
        };

        tracing::debug!(kind = %self.kind, %prev, %next, "connection state changed");
        let _ = self.events.send(ConnectionEvent::StateChanged { kind: self.kind, prev, next });
        for waiter in resumed {
            let _ = waiter.send(());
        }
    }

    /// Publish the one-way initial-queue-emptied latch.
    pub fn notify_queue_emptied(&self) {
        let _ = self.events.send(ConnectionEvent::InitialQueueEmptied { kind: self.kind });
    }

    /// Wait until the connection is open.
    ///
    /// Resolves immediately when already open. Cancelling via `cancel`
    /// removes the waiter and yields [`RequestError::Cancelled`]; an
    /// in-flight socket request is never affected.
    pub async fn await_open(&self, cancel: &CancellationToken) -> Result<(), RequestError> {
        let (tx, rx) = oneshot::channel();
        let key = {
            let mut inner = self.inner.lock();
            if inner.state == VisibleState::Open {
                return Ok(());
            }
            let key = inner.next_waiter;
            inner.next_waiter += 1;
            inner.waiters.insert(key, tx);
            key
        };

        tokio::select! {
            result = rx => match result {
                Ok(()) => Ok(()),
                // Observer shut down while we were waiting.
                Err(_) => Err(RequestError::Cancelled),
            },
            _ = cancel.cancelled() => {
                self.inner.lock().waiters.remove(&key);
                Err(RequestError::Cancelled)
            }
        }
    }

    /// Drop all registered waiters; each resolves with `Cancelled`.
    pub fn fail_all_waiters(&self) {
        self.inner.lock().waiters.clear();
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        self.inner.lock().waiters.len()
    }
}

#[cfg(test)]
#[path = "observer_tests.rs"]
mod tests;
