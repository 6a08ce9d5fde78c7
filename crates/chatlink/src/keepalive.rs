// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background keep-alive: a time-bounded permission for the socket to stay
//! open while the app is not in the foreground.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Why the socket is being kept alive in the background. Each reason grants
/// a fixed extension window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveReason {
    DidReceivePush,
    ReceiveMessage,
    ReceiveResponse,
}

impl KeepAliveReason {
    pub fn window(self) -> Duration {
        match self {
            Self::DidReceivePush => Duration::from_secs(20),
            Self::ReceiveMessage => Duration::from_secs(15),
            Self::ReceiveResponse => Duration::from_secs(5),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DidReceivePush => "didReceivePush",
            Self::ReceiveMessage => "receiveMessage",
            Self::ReceiveResponse => "receiveResponse",
        }
    }
}

/// The single active keep-alive grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundKeepAlive {
    pub reason: KeepAliveReason,
    pub until: Instant,
}

/// Holder for the at-most-one active keep-alive.
///
/// A new grant only replaces the current one when its deadline strictly
/// extends it.
#[derive(Debug, Default)]
pub struct KeepAliveStore {
    current: Mutex<Option<BackgroundKeepAlive>>,
}

impl KeepAliveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a keep-alive grant. Returns true when the grant took effect.
    pub fn extend(&self, reason: KeepAliveReason) -> bool {
        let until = Instant::now() + reason.window();
        let mut current = self.current.lock();
        match *current {
            Some(existing) if existing.until >= until => false,
            _ => {
                *current = Some(BackgroundKeepAlive { reason, until });
                true
            }
        }
    }

    /// Whether an unexpired grant is active. Expired grants are pruned.
    pub fn is_active(&self) -> bool {
        let mut current = self.current.lock();
        match *current {
            Some(existing) if existing.until > Instant::now() => true,
            Some(_) => {
                *current = None;
                false
            }
            None => false,
        }
    }

    pub fn current(&self) -> Option<BackgroundKeepAlive> {
        *self.current.lock()
    }
}

#[cfg(test)]
#[path = "keepalive_tests.rs"]
mod tests;
