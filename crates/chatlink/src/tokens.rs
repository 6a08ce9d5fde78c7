// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unsubmitted request tokens.
//!
//! A token represents a request the caller intends to submit soon; its mere
//! existence forces the socket open. Tokens are minted by the connection
//! handle and removed when the request is handed to the socket or abandoned.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Opaque, process-unique handle for a not-yet-submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Live token accounting shared between the handle and the controller.
#[derive(Debug, Default)]
pub struct TokenSet {
    next: AtomicU64,
    live: Mutex<HashSet<u64>>,
}

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self) -> RequestToken {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.live.lock().insert(id);
        RequestToken(id)
    }

    /// Remove a token. Idempotent; returns whether it was still live.
    pub fn remove(&self, token: RequestToken) -> bool {
        self.live.lock().remove(&token.0)
    }

    pub fn is_empty(&self) -> bool {
        self.live.lock().is_empty()
    }

    pub fn contains(&self, token: RequestToken) -> bool {
        self.live.lock().contains(&token.0)
    }
}

#[cfg(test)]
#[path = "tokens_tests.rs"]
mod tests;
