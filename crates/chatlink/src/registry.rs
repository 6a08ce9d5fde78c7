// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection registry of in-flight requests.
//!
//! Each entry owns a one-shot timeout task; whichever of response, timeout,
//! or drain reaches an entry first completes it, and the completion cell's
//! compare-and-swap guarantees exactly one delivery even off the registry's
//! lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::RequestError;
use crate::request::ChatResponse;

pub type CompletionResult = Result<ChatResponse, RequestError>;

/// Exactly-once completion cell for one request.
pub struct Completion {
    url: String,
    done: AtomicBool,
    sink: Mutex<Option<oneshot::Sender<CompletionResult>>>,
}

impl Completion {
    pub fn new(url: String, sink: oneshot::Sender<CompletionResult>) -> Arc<Self> {
        Arc::new(Self { url, done: AtomicBool::new(false), sink: Mutex::new(Some(sink)) })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_complete(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Deliver `result` if this cell is still incomplete. Returns whether
    /// this call won the race; losing calls are no-ops.
    fn finish(&self, result: CompletionResult) -> bool {
        if self.done.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return false;
        }
        if let Some(sink) = self.sink.lock().take() {
            // The caller may have stopped awaiting; delivery is best-effort.
            let _ = sink.send(result);
        }
        true
    }

    /// Complete from a server response. 2xx produces a success; anything
    /// else the preprocessed HTTP error.
    pub fn complete(
        &self,
        status: u16,
        message: String,
        headers: Vec<(String, String)>,
        body: Bytes,
    ) -> bool {
        let result = if (200..300).contains(&status) {
            Ok(ChatResponse { status, message, headers, body })
        } else {
            Err(RequestError::Http { status, headers, body, url: self.url.clone() })
        };
        self.finish(result)
    }

    pub fn fail_network(&self) -> bool {
        self.finish(Err(RequestError::NetworkFailure { url: self.url.clone() }))
    }

    pub fn fail_invalid(&self) -> bool {
        self.finish(Err(RequestError::InvalidRequest { url: self.url.clone() }))
    }
}

struct PendingRequest {
    completion: Arc<Completion>,
    started_at: Instant,
    timeout: JoinHandle<()>,
}

/// Map of outstanding `request_id` → pending completion for one connection
/// instance.
#[derive(Default)]
pub struct RequestRegistry {
    entries: Mutex<HashMap<u64, PendingRequest>>,
}

impl RequestRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an in-flight request and arm its timeout. On expiry the
    /// request fails with a network failure and `on_timeout` runs so the
    /// controller can cycle the socket.
    pub fn insert(
        self: &Arc<Self>,
        request_id: u64,
        completion: Arc<Completion>,
        timeout: Duration,
        on_timeout: impl FnOnce() + Send + 'static,
    ) {
        let registry = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(entry) = registry.entries.lock().remove(&request_id) else {
                return;
            };
            if entry.completion.fail_network() {
                tracing::warn!(
                    request_id,
                    url = entry.completion.url(),
                    elapsed = ?entry.started_at.elapsed(),
                    "request timed out"
                );
                on_timeout();
            }
        });

        let entry = PendingRequest { completion, started_at: Instant::now(), timeout: handle };
        let previous = self.entries.lock().insert(request_id, entry);
        if let Some(previous) = previous {
            // Random 64-bit collision within one instance.
            previous.timeout.abort();
            previous.completion.fail_network();
        }
    }

    /// Remove an entry, disarming its timeout.
    pub fn pop(&self, request_id: u64) -> Option<Arc<Completion>> {
        let entry = self.entries.lock().remove(&request_id)?;
        entry.timeout.abort();
        Some(entry.completion)
    }

    /// Fail every outstanding request with a network failure.
    pub fn drain_all(&self) {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock();
            entries.drain().collect()
        };
        for (_, entry) in drained {
            entry.timeout.abort();
            entry.completion.fail_network();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
