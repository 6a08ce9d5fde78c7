// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use super::{Completion, RequestRegistry};
use crate::error::RequestError;

fn completion(url: &str) -> (Arc<Completion>, oneshot::Receiver<super::CompletionResult>) {
    let (tx, rx) = oneshot::channel();
    (Completion::new(url.to_owned(), tx), rx)
}

#[tokio::test]
async fn success_and_http_error_shaping() {
    let (c, rx) = completion("v1/ok");
    assert!(c.complete(204, "No Content".to_owned(), Vec::new(), Bytes::new()));
    let response = rx.await.unwrap().unwrap();
    assert_eq!(response.status, 204);

    let (c, rx) = completion("v1/limited");
    let headers = vec![("Retry-After".to_owned(), "30".to_owned())];
    assert!(c.complete(429, String::new(), headers, Bytes::new()));
    let err = rx.await.unwrap().unwrap_err();
    assert_eq!(err.http_status(), Some(429));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
}

#[tokio::test]
async fn completion_is_exactly_once() {
    let (c, rx) = completion("v1/once");
    assert!(c.fail_network());
    assert!(!c.complete(200, String::new(), Vec::new(), Bytes::new()));
    assert!(!c.fail_invalid());
    assert!(c.is_complete());

    assert_eq!(rx.await.unwrap(), Err(RequestError::NetworkFailure { url: "v1/once".to_owned() }));
}

#[tokio::test(start_paused = true)]
async fn timeout_fails_request_and_signals_controller() {
    let registry = RequestRegistry::new();
    let fired = Arc::new(AtomicUsize::new(0));

    let (c, rx) = completion("v1/slow");
    let fired_clone = Arc::clone(&fired);
    registry.insert(1, c, Duration::from_secs(10), move || {
        fired_clone.fetch_add(1, Ordering::SeqCst);
    });

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(rx.await.unwrap(), Err(RequestError::NetworkFailure { url: "v1/slow".to_owned() }));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn pop_disarms_timeout() {
    let registry = RequestRegistry::new();
    let fired = Arc::new(AtomicUsize::new(0));

    let (c, rx) = completion("v1/fast");
    let fired_clone = Arc::clone(&fired);
    registry.insert(2, c, Duration::from_secs(10), move || {
        fired_clone.fetch_add(1, Ordering::SeqCst);
    });

    let popped = registry.pop(2).unwrap();
    assert!(popped.complete(200, "OK".to_owned(), Vec::new(), Bytes::new()));

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(rx.await.unwrap().is_ok());
}

#[tokio::test]
async fn drain_fails_everything_pending() {
    let registry = RequestRegistry::new();
    let (c1, rx1) = completion("v1/a");
    let (c2, rx2) = completion("v1/b");
    registry.insert(1, c1, Duration::from_secs(10), || {});
    registry.insert(2, c2, Duration::from_secs(10), || {});
    assert_eq!(registry.len(), 2);

    registry.drain_all();
    assert!(registry.is_empty());
    assert!(rx1.await.unwrap().unwrap_err().is_network_failure());
    assert!(rx2.await.unwrap().unwrap_err().is_network_failure());
}

#[tokio::test]
async fn pop_unknown_id_is_none() {
    let registry = RequestRegistry::new();
    assert!(registry.pop(999).is_none());
}
