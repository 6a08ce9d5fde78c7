// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::{AckPolicy, BackgroundGuard, EnvelopeSource, ProcessorQueue};
use crate::test_support::RecordingProcessor;

#[tokio::test]
async fn envelope_jobs_run_in_order_and_reply() {
    let processor = Arc::new(RecordingProcessor::new(AckPolicy::Ack));
    let queue = ProcessorQueue::spawn(processor.clone(), CancellationToken::new());

    let first = queue.submit_envelope(Bytes::from_static(b"a"), 1, EnvelopeSource::Identified);
    let second = queue.submit_envelope(Bytes::from_static(b"b"), 2, EnvelopeSource::Unidentified);
    let flush = queue.flush_queue_emptied();

    assert_eq!(first.await.unwrap(), AckPolicy::Ack);
    assert_eq!(second.await.unwrap(), AckPolicy::Ack);
    flush.await.unwrap();

    let seen = processor.envelopes();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], (Bytes::from_static(b"a"), 1, EnvelopeSource::Identified));
    assert_eq!(seen[1], (Bytes::from_static(b"b"), 2, EnvelopeSource::Unidentified));
    assert_eq!(processor.queue_emptied_count(), 1);
}

#[tokio::test]
async fn shutdown_stops_the_worker() {
    let processor = Arc::new(RecordingProcessor::new(AckPolicy::Skip));
    let shutdown = CancellationToken::new();
    let queue = ProcessorQueue::spawn(processor.clone(), shutdown.clone());

    shutdown.cancel();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // A job submitted after shutdown never resolves; its reply is dropped.
    let reply = queue.submit_envelope(Bytes::new(), 0, EnvelopeSource::Identified);
    assert!(reply.await.is_err());
}

#[test]
fn background_guard_releases_once_on_drop() {
    let released = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&released);
    let guard = BackgroundGuard::new(move || flag.store(true, Ordering::SeqCst));

    assert!(!released.load(Ordering::SeqCst));
    drop(guard);
    assert!(released.load(Ordering::SeqCst));

    drop(BackgroundGuard::noop());
}
