// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seams to the rest of the client: envelope processing, registration
//! state, outage reporting, and background-execution leases.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::ConnectionKind;

/// Which socket delivered an envelope. Kept distinct from
/// [`ConnectionKind`] so the processor sees the sealed-sender origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeSource {
    Identified,
    Unidentified,
}

impl From<ConnectionKind> for EnvelopeSource {
    fn from(kind: ConnectionKind) -> Self {
        match kind {
            ConnectionKind::Identified => Self::Identified,
            ConnectionKind::Unidentified => Self::Unidentified,
        }
    }
}

/// Whether a processed envelope should be acknowledged to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    Ack,
    Skip,
}

/// Downstream pipeline for encrypted envelopes. Runs on a dedicated
/// single-threaded queue shared by both connection kinds.
pub trait MessageProcessor: Send + Sync + 'static {
    /// Process one envelope. `server_timestamp` is the server delivery
    /// timestamp in epoch milliseconds.
    fn process(
        &self,
        envelope: Bytes,
        server_timestamp: u64,
        source: EnvelopeSource,
    ) -> Pin<Box<dyn Future<Output = AckPolicy> + Send + '_>>;

    /// Called after the server signals queue-empty and every prior envelope
    /// has been processed.
    fn queue_emptied(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Account registration state consulted by the lifecycle policy.
pub trait RegistrationHooks: Send + Sync + 'static {
    fn is_registered(&self) -> bool;

    /// Invoked when the identified socket learns the account is no longer
    /// valid (HTTP 403), or on a successful identified connect (`false`).
    fn set_is_deregistered(&self, deregistered: bool);
}

/// Connection-level health reporting. Never told about individual request
/// errors.
pub trait OutageSink: Send + Sync + 'static {
    fn report_success(&self, kind: ConnectionKind);
    fn report_failure(&self, kind: ConnectionKind);
}

/// No-op [`OutageSink`].
pub struct NoopOutageSink;

impl OutageSink for NoopOutageSink {
    fn report_success(&self, _kind: ConnectionKind) {}
    fn report_failure(&self, _kind: ConnectionKind) {}
}

/// RAII lease that asks the host OS to keep the process alive while held.
pub struct BackgroundGuard(Option<Box<dyn FnOnce() + Send>>);

impl BackgroundGuard {
    /// A guard that releases nothing.
    pub fn noop() -> Self {
        Self(None)
    }

    /// A guard that runs `release` when dropped.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(release)))
    }
}

impl Drop for BackgroundGuard {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

/// Host platform's bounded background-execution facility. Platforms without
/// one use [`NoopBackgroundHost`].
pub trait BackgroundHost: Send + Sync + 'static {
    fn begin_background_work(&self, label: &'static str) -> BackgroundGuard;
}

/// [`BackgroundHost`] for platforms with no background-execution budget.
pub struct NoopBackgroundHost;

impl BackgroundHost for NoopBackgroundHost {
    fn begin_background_work(&self, _label: &'static str) -> BackgroundGuard {
        BackgroundGuard::noop()
    }
}

/// Everything the connection needs from the surrounding client.
#[derive(Clone)]
pub struct ChatServices {
    pub processor: Arc<dyn MessageProcessor>,
    pub registration: Arc<dyn RegistrationHooks>,
    pub outage: Arc<dyn OutageSink>,
    pub background: Arc<dyn BackgroundHost>,
}

pub(crate) enum ProcessorJob {
    Envelope {
        envelope: Bytes,
        server_timestamp: u64,
        source: EnvelopeSource,
        reply: oneshot::Sender<AckPolicy>,
    },
    QueueEmptied {
        reply: oneshot::Sender<()>,
    },
}

/// Single-threaded processing queue shared across connection kinds.
///
/// Jobs run strictly in submission order, so a queue-emptied flush observes
/// every envelope enqueued before it.
#[derive(Clone)]
pub struct ProcessorQueue {
    tx: mpsc::UnboundedSender<ProcessorJob>,
}

impl ProcessorQueue {
    pub fn spawn(processor: Arc<dyn MessageProcessor>, shutdown: CancellationToken) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProcessorJob>();
        tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    job = rx.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };
                match job {
                    ProcessorJob::Envelope { envelope, server_timestamp, source, reply } => {
                        let policy = processor.process(envelope, server_timestamp, source).await;
                        let _ = reply.send(policy);
                    }
                    ProcessorJob::QueueEmptied { reply } => {
                        processor.queue_emptied().await;
                        let _ = reply.send(());
                    }
                }
            }
        });
        Self { tx }
    }

    /// Enqueue an envelope; the receiver resolves with the ack decision.
    pub(crate) fn submit_envelope(
        &self,
        envelope: Bytes,
        server_timestamp: u64,
        source: EnvelopeSource,
    ) -> oneshot::Receiver<AckPolicy> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(ProcessorJob::Envelope { envelope, server_timestamp, source, reply });
        rx
    }

    /// Enqueue a queue-emptied flush behind all prior envelopes.
    pub(crate) fn flush_queue_emptied(&self) -> oneshot::Receiver<()> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(ProcessorJob::QueueEmptied { reply });
        rx
    }
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
