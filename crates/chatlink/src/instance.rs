// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One connection instance: a live or connecting socket together with its
//! request registry and per-instance tasks.

use std::sync::Arc;

use bytes::Bytes;
use prost::Message;
use tokio_util::sync::CancellationToken;

use crate::config::ConnectionKind;
use crate::observer::VisibleState;
use crate::proto::{WebSocketMessage, WebSocketResponseMessage};
use crate::registry::RequestRegistry;
use crate::transport::{Transport, TransportError};

/// State of one instance. `Disconnected` is terminal; a replacement
/// instance is created instead of reviving this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Connecting,
    Open,
    Disconnected,
}

/// A single socket attempt, identified by `id` so callbacks from a
/// superseded instance can be recognized and dropped.
pub struct ConnectionInstance {
    pub id: u64,
    pub kind: ConnectionKind,
    pub state: InstanceState,
    pub has_connected: bool,
    pub has_emptied_initial_queue: bool,
    pub registry: Arc<RequestRegistry>,
    transport: Arc<dyn Transport>,
    /// Cancels the event pump, heartbeat, and connect watchdog.
    cancel: CancellationToken,
}

impl ConnectionInstance {
    pub fn new(
        id: u64,
        kind: ConnectionKind,
        transport: Arc<dyn Transport>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            kind,
            state: InstanceState::Connecting,
            has_connected: false,
            has_emptied_initial_queue: false,
            registry: RequestRegistry::new(),
            transport,
            cancel,
        }
    }

    /// Token child-scoped to this instance, for its timer tasks.
    pub fn task_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn visible_state(&self) -> VisibleState {
        match self.state {
            InstanceState::Connecting => VisibleState::Connecting,
            InstanceState::Open => VisibleState::Open,
            InstanceState::Disconnected => VisibleState::Closed,
        }
    }

    pub fn send_frame(&self, frame: Bytes) -> Result<(), TransportError> {
        self.transport.send(frame)
    }

    pub fn ping(&self) -> Result<(), TransportError> {
        self.transport.ping()
    }

    /// Acknowledge a server-originated request.
    pub fn send_response(&self, request_id: u64, status: u32, message: &str) {
        let frame = WebSocketMessage::response(WebSocketResponseMessage {
            request_id,
            status,
            message: Some(message.to_owned()),
            headers: Vec::new(),
            body: None,
        });
        if let Err(e) = self.transport.send(Bytes::from(frame.encode_to_vec())) {
            tracing::debug!(kind = %self.kind, id = self.id, request_id, %e, "ack send failed");
        }
    }
}

impl Drop for ConnectionInstance {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.transport.close();
        self.registry.drain_all();
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
