// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport seam: a thin interface over one WebSocket.
//!
//! The factory builds a transport that connects in the background and
//! reports [`TransportEvent`]s, in arrival order, on the returned channel.

pub mod ws;

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::ConnectionKind;

/// Connection-level failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The server rejected the handshake with an HTTP status.
    Http(u16),
    /// Socket-level I/O failure.
    Io(String),
    /// The socket closed (peer close frame, EOF, or local close).
    Closed,
}

impl TransportError {
    /// Handshake rejection status, when that is what happened.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http(status) => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(status) => write!(f, "handshake rejected with http {status}"),
            Self::Io(message) => write!(f, "socket error: {message}"),
            Self::Closed => f.write_str("socket closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Events a live transport reports to its owner.
#[derive(Debug)]
pub enum TransportEvent {
    /// Handshake completed; the socket is usable.
    Connected,
    /// One inbound binary frame.
    Frame(Bytes),
    /// Terminal: the socket is gone. No further events follow.
    Disconnected(TransportError),
}

/// One live or connecting WebSocket. Sends fail fast once closed.
pub trait Transport: Send + Sync {
    fn send(&self, frame: Bytes) -> Result<(), TransportError>;
    fn ping(&self) -> Result<(), TransportError>;
    fn close(&self);
}

/// A freshly built transport plus its event stream.
pub struct TransportHandle {
    pub transport: Arc<dyn Transport>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Builds transports for a connection kind.
pub trait TransportFactory: Send + Sync {
    /// Whether a socket can currently be built at all (e.g. identified
    /// requires credentials).
    fn can_build(&self, kind: ConnectionKind) -> bool;

    /// Start connecting. The returned transport reports `Connected` or
    /// `Disconnected` on its event channel.
    fn build(&self, kind: ConnectionKind) -> Result<TransportHandle, TransportError>;
}
