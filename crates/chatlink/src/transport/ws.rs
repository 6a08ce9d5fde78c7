// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket transport over `tokio-tungstenite`.
//!
//! `build` returns immediately; a background task performs the handshake
//! and then pumps reads and writes until the socket dies or the transport
//! is closed.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, Request};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::{Transport, TransportError, TransportEvent, TransportFactory, TransportHandle};
use crate::config::{ChatConfig, ConnectionKind};

/// Builds [`WsTransport`]s from the chat endpoint configuration.
pub struct WsTransportFactory {
    config: Arc<ChatConfig>,
}

impl WsTransportFactory {
    pub fn new(config: Arc<ChatConfig>) -> Self {
        Self { config }
    }
}

impl TransportFactory for WsTransportFactory {
    fn can_build(&self, kind: ConnectionKind) -> bool {
        !self.config.endpoint.is_empty()
            && (kind == ConnectionKind::Unidentified || self.config.credentials.is_some())
    }

    fn build(&self, kind: ConnectionKind) -> Result<TransportHandle, TransportError> {
        let request = client_request(&self.config, kind)?;
        let (event_tx, events) = mpsc::unbounded_channel();
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(run_socket(kind, request, event_tx, write_rx, cancel.clone()));

        let transport = Arc::new(WsTransport { write_tx, cancel });
        Ok(TransportHandle { transport, events })
    }
}

enum WriteOp {
    Frame(Bytes),
    Ping,
}

/// Handle to a live socket's writer; cheap to share with the owning
/// connection instance.
pub struct WsTransport {
    write_tx: mpsc::UnboundedSender<WriteOp>,
    cancel: CancellationToken,
}

impl Transport for WsTransport {
    fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        self.write_tx.send(WriteOp::Frame(frame)).map_err(|_| TransportError::Closed)
    }

    fn ping(&self) -> Result<(), TransportError> {
        self.write_tx.send(WriteOp::Ping).map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Build the handshake request: endpoint URL, credential query for the
/// identified socket, and configured extra headers.
fn client_request(
    config: &ChatConfig,
    kind: ConnectionKind,
) -> Result<Request<()>, TransportError> {
    let url = chat_url(config, kind)?;
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::Io(format!("bad endpoint url: {e}")))?;

    for (name, value) in &config.extra_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Io(format!("bad header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Io(format!("bad header value: {e}")))?;
        request.headers_mut().append(name, value);
    }
    Ok(request)
}

fn chat_url(config: &ChatConfig, kind: ConnectionKind) -> Result<String, TransportError> {
    let base = format!("{}/v1/websocket/", config.endpoint.trim_end_matches('/'));
    match kind {
        ConnectionKind::Unidentified => Ok(base),
        ConnectionKind::Identified => {
            let credentials = config
                .credentials
                .as_ref()
                .ok_or_else(|| TransportError::Io("identified socket without credentials".into()))?;
            Ok(format!(
                "{base}?login={}&password={}",
                urlencoding::encode(&credentials.username),
                urlencoding::encode(&credentials.password),
            ))
        }
    }
}

/// Connect, then pump frames both ways until disconnect or close.
async fn run_socket(
    kind: ConnectionKind,
    request: Request<()>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    mut write_rx: mpsc::UnboundedReceiver<WriteOp>,
    cancel: CancellationToken,
) {
    let stream = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = event_tx.send(TransportEvent::Disconnected(TransportError::Closed));
            return;
        }
        connected = connect_async(request) => match connected {
            Ok((stream, _response)) => stream,
            Err(e) => {
                let error = map_handshake_error(e);
                tracing::debug!(%kind, %error, "websocket connect failed");
                let _ = event_tx.send(TransportEvent::Disconnected(error));
                return;
            }
        },
    };

    tracing::debug!(%kind, "websocket connected");
    let _ = event_tx.send(TransportEvent::Connected);

    let (mut sink, mut read) = stream.split();

    let error = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break TransportError::Closed;
            }
            op = write_rx.recv() => {
                let message = match op {
                    Some(WriteOp::Frame(frame)) => Message::Binary(frame),
                    Some(WriteOp::Ping) => Message::Ping(Bytes::new()),
                    // All senders gone; the owner is shutting down.
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break TransportError::Closed;
                    }
                };
                if let Err(e) = sink.send(message).await {
                    break map_stream_error(e);
                }
            }
            inbound = read.next() => match inbound {
                Some(Ok(Message::Binary(frame))) => {
                    let _ = event_tx.send(TransportEvent::Frame(frame));
                }
                Some(Ok(Message::Close(_))) | None => break TransportError::Closed,
                // Text is not part of the protocol; pings are answered by
                // the library and pongs carry no state here.
                Some(Ok(other)) => {
                    tracing::trace!(%kind, ?other, "ignoring non-binary message");
                }
                Some(Err(e)) => break map_stream_error(e),
            }
        }
    };

    tracing::debug!(%kind, %error, "websocket disconnected");
    let _ = event_tx.send(TransportEvent::Disconnected(error));
}

fn map_handshake_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::Http(response) => TransportError::Http(response.status().as_u16()),
        other => TransportError::Io(other.to_string()),
    }
}

fn map_stream_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        tungstenite::Error::Http(response) => TransportError::Http(response.status().as_u16()),
        other => TransportError::Io(other.to_string()),
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
