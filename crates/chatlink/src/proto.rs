// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protobuf framing for the chat WebSocket.
//!
//! Every frame on the socket is a [`WebSocketMessage`] envelope holding
//! either a request (client → server RPC, or server → client push) or a
//! response. Field tags mirror the server's wire definition.

use bytes::Bytes;

/// Discriminant for the [`WebSocketMessage`] envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum MessageKind {
    Unknown = 0,
    Request = 1,
    Response = 2,
}

/// Top-level frame envelope.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WebSocketMessage {
    #[prost(enumeration = "MessageKind", tag = "1")]
    pub kind: i32,

    #[prost(message, optional, tag = "2")]
    pub request: Option<WebSocketRequestMessage>,

    #[prost(message, optional, tag = "3")]
    pub response: Option<WebSocketResponseMessage>,
}

/// An RPC-style request framed inside the socket, in either direction.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WebSocketRequestMessage {
    /// HTTP method, e.g. `PUT`.
    #[prost(string, tag = "1")]
    pub verb: String,

    /// Absolute path with query, e.g. `/v1/profile`.
    #[prost(string, tag = "2")]
    pub path: String,

    #[prost(bytes = "bytes", optional, tag = "3")]
    pub body: Option<Bytes>,

    /// `Name:Value` header strings.
    #[prost(string, repeated, tag = "5")]
    pub headers: Vec<String>,

    #[prost(uint64, tag = "4")]
    pub request_id: u64,
}

/// A response correlated to a prior request by `request_id`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WebSocketResponseMessage {
    #[prost(uint64, tag = "1")]
    pub request_id: u64,

    #[prost(uint32, tag = "2")]
    pub status: u32,

    #[prost(string, optional, tag = "3")]
    pub message: Option<String>,

    /// `Name:Value` header strings.
    #[prost(string, repeated, tag = "5")]
    pub headers: Vec<String>,

    #[prost(bytes = "bytes", optional, tag = "4")]
    pub body: Option<Bytes>,
}

impl WebSocketMessage {
    /// Wrap a request in the envelope.
    pub fn request(request: WebSocketRequestMessage) -> Self {
        Self {
            kind: MessageKind::Request as i32,
            request: Some(request),
            response: None,
        }
    }

    /// Wrap a response in the envelope.
    pub fn response(response: WebSocketResponseMessage) -> Self {
        Self {
            kind: MessageKind::Response as i32,
            request: None,
            response: Some(response),
        }
    }

    /// Decode the discriminant, treating out-of-range values as `Unknown`.
    pub fn message_kind(&self) -> MessageKind {
        MessageKind::try_from(self.kind).unwrap_or(MessageKind::Unknown)
    }
}

#[cfg(test)]
#[path = "proto_tests.rs"]
mod tests;
