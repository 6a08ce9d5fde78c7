// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound request and response shaping.
//!
//! Callers supply a relative URL (no scheme, host, or leading slash); the
//! frame builder prefixes the slash, fills default headers, and serializes
//! JSON parameter bodies.

use bytes::Bytes;

use crate::config::ChatConfig;
use crate::proto::WebSocketRequestMessage;

/// Body of an outbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    None,
    /// Preformed payload, sent as-is.
    Raw(Bytes),
    /// Parameter map, JSON-encoded at frame-build time.
    Json(serde_json::Value),
}

/// An RPC-style request to submit over the socket.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// HTTP method; must be non-empty.
    pub method: String,

    /// Relative URL with optional query, e.g. `v1/profile?x=1`.
    pub path: String,

    pub headers: Vec<(String, String)>,

    pub body: RequestBody,

    /// Whether this request belongs on the identified socket.
    pub authenticated: bool,
}

impl OutboundRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>, authenticated: bool) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: Vec::new(),
            body: RequestBody::None,
            authenticated,
        }
    }

    /// Check method and URL shape. The URL must be relative: no scheme or
    /// host, no leading slash.
    pub(crate) fn validate(&self) -> bool {
        if self.method.is_empty() || self.path.is_empty() {
            return false;
        }
        if self.path.starts_with('/') || self.path.contains("://") {
            return false;
        }
        true
    }
}

/// A successful (2xx) response to an outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub status: u16,
    pub message: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Build the wire request for an already-validated [`OutboundRequest`].
///
/// Defaults `User-Agent` and `Accept-Language` when the caller did not set
/// them. `Content-Type: application/json` is added only for JSON parameter
/// bodies and only when the caller supplied no `Content-Type` of their own.
///
/// Returns `None` when the JSON body fails to encode.
pub(crate) fn build_request_frame(
    request: &OutboundRequest,
    config: &ChatConfig,
    request_id: u64,
) -> Option<WebSocketRequestMessage> {
    let mut headers = request.headers.clone();
    if find_header(&headers, "user-agent").is_none() {
        headers.push(("User-Agent".to_owned(), config.user_agent.clone()));
    }
    if find_header(&headers, "accept-language").is_none() {
        headers.push(("Accept-Language".to_owned(), config.accept_language.clone()));
    }

    let body = match &request.body {
        RequestBody::None => None,
        RequestBody::Raw(bytes) => Some(bytes.clone()),
        RequestBody::Json(value) => {
            let encoded = serde_json::to_vec(value).ok()?;
            if find_header(&headers, "content-type").is_none() {
                headers.push(("Content-Type".to_owned(), "application/json".to_owned()));
            }
            Some(Bytes::from(encoded))
        }
    };

    Some(WebSocketRequestMessage {
        verb: request.method.clone(),
        path: format!("/{}", request.path),
        body,
        headers: headers.iter().map(|(name, value)| format!("{name}:{value}")).collect(),
        request_id,
    })
}

/// Split `Name:Value` wire header strings into pairs. Malformed entries
/// (no colon) are dropped.
pub(crate) fn parse_wire_headers(headers: &[String]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_owned(), value.trim().to_owned()))
        })
        .collect()
}

/// Case-insensitive header lookup.
pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
