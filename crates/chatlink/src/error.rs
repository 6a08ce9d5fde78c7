// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy surfaced to request callers.

use std::time::Duration;

use bytes::Bytes;

use crate::request::find_header;

/// Terminal outcome of a failed chat request.
///
/// Every request completes exactly once, with a success response or exactly
/// one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// App expired or not ready to issue requests.
    InvalidAppState { url: String },

    /// Malformed URL or method, body encoding failure, or a transport that
    /// rejected the frame at submit time.
    InvalidRequest { url: String },

    /// No open socket, socket closed mid-flight, or request timeout.
    NetworkFailure { url: String },

    /// Server responded with a non-2xx status.
    Http {
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
        url: String,
    },

    /// Only produced by `await_open` when the caller cancels the wait.
    Cancelled,
}

impl RequestError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAppState { .. } => "INVALID_APP_STATE",
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::NetworkFailure { .. } => "NETWORK_FAILURE",
            Self::Http { .. } => "HTTP_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// The request URL this error is about, when there is one.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::InvalidAppState { url }
            | Self::InvalidRequest { url }
            | Self::NetworkFailure { url }
            | Self::Http { url, .. } => Some(url),
            Self::Cancelled => None,
        }
    }

    pub fn is_network_failure(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. })
    }

    /// HTTP status for server error responses.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// `Retry-After` delay extracted from a server error response, when the
    /// server sent one in whole seconds.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { headers, .. } => find_header(headers, "retry-after")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAppState { url } => write!(f, "invalid app state ({url})"),
            Self::InvalidRequest { url } => write!(f, "invalid request ({url})"),
            Self::NetworkFailure { url } => write!(f, "network failure ({url})"),
            Self::Http { status, url, .. } => write!(f, "http {status} ({url})"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl std::error::Error for RequestError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
