// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which of the two parallel chat sockets a connection is.
///
/// The identified socket authenticates with the account credentials as URL
/// query parameters; the unidentified socket is anonymous and carries
/// sealed-sender traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Identified,
    Unidentified,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identified => "identified",
            Self::Unidentified => "unidentified",
        }
    }
}

impl std::fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server credentials for the identified socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCredentials {
    pub username: String,
    pub password: String,
}

/// Configuration for a chat connection.
///
/// Timer periods are expressed in milliseconds with `Duration` accessors so
/// tests can shrink them without faking clocks.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Chat server base URL with scheme, e.g. `wss://chat.example.org`.
    pub endpoint: String,

    /// Account credentials; required to build an identified socket.
    pub credentials: Option<ChatCredentials>,

    /// Extra headers sent on the WebSocket handshake (e.g. story headers).
    pub extra_headers: Vec<(String, String)>,

    /// Default `User-Agent` applied to outbound requests that lack one.
    pub user_agent: String,

    /// Default `Accept-Language` applied to outbound requests that lack one.
    pub accept_language: String,

    /// Heartbeat period for an open socket.
    pub heartbeat_ms: u64,

    /// Reconnect timer period while the socket should be open but is not.
    pub reconnect_ms: u64,

    /// How long a new socket may sit in `Connecting` before it is cycled.
    pub connect_watchdog_ms: u64,

    /// Per-request timeout; on expiry the request fails and the socket cycles.
    pub request_timeout_ms: u64,

    /// Background reconciliation tick while the app is inactive.
    pub background_tick_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            credentials: None,
            extra_headers: Vec::new(),
            user_agent: "Chatlink".to_owned(),
            accept_language: "en-US".to_owned(),
            heartbeat_ms: 30_000,
            reconnect_ms: 5_000,
            connect_watchdog_ms: 30_000,
            request_timeout_ms: 10_000,
            background_tick_ms: 1_000,
        }
    }
}

impl ChatConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }

    pub fn connect_watchdog(&self) -> Duration {
        Duration::from_millis(self.connect_watchdog_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn background_tick_interval(&self) -> Duration {
        Duration::from_millis(self.background_tick_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
