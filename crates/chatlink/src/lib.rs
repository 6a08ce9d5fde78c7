// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chatlink: persistent authenticated WebSocket connection manager for the
//! chat service.
//!
//! Maintains one always-on duplex channel per [`config::ConnectionKind`]
//! (identified carries the account credentials, unidentified carries none),
//! multiplexes RPC-style requests over it, demultiplexes server-pushed
//! requests, and reconciles the socket's open/closed state against app
//! lifecycle, registration, pending work, and background keep-alive windows.

pub mod chat;
pub mod config;
pub mod controller;
pub mod desired;
pub mod error;
pub mod hooks;
pub mod instance;
pub mod keepalive;
pub mod observer;
pub mod proto;
pub mod registry;
pub mod request;
pub mod test_support;
pub mod tokens;
pub mod transport;

pub use chat::ChatConnection;
pub use config::{ChatConfig, ChatCredentials, ConnectionKind};
pub use error::RequestError;
pub use observer::{ConnectionEvent, VisibleState};
pub use request::{ChatResponse, OutboundRequest, RequestBody};
