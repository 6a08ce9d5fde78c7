// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Desired-state evaluation: a pure decision over observed inputs, separate
//! from the controller loop that acts on it.

use parking_lot::Mutex;

/// Whether the socket should be open or closed, with a diagnostic reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    Open(&'static str),
    Closed(&'static str),
}

impl DesiredState {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open(_))
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Open(reason) | Self::Closed(reason) => reason,
        }
    }
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(reason) => write!(f, "open({reason})"),
            Self::Closed(reason) => write!(f, "closed({reason})"),
        }
    }
}

/// Snapshot of every input the evaluator considers.
#[derive(Debug, Clone, Copy)]
pub struct EvaluatorInputs {
    pub app_ready: bool,
    pub registered: bool,
    pub app_expired: bool,
    pub can_use_sockets: bool,
    pub has_pending_requests: bool,
    pub has_unsubmitted_tokens: bool,
    pub can_build_transport: bool,
    pub app_active: bool,
    pub has_background_keepalive: bool,
}

/// Decide whether the socket should be open. First matching rule wins.
pub fn evaluate(inputs: &EvaluatorInputs) -> DesiredState {
    if !inputs.app_ready {
        return DesiredState::Closed("!appReady");
    }
    if !inputs.registered {
        return DesiredState::Closed("!registered");
    }
    if inputs.app_expired {
        return DesiredState::Closed("appExpired");
    }
    if !inputs.can_use_sockets {
        return DesiredState::Closed("!canAppUseSockets");
    }
    if inputs.has_pending_requests {
        return DesiredState::Open("hasPendingRequests");
    }
    if inputs.has_unsubmitted_tokens {
        return DesiredState::Open("unsubmittedRequestTokens");
    }
    if !inputs.can_build_transport {
        return DesiredState::Closed("cannotBuild");
    }
    if inputs.app_active {
        return DesiredState::Open("appActive");
    }
    if inputs.has_background_keepalive {
        return DesiredState::Open("hasBackgroundKeepAlive");
    }
    DesiredState::Closed("default")
}

/// App lifecycle flags feeding the evaluator.
///
/// Mutated by the connection handle outside the controller queue; the
/// controller snapshots them when reconciling.
#[derive(Debug, Clone, Copy)]
pub struct InputFlags {
    pub app_ready: bool,
    pub app_active: bool,
    pub app_expired: bool,
    pub can_use_sockets: bool,
}

impl Default for InputFlags {
    fn default() -> Self {
        Self { app_ready: false, app_active: false, app_expired: false, can_use_sockets: true }
    }
}

/// Shared holder for [`InputFlags`].
#[derive(Debug, Default)]
pub struct Inputs {
    flags: Mutex<InputFlags>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> InputFlags {
        *self.flags.lock()
    }

    pub fn set_app_ready(&self) {
        self.flags.lock().app_ready = true;
    }

    pub fn set_app_active(&self, active: bool) {
        self.flags.lock().app_active = active;
    }

    pub fn set_app_expired(&self, expired: bool) {
        self.flags.lock().app_expired = expired;
    }

    pub fn set_can_use_sockets(&self, can: bool) {
        self.flags.lock().can_use_sockets = can;
    }
}

#[cfg(test)]
#[path = "desired_tests.rs"]
mod tests;
