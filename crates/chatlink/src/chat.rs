// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Public handle to one chat connection.
//!
//! Cheap to clone; every clone talks to the same controller task. Lifecycle
//! inputs update shared flags and post work to the controller queue, so no
//! caller ever blocks on socket state.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::{ChatConfig, ConnectionKind};
use crate::controller::{Command, Controller};
use crate::desired::Inputs;
use crate::error::RequestError;
use crate::hooks::{ChatServices, ProcessorQueue};
use crate::keepalive::{KeepAliveReason, KeepAliveStore};
use crate::observer::{ConnectionEvent, StateObserver, VisibleState};
use crate::registry::CompletionResult;
use crate::request::{ChatResponse, OutboundRequest};
use crate::tokens::{RequestToken, TokenSet};
use crate::transport::TransportFactory;

/// Handle to one persistent chat connection.
#[derive(Clone)]
pub struct ChatConnection {
    kind: ConnectionKind,
    cmd_tx: mpsc::UnboundedSender<Command>,
    inputs: Arc<Inputs>,
    tokens: Arc<TokenSet>,
    keepalive: Arc<KeepAliveStore>,
    observer: Arc<StateObserver>,
    shutdown: CancellationToken,
}

impl ChatConnection {
    /// Spawn a connection with its own processing queue.
    pub fn spawn(
        kind: ConnectionKind,
        config: ChatConfig,
        factory: Arc<dyn TransportFactory>,
        services: ChatServices,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let queue = ProcessorQueue::spawn(Arc::clone(&services.processor), shutdown.child_token());
        Self::spawn_with_queue(kind, Arc::new(config), factory, services, queue, shutdown)
    }

    /// Spawn the identified and unidentified connections sharing one
    /// message-processing queue, as a client runs them in practice.
    pub fn spawn_pair(
        config: ChatConfig,
        factory: Arc<dyn TransportFactory>,
        services: ChatServices,
    ) -> (Self, Self) {
        let config = Arc::new(config);
        let parent = CancellationToken::new();
        let queue = ProcessorQueue::spawn(Arc::clone(&services.processor), parent.child_token());
        let identified = Self::spawn_with_queue(
            ConnectionKind::Identified,
            Arc::clone(&config),
            Arc::clone(&factory),
            services.clone(),
            queue.clone(),
            parent.child_token(),
        );
        let unidentified = Self::spawn_with_queue(
            ConnectionKind::Unidentified,
            config,
            factory,
            services,
            queue,
            parent.child_token(),
        );
        (identified, unidentified)
    }

    pub(crate) fn spawn_with_queue(
        kind: ConnectionKind,
        config: Arc<ChatConfig>,
        factory: Arc<dyn TransportFactory>,
        services: ChatServices,
        queue: ProcessorQueue,
        shutdown: CancellationToken,
    ) -> Self {
        let inputs = Arc::new(Inputs::new());
        let tokens = Arc::new(TokenSet::new());
        let keepalive = Arc::new(KeepAliveStore::new());
        let observer = Arc::new(StateObserver::new(kind));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let controller = Controller::new(
            kind,
            config,
            factory,
            services,
            queue,
            Arc::clone(&inputs),
            Arc::clone(&tokens),
            Arc::clone(&keepalive),
            Arc::clone(&observer),
            cmd_tx.clone(),
            shutdown.clone(),
        );
        tokio::spawn(controller.run(cmd_rx));

        Self { kind, cmd_tx, inputs, tokens, keepalive, observer, shutdown }
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn state(&self) -> VisibleState {
        self.observer.state()
    }

    /// Subscribe to state-change and queue-emptied events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.observer.subscribe()
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Mint a token for a request the caller intends to submit soon. The
    /// live token forces the socket open until it is consumed by
    /// [`Self::make_request`] or dropped with [`Self::abandon_request_token`].
    pub fn request_token(&self) -> RequestToken {
        let token = self.tokens.mint();
        self.post(Command::Reconcile);
        token
    }

    /// Give up a minted token without submitting its request.
    pub fn abandon_request_token(&self, token: RequestToken) {
        if self.tokens.remove(token) {
            self.post(Command::Reconcile);
        }
    }

    /// Submit a request and await its typed response.
    ///
    /// Exactly one completion is delivered. Dropping the returned future
    /// stops the caller from awaiting but does not cancel the in-flight
    /// socket request; the wire protocol has no cancel frame.
    pub async fn make_request(
        &self,
        request: OutboundRequest,
        token: RequestToken,
    ) -> Result<ChatResponse, RequestError> {
        let url = request.path.clone();

        if self.inputs.snapshot().app_expired {
            self.abandon_request_token(token);
            return Err(RequestError::InvalidAppState { url });
        }

        let wants_identified = self.kind == ConnectionKind::Identified;
        debug_assert_eq!(
            request.authenticated, wants_identified,
            "request authentication does not match connection kind"
        );
        if request.authenticated != wants_identified {
            self.abandon_request_token(token);
            return Err(RequestError::InvalidRequest { url });
        }

        let (reply, response) = oneshot::channel::<CompletionResult>();
        if self.cmd_tx.send(Command::Submit { request, token, reply }).is_err() {
            self.tokens.remove(token);
            return Err(RequestError::NetworkFailure { url });
        }

        match response.await {
            Ok(result) => result,
            // Controller went away mid-flight.
            Err(_) => Err(RequestError::NetworkFailure { url }),
        }
    }

    /// Wait until the connection is open. See [`StateObserver::await_open`].
    pub async fn await_open(&self, cancel: &CancellationToken) -> Result<(), RequestError> {
        self.observer.await_open(cancel).await
    }

    // ------------------------------------------------------------------
    // Lifecycle inputs
    // ------------------------------------------------------------------

    /// The app finished launching and can open sockets.
    pub fn app_became_ready(&self) {
        self.inputs.set_app_ready();
        self.post(Command::Reconcile);
    }

    pub fn app_became_active(&self) {
        self.inputs.set_app_active(true);
        self.post(Command::Reconcile);
    }

    pub fn app_will_resign_active(&self) {
        self.inputs.set_app_active(false);
        self.post(Command::Reconcile);
    }

    /// Registration state changed in either direction.
    pub fn registration_state_changed(&self) {
        self.post(Command::Reconcile);
    }

    pub fn app_expiry_changed(&self, expired: bool) {
        self.inputs.set_app_expired(expired);
        self.post(Command::Cycle);
    }

    pub fn can_use_sockets_changed(&self, can: bool) {
        self.inputs.set_can_use_sockets(can);
        self.post(Command::Reconcile);
    }

    /// A push arrived; hold the socket open for its keep-alive window.
    pub fn did_receive_push(&self) {
        self.keepalive.extend(KeepAliveReason::DidReceivePush);
        self.post(Command::Reconcile);
    }

    pub fn local_identity_changed(&self) {
        self.post(Command::Cycle);
    }

    pub fn censorship_circumvention_changed(&self) {
        self.post(Command::Cycle);
    }

    /// Proxy readiness changed; a newly ready proxy cycles the socket onto
    /// the fresh route.
    pub fn proxy_ready_changed(&self, ready: bool) {
        if ready {
            self.post(Command::Cycle);
        } else {
            self.post(Command::Reconcile);
        }
    }

    pub fn stories_enabled_changed(&self) {
        self.post(Command::Cycle);
    }

    /// Stop the controller, failing all pending work.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn post(&self, command: Command) {
        let _ = self.cmd_tx.send(command);
    }
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
