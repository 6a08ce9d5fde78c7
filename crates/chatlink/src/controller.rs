// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle controller: the single-threaded owner of one connection.
//!
//! All mutation of the current instance, registry scheduling, and timer
//! state happens on this task's command loop. External inputs, timer
//! firings, and transport callbacks arrive as [`Command`]s; timers are
//! spawned tasks that post back into the queue.

use std::sync::Arc;

use bytes::Bytes;
use prost::Message;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ChatConfig, ConnectionKind};
use crate::desired::{evaluate, DesiredState, EvaluatorInputs, Inputs};
use crate::hooks::{AckPolicy, BackgroundGuard, ChatServices, EnvelopeSource, ProcessorQueue};
use crate::instance::{ConnectionInstance, InstanceState};
use crate::keepalive::{KeepAliveReason, KeepAliveStore};
use crate::observer::{StateObserver, VisibleState};
use crate::proto::{MessageKind, WebSocketMessage, WebSocketRequestMessage, WebSocketResponseMessage};
use crate::registry::{Completion, CompletionResult};
use crate::request::{build_request_frame, find_header, parse_wire_headers, OutboundRequest};
use crate::tokens::{RequestToken, TokenSet};
use crate::transport::{TransportEvent, TransportFactory};

/// Server-originated request paths the controller understands.
const MESSAGE_PATH: &str = "/api/v1/message";
const QUEUE_EMPTY_PATH: &str = "/api/v1/queue/empty";

/// Header carrying the server delivery timestamp on inbound messages.
const SERVER_TIMESTAMP_HEADER: &str = "x-signal-timestamp";

/// Work items for the controller queue.
pub(crate) enum Command {
    /// Re-evaluate desired state and make the socket match.
    Reconcile,
    /// Drop the current instance, then reconcile.
    Cycle,
    /// Submit an outbound request.
    Submit {
        request: OutboundRequest,
        token: RequestToken,
        reply: oneshot::Sender<CompletionResult>,
    },
    /// Event from an instance's transport.
    Transport { instance_id: u64, event: TransportEvent },
    /// Periodic liveness check for an open instance.
    HeartbeatTick { instance_id: u64 },
    /// The 30-second connect watchdog fired.
    ConnectWatchdogFired { instance_id: u64 },
    /// A registered request hit its timeout.
    RequestTimedOut { instance_id: u64 },
    /// The processor decided whether to acknowledge an inbound message.
    AckDecision { instance_id: u64, request_id: u64, ack: bool },
    /// The processing queue flushed after a server queue-empty signal.
    InitialQueueEmptied { instance_id: u64 },
}

struct BackgroundLease {
    cancel: CancellationToken,
    _guard: BackgroundGuard,
}

impl Drop for BackgroundLease {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub(crate) struct Controller {
    kind: ConnectionKind,
    config: Arc<ChatConfig>,
    factory: Arc<dyn TransportFactory>,
    services: ChatServices,
    processor: ProcessorQueue,
    inputs: Arc<Inputs>,
    tokens: Arc<TokenSet>,
    keepalive: Arc<KeepAliveStore>,
    observer: Arc<StateObserver>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,

    instance: Option<ConnectionInstance>,
    next_instance_id: u64,
    last_desired: Option<DesiredState>,
    reconnect: Option<CancellationToken>,
    background: Option<BackgroundLease>,
}

impl Controller {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        kind: ConnectionKind,
        config: Arc<ChatConfig>,
        factory: Arc<dyn TransportFactory>,
        services: ChatServices,
        processor: ProcessorQueue,
        inputs: Arc<Inputs>,
        tokens: Arc<TokenSet>,
        keepalive: Arc<KeepAliveStore>,
        observer: Arc<StateObserver>,
        cmd_tx: mpsc::UnboundedSender<Command>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            kind,
            config,
            factory,
            services,
            processor,
            inputs,
            tokens,
            keepalive,
            observer,
            cmd_tx,
            shutdown,
            instance: None,
            next_instance_id: 0,
            last_desired: None,
            reconnect: None,
            background: None,
        }
    }

    /// Command loop. Runs until shutdown or until every handle is dropped.
    pub(crate) async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            let command = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                command = cmd_rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            self.handle(command);
        }
        self.teardown();
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Reconcile => self.apply_desired_state(),
            Command::Cycle => self.cycle("requested"),
            Command::Submit { request, token, reply } => self.submit(request, token, reply),
            Command::Transport { instance_id, event } => self.on_transport(instance_id, event),
            Command::HeartbeatTick { instance_id } => self.on_heartbeat(instance_id),
            Command::ConnectWatchdogFired { instance_id } => self.on_watchdog(instance_id),
            Command::RequestTimedOut { instance_id } => self.on_request_timeout(instance_id),
            Command::AckDecision { instance_id, request_id, ack } => {
                self.on_ack_decision(instance_id, request_id, ack);
            }
            Command::InitialQueueEmptied { instance_id } => self.on_queue_emptied(instance_id),
        }
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    fn evaluator_inputs(&self) -> EvaluatorInputs {
        let flags = self.inputs.snapshot();
        EvaluatorInputs {
            app_ready: flags.app_ready,
            registered: self.services.registration.is_registered(),
            app_expired: flags.app_expired,
            can_use_sockets: flags.can_use_sockets,
            has_pending_requests: self
                .instance
                .as_ref()
                .is_some_and(|instance| !instance.registry.is_empty()),
            has_unsubmitted_tokens: !self.tokens.is_empty(),
            can_build_transport: self.factory.can_build(self.kind),
            app_active: flags.app_active,
            has_background_keepalive: self.keepalive.is_active(),
        }
    }

    fn visible_state(&self) -> VisibleState {
        self.instance.as_ref().map_or(VisibleState::Closed, ConnectionInstance::visible_state)
    }

    fn publish_state(&self) {
        self.observer.set_state(self.visible_state());
    }

    /// Reconcile the socket with the evaluator's verdict. Idempotent: with
    /// unchanged inputs, a second call performs no transport operations.
    fn apply_desired_state(&mut self) {
        let inputs = self.evaluator_inputs();
        if !inputs.app_ready {
            debug!(kind = %self.kind, "deferring reconcile until app is ready");
            return;
        }

        let desired = evaluate(&inputs);
        if self.last_desired != Some(desired) {
            debug!(kind = %self.kind, %desired, "desired state changed");
        }
        self.last_desired = Some(desired);

        match desired {
            DesiredState::Open(_) => {
                let needs_instance = self
                    .instance
                    .as_ref()
                    .map_or(true, |instance| instance.state == InstanceState::Disconnected);
                if needs_instance {
                    self.instance = None;
                    self.create_instance();
                }

                if self.visible_state() == VisibleState::Open {
                    self.cancel_reconnect();
                } else {
                    self.arm_reconnect();
                }

                if inputs.app_active {
                    self.background = None;
                } else {
                    self.ensure_background();
                }
            }
            DesiredState::Closed(reason) => {
                self.cancel_reconnect();
                if self.instance.take().is_some() {
                    info!(kind = %self.kind, reason, "closing socket");
                }
                self.background = None;
            }
        }

        self.publish_state();
    }

    /// Drop the current instance (draining its registry) and reconcile.
    fn cycle(&mut self, reason: &'static str) {
        if self.instance.take().is_some() {
            info!(kind = %self.kind, reason, "cycling socket");
        }
        self.apply_desired_state();
    }

    fn create_instance(&mut self) {
        let handle = match self.factory.build(self.kind) {
            Ok(handle) => handle,
            Err(e) => {
                // The evaluator saw a buildable transport moments ago; the
                // inputs changed underneath us. Stay closed until they do.
                warn!(kind = %self.kind, %e, "transport build failed");
                return;
            }
        };

        let id = self.next_instance_id;
        self.next_instance_id += 1;

        let instance =
            ConnectionInstance::new(id, self.kind, handle.transport, self.shutdown.child_token());

        self.spawn_event_pump(id, handle.events, instance.task_token());
        self.spawn_connect_watchdog(id, instance.task_token());

        debug!(kind = %self.kind, id, "connecting");
        self.instance = Some(instance);
    }

    fn spawn_event_pump(
        &self,
        instance_id: u64,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        cancel: CancellationToken,
    ) {
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let terminal = matches!(event, TransportEvent::Disconnected(_));
                if cmd_tx.send(Command::Transport { instance_id, event }).is_err() || terminal {
                    break;
                }
            }
        });
    }

    fn spawn_connect_watchdog(&self, instance_id: u64, cancel: CancellationToken) {
        let cmd_tx = self.cmd_tx.clone();
        let timeout = self.config.connect_watchdog();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let _ = cmd_tx.send(Command::ConnectWatchdogFired { instance_id });
                }
            }
        });
    }

    fn spawn_heartbeat(&self, instance_id: u64, cancel: CancellationToken) {
        let cmd_tx = self.cmd_tx.clone();
        let period = self.config.heartbeat_interval();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut timer = tokio::time::interval_at(start, period);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = timer.tick() => {
                        if cmd_tx.send(Command::HeartbeatTick { instance_id }).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn arm_reconnect(&mut self) {
        if self.reconnect.is_some() {
            return;
        }
        let cancel = self.shutdown.child_token();
        let cmd_tx = self.cmd_tx.clone();
        let period = self.config.reconnect_interval();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = tokio::time::sleep(period) => {
                        if cmd_tx.send(Command::Reconcile).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        self.reconnect = Some(cancel);
    }

    fn cancel_reconnect(&mut self) {
        if let Some(cancel) = self.reconnect.take() {
            cancel.cancel();
        }
    }

    /// While desired-open with the app inactive, hold a background lease and
    /// tick reconciliation at 1 Hz so the socket closes once the keep-alive
    /// window lapses.
    fn ensure_background(&mut self) {
        if self.background.is_some() {
            return;
        }
        let cancel = self.shutdown.child_token();
        let cmd_tx = self.cmd_tx.clone();
        let period = self.config.background_tick_interval();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = tokio::time::sleep(period) => {
                        if cmd_tx.send(Command::Reconcile).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        let guard = self.services.background.begin_background_work("chat-socket");
        self.background = Some(BackgroundLease { cancel, _guard: guard });
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    fn is_current(&self, instance_id: u64) -> bool {
        self.instance.as_ref().is_some_and(|instance| instance.id == instance_id)
    }

    fn on_transport(&mut self, instance_id: u64, event: TransportEvent) {
        if !self.is_current(instance_id) {
            debug!(kind = %self.kind, instance_id, "event from superseded instance dropped");
            return;
        }
        match event {
            TransportEvent::Connected => self.on_connected(instance_id),
            TransportEvent::Frame(frame) => self.on_frame(instance_id, frame),
            TransportEvent::Disconnected(error) => self.on_disconnected(error),
        }
    }

    fn on_connected(&mut self, instance_id: u64) {
        let token = {
            let Some(instance) = self.instance.as_mut() else { return };
            instance.has_connected = true;
            instance.state = InstanceState::Open;
            instance.task_token()
        };
        info!(kind = %self.kind, id = instance_id, "socket open");
        self.spawn_heartbeat(instance_id, token);

        if self.kind == ConnectionKind::Identified {
            self.services.registration.set_is_deregistered(false);
        }
        self.services.outage.report_success(self.kind);

        self.publish_state();
        self.apply_desired_state();
    }

    fn on_disconnected(&mut self, error: crate::transport::TransportError) {
        // Dropping the instance drains its registry with network failures.
        let instance = self.instance.take();
        if let Some(instance) = &instance {
            info!(kind = %self.kind, id = instance.id, %error, "socket disconnected");
        }
        drop(instance);

        if self.kind == ConnectionKind::Identified && error.http_status() == Some(403) {
            warn!(kind = %self.kind, "server rejected credentials; marking deregistered");
            self.services.registration.set_is_deregistered(true);
        }
        self.services.outage.report_failure(self.kind);
        self.publish_state();

        let inputs = self.evaluator_inputs();
        if inputs.app_ready && evaluate(&inputs).is_open() {
            self.arm_reconnect();
        } else {
            self.apply_desired_state();
        }
    }

    fn on_frame(&mut self, instance_id: u64, frame: Bytes) {
        let message = match WebSocketMessage::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(kind = %self.kind, %e, "undecodable frame dropped");
                return;
            }
        };
        match message.message_kind() {
            MessageKind::Request => match message.request {
                Some(request) => self.on_server_request(instance_id, request),
                None => warn!(kind = %self.kind, "request frame without request body"),
            },
            MessageKind::Response => match message.response {
                Some(response) => self.on_server_response(response),
                None => warn!(kind = %self.kind, "response frame without response body"),
            },
            MessageKind::Unknown => {
                warn!(kind = %self.kind, "frame with unknown discriminant dropped");
            }
        }
    }

    // ------------------------------------------------------------------
    // Server-originated requests
    // ------------------------------------------------------------------

    fn on_server_request(&mut self, instance_id: u64, request: WebSocketRequestMessage) {
        match (request.verb.as_str(), request.path.as_str()) {
            ("PUT", MESSAGE_PATH) => self.on_inbound_message(instance_id, request),
            ("GET", QUEUE_EMPTY_PATH) => self.on_queue_empty_signal(instance_id, request),
            (verb, path) => {
                info!(kind = %self.kind, verb, path, "unrecognized server request acked");
                if let Some(instance) = self.instance.as_ref() {
                    instance.send_response(request.request_id, 200, "OK");
                }
            }
        }
    }

    fn on_inbound_message(&mut self, instance_id: u64, request: WebSocketRequestMessage) {
        self.keepalive.extend(KeepAliveReason::ReceiveMessage);

        let headers = parse_wire_headers(&request.headers);
        let server_timestamp = match find_header(&headers, SERVER_TIMESTAMP_HEADER)
            .and_then(|value| value.parse::<u64>().ok())
        {
            Some(timestamp) => timestamp,
            None => {
                warn!(kind = %self.kind, "inbound message missing delivery timestamp");
                0
            }
        };

        let envelope = request.body.unwrap_or_default();
        let decision = self.processor.submit_envelope(
            envelope,
            server_timestamp,
            EnvelopeSource::from(self.kind),
        );

        let cmd_tx = self.cmd_tx.clone();
        let request_id = request.request_id;
        tokio::spawn(async move {
            // A dropped reply means the processor shut down; do not ack.
            let ack = matches!(decision.await, Ok(AckPolicy::Ack));
            let _ = cmd_tx.send(Command::AckDecision { instance_id, request_id, ack });
        });
    }

    fn on_queue_empty_signal(&mut self, instance_id: u64, request: WebSocketRequestMessage) {
        if let Some(instance) = self.instance.as_ref() {
            instance.send_response(request.request_id, 200, "OK");
        }

        let flushed = self.processor.flush_queue_emptied();
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            let _ = flushed.await;
            let _ = cmd_tx.send(Command::InitialQueueEmptied { instance_id });
        });
    }

    fn on_ack_decision(&mut self, instance_id: u64, request_id: u64, ack: bool) {
        if !self.is_current(instance_id) {
            return;
        }
        if ack {
            if let Some(instance) = self.instance.as_ref() {
                instance.send_response(request_id, 200, "OK");
            }
        } else {
            debug!(kind = %self.kind, request_id, "processor suppressed ack");
        }
        self.apply_desired_state();
    }

    fn on_queue_emptied(&mut self, instance_id: u64) {
        if !self.is_current(instance_id) {
            return;
        }
        let Some(instance) = self.instance.as_mut() else { return };
        if !instance.has_emptied_initial_queue {
            instance.has_emptied_initial_queue = true;
            info!(kind = %self.kind, id = instance.id, "initial queue emptied");
            self.observer.notify_queue_emptied();
        }
        self.apply_desired_state();
    }

    // ------------------------------------------------------------------
    // Responses to our requests
    // ------------------------------------------------------------------

    fn on_server_response(&mut self, response: WebSocketResponseMessage) {
        self.keepalive.extend(KeepAliveReason::ReceiveResponse);

        let Some(instance) = self.instance.as_ref() else { return };
        match instance.registry.pop(response.request_id) {
            Some(completion) => {
                let status = response.status.min(u16::MAX as u32) as u16;
                let headers = parse_wire_headers(&response.headers);
                let body = response.body.unwrap_or_default();
                let delivered = completion.complete(
                    status,
                    response.message.unwrap_or_default(),
                    headers,
                    body,
                );
                if delivered && (200..300).contains(&status) {
                    self.services.outage.report_success(self.kind);
                }
            }
            None => {
                debug!(
                    kind = %self.kind,
                    request_id = response.request_id,
                    "response for unknown request dropped"
                );
            }
        }
        self.apply_desired_state();
    }

    // ------------------------------------------------------------------
    // Outbound submission
    // ------------------------------------------------------------------

    fn submit(
        &mut self,
        request: OutboundRequest,
        token: RequestToken,
        reply: oneshot::Sender<CompletionResult>,
    ) {
        self.tokens.remove(token);

        let url = request.path.clone();
        let completion = Completion::new(url, reply);

        if !request.validate() {
            completion.fail_invalid();
            self.apply_desired_state();
            return;
        }

        let instance = match self.instance.as_ref() {
            Some(instance) if instance.state == InstanceState::Open => instance,
            _ => {
                completion.fail_network();
                self.apply_desired_state();
                return;
            }
        };

        let request_id = rand::random::<u64>();
        let Some(frame) = build_request_frame(&request, &self.config, request_id) else {
            completion.fail_invalid();
            return;
        };

        let cmd_tx = self.cmd_tx.clone();
        let instance_id = instance.id;
        instance.registry.insert(
            request_id,
            Arc::clone(&completion),
            self.config.request_timeout(),
            move || {
                let _ = cmd_tx.send(Command::RequestTimedOut { instance_id });
            },
        );

        let bytes = Bytes::from(WebSocketMessage::request(frame).encode_to_vec());
        debug!(kind = %self.kind, request_id, method = %request.method, url = %request.path, "request sent");
        if let Err(e) = instance.send_frame(bytes) {
            warn!(kind = %self.kind, request_id, %e, "request send failed");
            if let Some(completion) = instance.registry.pop(request_id) {
                completion.fail_invalid();
            }
        }
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    fn on_heartbeat(&mut self, instance_id: u64) {
        if !self.is_current(instance_id) {
            return;
        }
        let inputs = self.evaluator_inputs();
        if inputs.app_ready && evaluate(&inputs).is_open() {
            if let Some(instance) = self.instance.as_ref() {
                if instance.state == InstanceState::Open {
                    if let Err(e) = instance.ping() {
                        debug!(kind = %self.kind, %e, "heartbeat ping failed");
                    }
                }
            }
        } else {
            self.apply_desired_state();
        }
    }

    fn on_watchdog(&mut self, instance_id: u64) {
        if !self.is_current(instance_id) {
            return;
        }
        let stuck = self.instance.as_ref().is_some_and(|instance| !instance.has_connected);
        if stuck {
            warn!(kind = %self.kind, instance_id, "connect watchdog fired");
            self.cycle("connectTimeout");
        }
    }

    fn on_request_timeout(&mut self, instance_id: u64) {
        // The registry already failed the request; a socket that swallows a
        // request gets replaced.
        if !self.is_current(instance_id) {
            return;
        }
        self.cycle("requestTimeout");
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    fn teardown(&mut self) {
        self.cancel_reconnect();
        self.background = None;
        self.instance = None;
        self.publish_state();
        self.observer.fail_all_waiters();
        debug!(kind = %self.kind, "controller stopped");
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
