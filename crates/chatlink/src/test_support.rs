// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: mock transport, recording hooks, and a
//! harness builder for driving a connection without a network.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use prost::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chat::ChatConnection;
use crate::config::{ChatConfig, ConnectionKind};
use crate::hooks::{
    AckPolicy, BackgroundGuard, BackgroundHost, ChatServices, EnvelopeSource, MessageProcessor,
    OutageSink, ProcessorQueue, RegistrationHooks,
};
use crate::proto::WebSocketMessage;
use crate::transport::{
    Transport, TransportError, TransportEvent, TransportFactory, TransportHandle,
};

/// Scripted transport that records writes and lets tests inject events.
pub struct MockTransport {
    sent: Mutex<Vec<Bytes>>,
    pings: AtomicUsize,
    closed: AtomicBool,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl MockTransport {
    pub fn emit_connected(&self) {
        let _ = self.event_tx.send(TransportEvent::Connected);
    }

    pub fn emit_frame(&self, frame: Bytes) {
        let _ = self.event_tx.send(TransportEvent::Frame(frame));
    }

    pub fn emit_message(&self, message: &WebSocketMessage) {
        self.emit_frame(Bytes::from(message.encode_to_vec()));
    }

    pub fn emit_disconnected(&self, error: TransportError) {
        let _ = self.event_tx.send(TransportEvent::Disconnected(error));
    }

    pub fn sent_frames(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    /// Decode everything written to the socket.
    pub fn sent_messages(&self) -> Vec<WebSocketMessage> {
        self.sent
            .lock()
            .iter()
            .filter_map(|frame| WebSocketMessage::decode(frame.clone()).ok())
            .collect()
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    fn ping(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory producing [`MockTransport`]s, optionally auto-connecting them.
pub struct MockTransportFactory {
    can_build: AtomicBool,
    auto_connect: AtomicBool,
    built: Mutex<Vec<Arc<MockTransport>>>,
}

impl Default for MockTransportFactory {
    fn default() -> Self {
        Self {
            can_build: AtomicBool::new(true),
            auto_connect: AtomicBool::new(true),
            built: Mutex::new(Vec::new()),
        }
    }
}

impl MockTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_can_build(&self, can: bool) {
        self.can_build.store(can, Ordering::SeqCst);
    }

    /// When false, built transports stay in `Connecting` until the test
    /// emits an event itself.
    pub fn set_auto_connect(&self, auto: bool) {
        self.auto_connect.store(auto, Ordering::SeqCst);
    }

    pub fn built_count(&self) -> usize {
        self.built.lock().len()
    }

    pub fn latest(&self) -> Option<Arc<MockTransport>> {
        self.built.lock().last().map(Arc::clone)
    }
}

impl TransportFactory for MockTransportFactory {
    fn can_build(&self, _kind: ConnectionKind) -> bool {
        self.can_build.load(Ordering::SeqCst)
    }

    fn build(&self, _kind: ConnectionKind) -> Result<TransportHandle, TransportError> {
        if !self.can_build.load(Ordering::SeqCst) {
            return Err(TransportError::Io("mock factory disabled".into()));
        }
        let (event_tx, events) = mpsc::unbounded_channel();
        let transport = Arc::new(MockTransport {
            sent: Mutex::new(Vec::new()),
            pings: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            event_tx,
        });
        if self.auto_connect.load(Ordering::SeqCst) {
            transport.emit_connected();
        }
        self.built.lock().push(Arc::clone(&transport));
        Ok(TransportHandle { transport, events })
    }
}

/// Processor that records envelopes and returns a configured ack policy.
pub struct RecordingProcessor {
    ack: Mutex<AckPolicy>,
    envelopes: Mutex<Vec<(Bytes, u64, EnvelopeSource)>>,
    queue_emptied: AtomicUsize,
}

impl RecordingProcessor {
    pub fn new(ack: AckPolicy) -> Self {
        Self {
            ack: Mutex::new(ack),
            envelopes: Mutex::new(Vec::new()),
            queue_emptied: AtomicUsize::new(0),
        }
    }

    pub fn set_ack(&self, ack: AckPolicy) {
        *self.ack.lock() = ack;
    }

    pub fn envelopes(&self) -> Vec<(Bytes, u64, EnvelopeSource)> {
        self.envelopes.lock().clone()
    }

    pub fn queue_emptied_count(&self) -> usize {
        self.queue_emptied.load(Ordering::SeqCst)
    }
}

impl MessageProcessor for RecordingProcessor {
    fn process(
        &self,
        envelope: Bytes,
        server_timestamp: u64,
        source: EnvelopeSource,
    ) -> Pin<Box<dyn Future<Output = AckPolicy> + Send + '_>> {
        self.envelopes.lock().push((envelope, server_timestamp, source));
        let ack = *self.ack.lock();
        Box::pin(async move { ack })
    }

    fn queue_emptied(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.queue_emptied.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    }
}

/// Registration hooks backed by a flag, recording deregistration calls.
pub struct TestRegistration {
    registered: AtomicBool,
    calls: Mutex<Vec<bool>>,
}

impl TestRegistration {
    pub fn new(registered: bool) -> Self {
        Self { registered: AtomicBool::new(registered), calls: Mutex::new(Vec::new()) }
    }

    pub fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::SeqCst);
    }

    pub fn deregistered_calls(&self) -> Vec<bool> {
        self.calls.lock().clone()
    }
}

impl RegistrationHooks for TestRegistration {
    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    fn set_is_deregistered(&self, deregistered: bool) {
        self.calls.lock().push(deregistered);
        self.registered.store(!deregistered, Ordering::SeqCst);
    }
}

/// Counts connection-level successes and failures.
#[derive(Default)]
pub struct RecordingOutage {
    successes: AtomicUsize,
    failures: AtomicUsize,
}

impl RecordingOutage {
    pub fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

impl OutageSink for RecordingOutage {
    fn report_success(&self, _kind: ConnectionKind) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn report_failure(&self, _kind: ConnectionKind) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }
}

/// Background host tracking the number of live leases.
#[derive(Default)]
pub struct CountingBackgroundHost {
    active: Arc<AtomicIsize>,
    begun: AtomicUsize,
}

impl CountingBackgroundHost {
    pub fn active(&self) -> isize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }
}

impl BackgroundHost for CountingBackgroundHost {
    fn begin_background_work(&self, _label: &'static str) -> BackgroundGuard {
        self.begun.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        let active = Arc::clone(&self.active);
        BackgroundGuard::new(move || {
            active.fetch_sub(1, Ordering::SeqCst);
        })
    }
}

/// Everything a harness test needs to drive and observe one connection.
pub struct ChatHarness {
    pub chat: ChatConnection,
    pub factory: Arc<MockTransportFactory>,
    pub processor: Arc<RecordingProcessor>,
    pub registration: Arc<TestRegistration>,
    pub outage: Arc<RecordingOutage>,
    pub background: Arc<CountingBackgroundHost>,
}

impl ChatHarness {
    /// Wait for the controller queue and its helper tasks to quiesce.
    pub async fn settle(&self) {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    /// The transport most recently built by the factory.
    pub fn transport(&self) -> Arc<MockTransport> {
        self.factory.latest().expect("no transport built")
    }
}

/// Builder wiring a [`ChatConnection`] to mocks with sensible defaults:
/// registered, app ready and active, auto-connecting transports.
pub struct ChatHarnessBuilder {
    kind: ConnectionKind,
    config: ChatConfig,
    registered: bool,
    app_ready: bool,
    app_active: bool,
    auto_connect: bool,
    ack: AckPolicy,
}

impl ChatHarnessBuilder {
    pub fn new(kind: ConnectionKind) -> Self {
        Self {
            kind,
            config: ChatConfig {
                endpoint: "wss://chat.test.invalid".to_owned(),
                ..ChatConfig::default()
            },
            registered: true,
            app_ready: true,
            app_active: true,
            auto_connect: true,
            ack: AckPolicy::Ack,
        }
    }

    pub fn config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registered(mut self, registered: bool) -> Self {
        self.registered = registered;
        self
    }

    pub fn app_ready(mut self, ready: bool) -> Self {
        self.app_ready = ready;
        self
    }

    pub fn app_active(mut self, active: bool) -> Self {
        self.app_active = active;
        self
    }

    pub fn auto_connect(mut self, auto: bool) -> Self {
        self.auto_connect = auto;
        self
    }

    pub fn ack(mut self, ack: AckPolicy) -> Self {
        self.ack = ack;
        self
    }

    pub fn build(self) -> ChatHarness {
        let factory = MockTransportFactory::new();
        factory.set_auto_connect(self.auto_connect);

        let processor = Arc::new(RecordingProcessor::new(self.ack));
        let registration = Arc::new(TestRegistration::new(self.registered));
        let outage = Arc::new(RecordingOutage::default());
        let background = Arc::new(CountingBackgroundHost::default());

        let services = ChatServices {
            processor: Arc::clone(&processor) as Arc<dyn MessageProcessor>,
            registration: Arc::clone(&registration) as Arc<dyn RegistrationHooks>,
            outage: Arc::clone(&outage) as Arc<dyn OutageSink>,
            background: Arc::clone(&background) as Arc<dyn BackgroundHost>,
        };

        let shutdown = CancellationToken::new();
        let queue = ProcessorQueue::spawn(Arc::clone(&services.processor), shutdown.child_token());
        let chat = ChatConnection::spawn_with_queue(
            self.kind,
            Arc::new(self.config),
            Arc::clone(&factory) as Arc<dyn TransportFactory>,
            services,
            queue,
            shutdown,
        );

        if self.app_ready {
            chat.app_became_ready();
        }
        if self.app_active {
            chat.app_became_active();
        } else {
            chat.app_will_resign_active();
        }

        ChatHarness { chat, factory, processor, registration, outage, background }
    }
}
