// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::{ConnectionInstance, InstanceState};
use crate::config::ConnectionKind;
use crate::observer::VisibleState;
use crate::proto::MessageKind;
use crate::registry::Completion;
use crate::test_support::MockTransportFactory;
use crate::transport::TransportFactory;

fn instance() -> (ConnectionInstance, Arc<crate::test_support::MockTransport>) {
    let factory = MockTransportFactory::new();
    factory.set_auto_connect(false);
    let handle = factory.build(ConnectionKind::Identified).unwrap();
    let transport = factory.latest().unwrap();
    let instance = ConnectionInstance::new(
        7,
        ConnectionKind::Identified,
        handle.transport,
        CancellationToken::new(),
    );
    (instance, transport)
}

#[tokio::test]
async fn visible_state_tracks_instance_state() {
    let (mut instance, _) = instance();
    assert_eq!(instance.visible_state(), VisibleState::Connecting);
    instance.state = InstanceState::Open;
    assert_eq!(instance.visible_state(), VisibleState::Open);
    instance.state = InstanceState::Disconnected;
    assert_eq!(instance.visible_state(), VisibleState::Closed);
}

#[tokio::test]
async fn ack_response_is_well_formed() {
    let (instance, transport) = instance();
    instance.send_response(99, 200, "OK");

    let sent = transport.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].message_kind(), MessageKind::Response);
    let response = sent[0].response.as_ref().unwrap();
    assert_eq!(response.request_id, 99);
    assert_eq!(response.status, 200);
    assert_eq!(response.message.as_deref(), Some("OK"));
}

#[tokio::test]
async fn drop_closes_transport_and_drains_registry() {
    let (instance, transport) = instance();

    let (tx, rx) = oneshot::channel();
    let completion = Completion::new("v1/pending".to_owned(), tx);
    instance.registry.insert(1, completion, Duration::from_secs(10), || {});

    let task_token = instance.task_token();
    drop(instance);

    assert!(transport.is_closed());
    assert!(task_token.is_cancelled());
    assert!(rx.await.unwrap().unwrap_err().is_network_failure());
}
