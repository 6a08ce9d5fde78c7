// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher-level contracts: token accounting and error pre-checks.

use crate::config::ConnectionKind;
use crate::observer::VisibleState;
use crate::request::OutboundRequest;
use crate::test_support::ChatHarnessBuilder;

#[tokio::test]
async fn token_is_consumed_by_successful_submission_path() {
    let harness = ChatHarnessBuilder::new(ConnectionKind::Identified).build();
    harness.settle().await;
    assert_eq!(harness.chat.state(), VisibleState::Open);

    let token = harness.chat.request_token();
    assert!(harness.chat.tokens.contains(token));

    // No response will come, but the submission itself must consume the
    // token; drop the future after the frame is on the wire.
    let chat = harness.chat.clone();
    let pending = tokio::spawn(async move {
        chat.make_request(OutboundRequest::new("GET", "v1/profile", true), token).await
    });
    let transport = harness.transport();
    for _ in 0..200 {
        if !transport.sent_messages().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    pending.abort();

    assert!(!harness.chat.tokens.contains(token));
}

#[tokio::test]
async fn token_is_removed_when_submission_fails() {
    let harness = ChatHarnessBuilder::new(ConnectionKind::Identified).registered(false).build();
    harness.settle().await;

    let token = harness.chat.request_token();
    let err = harness
        .chat
        .make_request(OutboundRequest::new("GET", "v1/profile", true), token)
        .await
        .unwrap_err();
    assert!(err.is_network_failure());
    assert!(!harness.chat.tokens.contains(token));
}

#[tokio::test]
async fn token_is_removed_on_expired_pre_check() {
    let harness = ChatHarnessBuilder::new(ConnectionKind::Identified).build();
    harness.chat.app_expiry_changed(true);
    harness.settle().await;

    let token = harness.chat.request_token();
    let err = harness
        .chat
        .make_request(OutboundRequest::new("GET", "v1/profile", true), token)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_APP_STATE");
    assert!(!harness.chat.tokens.contains(token));
}

#[tokio::test]
async fn abandoned_token_is_gone() {
    let harness = ChatHarnessBuilder::new(ConnectionKind::Identified).build();
    let token = harness.chat.request_token();
    harness.chat.abandon_request_token(token);
    assert!(!harness.chat.tokens.contains(token));
}
