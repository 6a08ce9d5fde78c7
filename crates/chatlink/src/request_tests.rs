// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use bytes::Bytes;
use serde_json::json;

use super::{build_request_frame, find_header, parse_wire_headers, OutboundRequest, RequestBody};
use crate::config::ChatConfig;

fn config() -> ChatConfig {
    ChatConfig {
        user_agent: "TestAgent/1.0".to_owned(),
        accept_language: "en-GB".to_owned(),
        ..ChatConfig::default()
    }
}

#[test]
fn validate_rejects_bad_shapes() {
    assert!(OutboundRequest::new("GET", "v1/profile", true).validate());
    assert!(!OutboundRequest::new("", "v1/profile", true).validate());
    assert!(!OutboundRequest::new("GET", "", true).validate());
    assert!(!OutboundRequest::new("GET", "/v1/profile", true).validate());
    assert!(!OutboundRequest::new("GET", "https://host/v1/profile", true).validate());
}

#[test]
fn frame_gets_leading_slash_and_default_headers() {
    let request = OutboundRequest::new("GET", "v1/profile?p=1", true);
    let frame = build_request_frame(&request, &config(), 9).unwrap();

    assert_eq!(frame.verb, "GET");
    assert_eq!(frame.path, "/v1/profile?p=1");
    assert_eq!(frame.request_id, 9);
    assert!(frame.body.is_none());

    let headers = parse_wire_headers(&frame.headers);
    assert_eq!(find_header(&headers, "user-agent"), Some("TestAgent/1.0"));
    assert_eq!(find_header(&headers, "accept-language"), Some("en-GB"));
    assert_eq!(find_header(&headers, "content-type"), None);
}

#[test]
fn caller_headers_take_precedence_over_defaults() {
    let mut request = OutboundRequest::new("GET", "v1/profile", true);
    request.headers.push(("User-Agent".to_owned(), "Custom/2.0".to_owned()));
    let frame = build_request_frame(&request, &config(), 1).unwrap();

    let headers = parse_wire_headers(&frame.headers);
    assert_eq!(find_header(&headers, "user-agent"), Some("Custom/2.0"));
}

#[test]
fn json_body_forces_content_type_only_when_absent() {
    let mut request = OutboundRequest::new("PUT", "v1/thing", true);
    request.body = RequestBody::Json(json!({"a": 1}));
    let frame = build_request_frame(&request, &config(), 1).unwrap();
    let headers = parse_wire_headers(&frame.headers);
    assert_eq!(find_header(&headers, "content-type"), Some("application/json"));
    assert_eq!(frame.body.as_deref(), Some(br#"{"a":1}"#.as_slice()));

    // A caller-supplied Content-Type wins, even a conflicting one.
    let mut request = OutboundRequest::new("PUT", "v1/thing", true);
    request.headers.push(("content-type".to_owned(), "text/plain".to_owned()));
    request.body = RequestBody::Json(json!({"a": 1}));
    let frame = build_request_frame(&request, &config(), 1).unwrap();
    let headers = parse_wire_headers(&frame.headers);
    assert_eq!(find_header(&headers, "content-type"), Some("text/plain"));
}

#[test]
fn raw_body_gets_no_content_type() {
    let mut request = OutboundRequest::new("PUT", "v1/thing", false);
    request.body = RequestBody::Raw(Bytes::from_static(b"blob"));
    let frame = build_request_frame(&request, &config(), 1).unwrap();
    let headers = parse_wire_headers(&frame.headers);
    assert_eq!(find_header(&headers, "content-type"), None);
    assert_eq!(frame.body.as_deref(), Some(b"blob".as_slice()));
}

#[test]
fn wire_headers_parse_and_lookup() {
    let wire = vec![
        "X-Signal-Timestamp: 1700000000000".to_owned(),
        "plain:value".to_owned(),
        "malformed".to_owned(),
    ];
    let headers = parse_wire_headers(&wire);
    assert_eq!(headers.len(), 2);
    assert_eq!(find_header(&headers, "x-signal-timestamp"), Some("1700000000000"));
    assert_eq!(find_header(&headers, "PLAIN"), Some("value"));
    assert_eq!(find_header(&headers, "missing"), None);
}
