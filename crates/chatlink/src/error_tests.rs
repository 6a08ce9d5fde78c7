// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use bytes::Bytes;

use super::RequestError;

fn http_error(status: u16, headers: Vec<(String, String)>) -> RequestError {
    RequestError::Http { status, headers, body: Bytes::new(), url: "v1/test".to_owned() }
}

#[test]
fn retry_after_parsed_from_seconds_header() {
    let err = http_error(429, vec![("Retry-After".to_owned(), "120".to_owned())]);
    assert_eq!(err.retry_after(), Some(Duration::from_secs(120)));
}

#[test]
fn retry_after_absent_or_malformed() {
    assert_eq!(http_error(429, Vec::new()).retry_after(), None);
    let err = http_error(429, vec![("Retry-After".to_owned(), "soon".to_owned())]);
    assert_eq!(err.retry_after(), None);
    assert_eq!(RequestError::Cancelled.retry_after(), None);
}

#[test]
fn display_includes_url_and_status() {
    let err = http_error(503, Vec::new());
    assert_eq!(err.to_string(), "http 503 (v1/test)");
    assert_eq!(err.code(), "HTTP_ERROR");
    assert_eq!(err.http_status(), Some(503));

    let err = RequestError::NetworkFailure { url: "v1/x".to_owned() };
    assert!(err.is_network_failure());
    assert_eq!(err.url(), Some("v1/x"));
}
