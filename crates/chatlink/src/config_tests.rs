// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::{ChatConfig, ConnectionKind};

#[test]
fn default_timer_periods() {
    let config = ChatConfig::default();
    assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
    assert_eq!(config.reconnect_interval(), Duration::from_secs(5));
    assert_eq!(config.connect_watchdog(), Duration::from_secs(30));
    assert_eq!(config.request_timeout(), Duration::from_secs(10));
    assert_eq!(config.background_tick_interval(), Duration::from_secs(1));
}

#[test]
fn kind_display() {
    assert_eq!(ConnectionKind::Identified.to_string(), "identified");
    assert_eq!(ConnectionKind::Unidentified.to_string(), "unidentified");
}
