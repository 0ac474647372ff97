// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin events pushed from workers to the host and on to the UI bridge.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::PluginId;

/// Well-known event type strings surfaced by the core plugin subsystem.
pub mod event_type {
    pub const INDEX_PROGRESS: &str = "plugin:sla:index-progress";
    pub const INDEX_COMPLETE: &str = "plugin:sla:index-complete";
    pub const QUERY_RESULT: &str = "plugin:sla:query-result";
    pub const SESSION_EXPIRED: &str = "session:expired";
}

/// One event emitted by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEvent {
    pub plugin_id: PluginId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl PluginEvent {
    pub fn new(
        plugin_id: impl Into<PluginId>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            event_type: event_type.into(),
            payload,
            timestamp_ms,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
