// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forward channel: host → worker plugin control.

use std::collections::HashMap;
use std::path::PathBuf;

use ddk_core::{CommandDescriptor, ConnectionId, CorrelationId, PluginEvent, PluginId};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Request from host to worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ForwardRequest {
    /// One-time worker setup. A second Initialize fails `AlreadyInitialized`.
    Initialize {
        plugin_id: PluginId,
        /// Per-instance storage directory for the plugin.
        storage_path: PathBuf,
        /// Initial key/value configuration.
        #[serde(default)]
        config: HashMap<String, String>,
        /// Path of the host's reverse (token callback) endpoint.
        token_socket: PathBuf,
        /// Connection this worker is initially bound to.
        connection_id: ConnectionId,
        connection_url: String,
    },

    /// List the plugin's commands. Side-effect free; doubles as the health ping.
    GetCommands,

    /// Run one plugin command. Payload and result are opaque byte strings.
    Execute {
        command: String,
        payload: Vec<u8>,
        correlation_id: CorrelationId,
    },

    /// Open the event stream. The response is `Subscribed`, then `Event`
    /// frames are pushed until the client closes the connection.
    SubscribeEvents {
        /// Event types to deliver; empty means all.
        #[serde(default)]
        event_types: Vec<String>,
    },

    /// Request a graceful worker exit.
    Shutdown,
}

/// Response from worker to host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ForwardResponse {
    /// Initialize succeeded.
    Initialized { plugin_name: String, plugin_version: String },

    /// Command listing.
    Commands { commands: Vec<CommandDescriptor> },

    /// Execute result.
    Executed { result: Vec<u8>, correlation_id: CorrelationId },

    /// Event stream opened; `Event` frames follow.
    Subscribed,

    /// One pushed event on a subscribed connection.
    Event { event: PluginEvent },

    /// Shutdown acknowledged; the worker exits shortly after flushing this.
    ShuttingDown,

    /// Any failure.
    Error {
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<CorrelationId>,
    },
}

impl ForwardResponse {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error { code, message: message.into(), correlation_id: None }
    }

    pub fn command_error(
        code: ErrorCode,
        message: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self::Error { code, message: message.into(), correlation_id: Some(correlation_id) }
    }
}

#[cfg(test)]
#[path = "forward_tests.rs"]
mod tests;
