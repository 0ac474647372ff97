// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed ids used across the runtime.

use serde::{Deserialize, Serialize};

crate::string_id! {
    /// Opaque id of a host-managed connection to a remote environment.
    ConnectionId
}

crate::string_id! {
    /// Stable id of a plugin, taken from its manifest.
    PluginId
}

crate::string_id! {
    /// Fresh opaque id minted per tab/instance of a plugin.
    InstanceId
}

crate::string_id! {
    /// Id of one indexing operation.
    OperationId
}

crate::string_id! {
    /// Caller-assigned id correlating a query request with its result event.
    QueryId
}

crate::string_id! {
    /// Caller-assigned id echoed through Execute responses.
    CorrelationId
}

/// Key identifying one worker process: `(pluginId, instanceId)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerKey {
    pub plugin: PluginId,
    pub instance: InstanceId,
}

impl WorkerKey {
    pub fn new(plugin: impl Into<PluginId>, instance: impl Into<InstanceId>) -> Self {
        Self { plugin: plugin.into(), instance: instance.into() }
    }
}

impl std::fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.plugin, self.instance)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
