// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context handed to a plugin at initialize.

use std::path::Path;
use std::sync::Arc;

use ddk_core::PluginEvent;
use thiserror::Error;

use crate::factory::ClientFactory;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
}

/// Scoped services the worker provides to its plugin.
///
/// Lives from `Initialize` to `Dispose`. Logging goes through the ambient
/// `tracing` subscriber; [`PluginContext::span`] yields a span carrying the
/// plugin/instance fields so plugin output is attributable.
pub trait PluginContext: Send + Sync {
    /// Per-instance storage directory. Exists by the time the plugin sees it.
    fn storage_path(&self) -> &Path;

    /// Base url of the initially bound remote environment. Empty when the
    /// worker was started without one.
    fn connection_url(&self) -> &str;

    /// Span scoped to this plugin instance, for logging attribution.
    fn span(&self) -> tracing::Span;

    /// Append an event for delivery to event-stream subscribers.
    /// Non-blocking; the buffer is bounded and drops oldest under pressure.
    fn emit_event(&self, event: PluginEvent);

    /// Read one config value from the persisted key/value store.
    fn get_config(&self, key: &str) -> Option<String>;

    /// Write one config value. Read-then-write, last writer wins.
    fn set_config(&self, key: &str, value: &str) -> Result<(), ContextError>;

    /// Factory for remote-service clients bound to this worker's connection.
    fn client_factory(&self) -> Arc<ClientFactory>;
}
