// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The plugin capability set.

use std::sync::Arc;

use async_trait::async_trait;
use ddk_core::CommandDescriptor;
use thiserror::Error;

use crate::context::PluginContext;

/// Errors a plugin reports to the worker runtime.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin is not initialized")]
    NotInitialized,

    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// One loaded plugin instance. Instantiated once per worker.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn plugin_id(&self) -> &str;
    fn name(&self) -> &str;
    fn version(&self) -> &str;

    /// One-time setup with the worker-provided context.
    async fn initialize(&self, ctx: Arc<dyn PluginContext>) -> Result<(), PluginError>;

    /// Commands this plugin exposes. Side-effect free.
    fn commands(&self) -> Vec<CommandDescriptor>;

    /// Run one command. Payload and result encodings are the plugin's concern.
    async fn execute(&self, command: &str, payload: &[u8]) -> Result<Vec<u8>, PluginError>;

    /// Release plugin resources. Called before the loader drops the library.
    async fn dispose(&self);
}
