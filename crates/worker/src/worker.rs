// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Worker object: one plugin instance plus its runtime services.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ddk_core::{CommandDescriptor, ConnectionId, PluginId};
use ddk_sdk::{ClientFactory, ClientMultiplexer, PluginContext, PluginError, DEFAULT_MAX_CONCURRENCY};
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::WorkerContext;
use crate::events::EventBuffer;
use crate::loader::LoadedPlugin;
use crate::token_client::ReverseTokenClient;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker is already initialized")]
    AlreadyInitialized,

    #[error("worker is not initialized")]
    NotInitialized,

    #[error("plugin initialization failed: {0}")]
    Initialization(String),

    #[error("context setup failed: {0}")]
    Context(String),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Fields of the forward `Initialize` request.
#[derive(Debug, Clone)]
pub struct InitializeParams {
    pub plugin_id: PluginId,
    pub storage_path: PathBuf,
    pub config: HashMap<String, String>,
    pub token_socket: PathBuf,
    pub connection_id: ConnectionId,
    pub connection_url: String,
}

/// One worker process: the loaded plugin and its runtime services.
///
/// Initialization order is fixed: reverse token client, then context, then
/// the plugin's own initialize. [`Worker::teardown`] runs the reverse.
pub struct Worker {
    plugin_id: PluginId,
    loaded: LoadedPlugin,
    /// Set exactly once by the first `Initialize`, even a failed one.
    init_claimed: AtomicBool,
    context: Mutex<Option<Arc<WorkerContext>>>,
    /// Serializes Execute per instance; GetCommands and event streaming
    /// run concurrently.
    execute_gate: tokio::sync::Mutex<()>,
    events: Arc<EventBuffer>,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(plugin_id: PluginId, loaded: LoadedPlugin) -> Self {
        Self {
            plugin_id,
            loaded,
            init_claimed: AtomicBool::new(false),
            context: Mutex::new(None),
            execute_gate: tokio::sync::Mutex::new(()),
            events: Arc::new(EventBuffer::default()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn plugin_id(&self) -> &PluginId {
        &self.plugin_id
    }

    pub fn events(&self) -> &Arc<EventBuffer> {
        &self.events
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request a graceful exit; the serve loop watches this token.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// One-time setup. Returns the plugin's (name, version).
    pub async fn initialize(&self, params: InitializeParams) -> Result<(String, String), WorkerError> {
        if self.init_claimed.swap(true, Ordering::AcqRel) {
            return Err(WorkerError::AlreadyInitialized);
        }

        let tokens = Arc::new(ReverseTokenClient::new(
            params.token_socket.clone(),
            params.connection_id.clone(),
        ));
        let mux = Arc::new(ClientMultiplexer::new(DEFAULT_MAX_CONCURRENCY));
        let factory = Arc::new(ClientFactory::new(params.connection_id.clone(), tokens, mux));
        if !params.connection_url.is_empty() {
            factory
                .register_environment(&params.connection_url)
                .map_err(|e| WorkerError::Context(e.to_string()))?;
        }

        let ctx = Arc::new(
            WorkerContext::new(
                params.plugin_id.clone(),
                params.storage_path.clone(),
                params.connection_url.clone(),
                Arc::clone(&self.events),
                factory,
            )
            .map_err(|e| WorkerError::Context(e.to_string()))?,
        );
        ctx.seed_config(&params.config).map_err(|e| WorkerError::Context(e.to_string()))?;

        self.loaded
            .plugin()
            .initialize(Arc::clone(&ctx) as Arc<dyn PluginContext>)
            .await
            .map_err(|e| WorkerError::Initialization(e.to_string()))?;

        *self.context.lock() = Some(ctx);
        info!(plugin_id = %self.plugin_id, "worker initialized");
        Ok((
            self.loaded.plugin().name().to_string(),
            self.loaded.plugin().version().to_string(),
        ))
    }

    pub fn is_initialized(&self) -> bool {
        self.context.lock().is_some()
    }

    /// List the plugin's commands. Valid before Initialize; used as the
    /// supervisor's health ping.
    pub fn commands(&self) -> Vec<CommandDescriptor> {
        self.loaded.plugin().commands()
    }

    /// Run one command, serialized per instance.
    pub async fn execute(&self, command: &str, payload: &[u8]) -> Result<Vec<u8>, WorkerError> {
        if !self.is_initialized() {
            return Err(WorkerError::NotInitialized);
        }
        let _gate = self.execute_gate.lock().await;
        Ok(self.loaded.plugin().execute(command, payload).await?)
    }

    /// Dispose the plugin and release runtime services, in reverse
    /// initialization order.
    pub async fn teardown(mut self) {
        self.loaded.dispose().await;
        if let Some(ctx) = self.context.lock().take() {
            // Dropping the context releases the factory and multiplexer;
            // the reverse token client goes with them.
            drop(ctx);
        }
        info!(plugin_id = %self.plugin_id, "worker torn down");
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("plugin_id", &self.plugin_id)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Recover sole ownership for teardown. Teardown with connections still
/// open would drop services under the plugin; warn instead.
pub fn teardown_or_warn(worker: Arc<Worker>) -> Option<Worker> {
    match Arc::try_unwrap(worker) {
        Ok(worker) => Some(worker),
        Err(_) => {
            warn!("worker still referenced at shutdown; skipping plugin dispose");
            None
        }
    }
}
