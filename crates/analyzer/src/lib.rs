// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ddk-analyzer: the solution-layer analyzer plugin.
//!
//! Indexes a layered component model from the bound remote environment
//! into a per-connection SQLite store and answers filter queries and layer
//! diffs over it. Loaded by `ddk-worker` as a cdylib; command payloads and
//! results are JSON.

pub mod indexer;
pub mod query;
pub mod remote;
pub mod store;

use std::sync::Arc;

use async_trait::async_trait;
use ddk_core::{event_type, Clock, CommandDescriptor, PluginEvent, SystemClock};
use ddk_sdk::{Plugin, PluginContext, PluginError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use indexer::{IndexError, IndexParams, Indexer};
use query::{DiffEngine, DiffRequest, QueryEngine, QueryRequest};
use remote::{DataService, HttpDataService, RemoteError};
use store::Store;

const PLUGIN_ID: &str = "sla";
const PLUGIN_NAME: &str = "Solution Layer Analyzer";

ddk_sdk::declare_plugin!(LayerAnalyzerPlugin::new);

struct AnalyzerState {
    ctx: Arc<dyn PluginContext>,
    store: Arc<Store>,
    indexer: Arc<Indexer>,
    engine: QueryEngine,
    diff: DiffEngine,
}

/// The plugin instance. Everything interesting lives in [`AnalyzerState`],
/// created at initialize and dropped at dispose.
#[derive(Default)]
pub struct LayerAnalyzerPlugin {
    state: Mutex<Option<Arc<AnalyzerState>>>,
}

impl LayerAnalyzerPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<Arc<AnalyzerState>, PluginError> {
        self.state.lock().clone().ok_or(PluginError::NotInitialized)
    }
}

#[async_trait]
impl Plugin for LayerAnalyzerPlugin {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn initialize(&self, ctx: Arc<dyn PluginContext>) -> Result<(), PluginError> {
        let factory = ctx.client_factory();
        let connection_id = factory.bound_connection().clone();

        let remote: Arc<dyn DataService> = if ctx.connection_url().is_empty() {
            Arc::new(UnboundRemote)
        } else {
            let client = factory
                .service_client(ctx.connection_url())
                .map_err(|e| PluginError::Initialization(e.to_string()))?;
            Arc::new(HttpDataService::new(client))
        };

        let store = Arc::new(
            Store::open(ctx.storage_path(), connection_id.as_str())
                .map_err(|e| PluginError::Initialization(e.to_string()))?,
        );

        let emitter = {
            let ctx = Arc::clone(&ctx);
            Arc::new(move |event: PluginEvent| ctx.emit_event(event))
        };
        let indexer = Arc::new(Indexer::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            PLUGIN_ID.into(),
            emitter,
        ));
        let engine = QueryEngine::new(Arc::clone(&store));
        let diff = DiffEngine::new(Arc::clone(&store), remote);

        *self.state.lock() =
            Some(Arc::new(AnalyzerState { ctx, store, indexer, engine, diff }));
        Ok(())
    }

    fn commands(&self) -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::new("ping", "Ping").with_description("Liveness check"),
            CommandDescriptor::new("start-index", "Start index")
                .with_description("Index the layer stacks of the given source and target solutions"),
            CommandDescriptor::new("cancel-index", "Cancel index")
                .with_description("Cancel the running index operation"),
            CommandDescriptor::new("index-metadata", "Index metadata")
                .with_description("What is indexed, and for which solutions"),
            CommandDescriptor::new("query", "Query components")
                .with_description("Evaluate a filter over the indexed components"),
            CommandDescriptor::new("diff", "Diff layers")
                .with_description("Compare one component's layers across two solutions"),
            CommandDescriptor::new("clear-index", "Clear index")
                .with_description("Drop everything indexed for this connection"),
        ]
    }

    async fn execute(&self, command: &str, payload: &[u8]) -> Result<Vec<u8>, PluginError> {
        let state = self.state()?;
        match command {
            "ping" => to_bytes(&serde_json::json!("pong")),

            "start-index" => {
                let params: IndexParams = parse(payload)?;
                match state.indexer.start(params) {
                    Ok(operation_id) => to_bytes(&serde_json::json!({
                        "operationId": operation_id.as_str(),
                        "started": true,
                    })),
                    Err(e @ IndexError::InProgress) => {
                        Err(PluginError::CommandFailed(e.to_string()))
                    }
                    Err(IndexError::StartFailed(message)) => {
                        Err(PluginError::CommandFailed(message))
                    }
                }
            }

            "cancel-index" => {
                let cancelled = state.indexer.cancel();
                to_bytes(&serde_json::json!({ "cancelled": cancelled }))
            }

            "index-metadata" => {
                let metadata = state
                    .indexer
                    .metadata()
                    .map_err(|e| PluginError::CommandFailed(e.to_string()))?;
                to_bytes(&metadata)
            }

            "query" => {
                let request: QueryRequest = parse(payload)?;
                if request.use_event_response {
                    let ack = serde_json::json!({
                        "queryId": request.query_id.as_str(),
                        "started": true,
                    });
                    spawn_event_query(state, request);
                    to_bytes(&ack)
                } else {
                    let response = state
                        .engine
                        .run(&request)
                        .map_err(|e| PluginError::CommandFailed(e.to_string()))?;
                    to_bytes(&response)
                }
            }

            "diff" => {
                let request: DiffRequest = parse(payload)?;
                let response = state
                    .diff
                    .diff(&request)
                    .await
                    .map_err(|e| PluginError::CommandFailed(e.to_string()))?;
                to_bytes(&response)
            }

            "clear-index" => {
                state.store.clear().map_err(|e| PluginError::CommandFailed(e.to_string()))?;
                to_bytes(&serde_json::json!({ "cleared": true }))
            }

            other => Err(PluginError::UnknownCommand(other.to_string())),
        }
    }

    async fn dispose(&self) {
        if let Some(state) = self.state.lock().take() {
            state.indexer.cancel();
        }
    }
}

/// Run an event-correlated query in the background. Every started query
/// completes with a `plugin:sla:query-result` event, success or not; the
/// UI matches on `queryId` and ignores stale results.
fn spawn_event_query(state: Arc<AnalyzerState>, request: QueryRequest) {
    tokio::spawn(async move {
        let payload = match state.engine.run(&request) {
            Ok(response) => serde_json::json!({
                "queryId": response.query_id.as_str(),
                "success": true,
                "rows": response.rows,
                "total": response.total,
                "stats": response.stats,
            }),
            Err(e) => serde_json::json!({
                "queryId": request.query_id.as_str(),
                "success": false,
                "errorMessage": e.to_string(),
            }),
        };
        state.ctx.emit_event(PluginEvent::new(
            PLUGIN_ID,
            event_type::QUERY_RESULT,
            payload,
            SystemClock.now_ms(),
        ));
    });
}

fn parse<T: DeserializeOwned>(payload: &[u8]) -> Result<T, PluginError> {
    serde_json::from_slice(payload)
        .map_err(|e| PluginError::CommandFailed(format!("invalid payload: {e}")))
}

fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, PluginError> {
    serde_json::to_vec(value).map_err(|e| PluginError::CommandFailed(e.to_string()))
}

/// Stands in when the worker was initialized without a bound environment.
struct UnboundRemote;

#[async_trait]
impl DataService for UnboundRemote {
    async fn solutions_by_name(
        &self,
        _names: &[String],
    ) -> Result<Vec<remote::RemoteSolution>, RemoteError> {
        Err(unbound())
    }

    async fn components_of_solution(
        &self,
        _solution_id: &str,
    ) -> Result<Vec<remote::RemoteComponent>, RemoteError> {
        Err(unbound())
    }

    async fn layers_of_component(
        &self,
        _component: &remote::RemoteComponent,
    ) -> Result<Vec<remote::RemoteLayer>, RemoteError> {
        Err(unbound())
    }

    async fn component_payload(
        &self,
        _component: &remote::RemoteComponent,
        _solution_name: &str,
    ) -> Result<Option<String>, RemoteError> {
        Err(unbound())
    }

    async fn table_logical_name(
        &self,
        _component: &remote::RemoteComponent,
    ) -> Result<Option<String>, RemoteError> {
        Err(unbound())
    }
}

fn unbound() -> RemoteError {
    warn!("remote access attempted without a bound environment");
    RemoteError::Decode("no remote environment bound to this worker".to_string())
}

#[cfg(test)]
#[path = "plugin_tests.rs"]
mod tests;
