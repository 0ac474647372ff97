// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Indexer pipeline: solutions → components → layers → attributes.
//!
//! One background operation at a time per store. Phases run with a bounded
//! worker pool (`max_parallel`, default 8); writes back-pressure on the
//! store's per-connection lock. Progress events are coalesced to at most
//! one per 100 ms and their percent never decreases.

mod normalize;
mod progress;

pub use normalize::{extract_attributes, normalize};
pub use progress::ProgressReporter;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ddk_core::{event_type, Clock, OperationId, PluginEvent, PluginId, SystemClock};
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::remote::{DataService, RemoteComponent, RemoteError, RemoteLayer};
use crate::store::{
    ComponentRow, IndexStats, LayerAttributeRow, LayerRow, SolutionRow, Store, StoreError,
};

pub const DEFAULT_MAX_PARALLEL: usize = 8;

pub const META_SOURCE_SOLUTIONS: &str = "sourceSolutions";
pub const META_TARGET_SOLUTIONS: &str = "targetSolutions";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("an index operation is already in progress")]
    InProgress,

    #[error("index start failed: {0}")]
    StartFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadMode {
    #[default]
    Lazy,
    Eager,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexParams {
    #[serde(default)]
    pub source_solutions: Vec<String>,
    #[serde(default)]
    pub target_solutions: Vec<String>,
    /// Empty means every component type.
    #[serde(default)]
    pub include_component_types: Vec<String>,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default)]
    pub payload_mode: PayloadMode,
}

fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMetadata {
    pub has_index: bool,
    pub source_solutions: Vec<String>,
    pub target_solutions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<IndexStats>,
}

enum PipelineError {
    Cancelled,
    Remote(RemoteError),
    Store(StoreError),
}

impl From<RemoteError> for PipelineError {
    fn from(e: RemoteError) -> Self {
        Self::Remote(e)
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

struct RunningOperation {
    operation_id: OperationId,
    cancel: CancellationToken,
}

/// Background indexer bound to one store and one remote environment.
pub struct Indexer {
    store: Arc<Store>,
    remote: Arc<dyn DataService>,
    plugin_id: PluginId,
    emit: Arc<dyn Fn(PluginEvent) + Send + Sync>,
    current: Mutex<Option<RunningOperation>>,
}

impl Indexer {
    pub fn new(
        store: Arc<Store>,
        remote: Arc<dyn DataService>,
        plugin_id: PluginId,
        emit: Arc<dyn Fn(PluginEvent) + Send + Sync>,
    ) -> Self {
        Self { store, remote, plugin_id, emit, current: Mutex::new(None) }
    }

    /// Start a background index operation.
    ///
    /// Failures *inside* the operation are reported via the completion
    /// event; only start-time problems surface here.
    pub fn start(self: &Arc<Self>, params: IndexParams) -> Result<OperationId, IndexError> {
        let mut current = self.current.lock();
        if current.is_some() {
            return Err(IndexError::InProgress);
        }

        let operation_id = OperationId::fresh();
        let started_at = chrono::Utc::now().to_rfc3339();
        self.store
            .create_operation(operation_id.as_str(), &started_at)
            .map_err(|e| IndexError::StartFailed(e.to_string()))?;
        self.persist_meta(&params).map_err(|e| IndexError::StartFailed(e.to_string()))?;

        let cancel = CancellationToken::new();
        *current = Some(RunningOperation { operation_id: operation_id.clone(), cancel: cancel.clone() });
        drop(current);

        let indexer = Arc::clone(self);
        let op = operation_id.clone();
        tokio::spawn(async move {
            indexer.run(params, op, cancel).await;
        });
        Ok(operation_id)
    }

    /// Cancel the running operation, if any. The operation transitions to
    /// `Failed("cancelled")` and still emits its completion event.
    pub fn cancel(&self) -> bool {
        match self.current.lock().as_ref() {
            Some(op) => {
                op.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.lock().is_some()
    }

    pub fn metadata(&self) -> Result<IndexMetadata, StoreError> {
        let source_solutions = self.meta_list(META_SOURCE_SOLUTIONS)?;
        let target_solutions = self.meta_list(META_TARGET_SOLUTIONS)?;
        let stats = self.store.stats()?;
        let has_index = stats.components > 0;
        Ok(IndexMetadata {
            has_index,
            source_solutions,
            target_solutions,
            stats: has_index.then_some(stats),
        })
    }

    fn meta_list(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .store
            .get_meta(key)?
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default())
    }

    fn persist_meta(&self, params: &IndexParams) -> Result<(), StoreError> {
        let source = serde_json::to_string(&params.source_solutions)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let target = serde_json::to_string(&params.target_solutions)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.store.set_meta(META_SOURCE_SOLUTIONS, &source)?;
        self.store.set_meta(META_TARGET_SOLUTIONS, &target)
    }

    async fn run(&self, params: IndexParams, operation_id: OperationId, cancel: CancellationToken) {
        let reporter = ProgressReporter::new(
            self.plugin_id.clone(),
            operation_id.clone(),
            Arc::clone(&self.emit),
        );
        let result = self.pipeline(&params, &reporter, &cancel).await;
        let completed_at = chrono::Utc::now().to_rfc3339();

        let payload = match result {
            Ok((stats, warnings)) => {
                if let Err(e) =
                    self.store.complete_operation(operation_id.as_str(), &completed_at, &stats, &warnings)
                {
                    warn!(error = %e, "failed to record completed operation");
                }
                info!(operation = %operation_id, ?stats, "index completed");
                serde_json::json!({
                    "operationId": operation_id.as_str(),
                    "success": true,
                    "stats": stats,
                    "warnings": warnings,
                })
            }
            Err(e) => {
                let message = match e {
                    PipelineError::Cancelled => "cancelled".to_string(),
                    PipelineError::Remote(e) => e.to_string(),
                    PipelineError::Store(e) => e.to_string(),
                };
                if let Err(e) =
                    self.store.fail_operation(operation_id.as_str(), &completed_at, &message)
                {
                    warn!(error = %e, "failed to record failed operation");
                }
                warn!(operation = %operation_id, error = %message, "index failed");
                serde_json::json!({
                    "operationId": operation_id.as_str(),
                    "success": false,
                    "errorMessage": message,
                })
            }
        };

        (self.emit)(PluginEvent::new(
            self.plugin_id.clone(),
            event_type::INDEX_COMPLETE,
            payload,
            SystemClock.now_ms(),
        ));
        *self.current.lock() = None;
    }

    async fn pipeline(
        &self,
        params: &IndexParams,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<(IndexStats, Vec<String>), PipelineError> {
        let max_parallel = params.max_parallel.clamp(1, 64);
        let mut warnings = Vec::new();
        let mut stats = IndexStats::default();

        // Phase 1: solutions
        let requested: Vec<String> = dedup_preserving(
            params.source_solutions.iter().chain(params.target_solutions.iter()).cloned(),
        );
        let found = self.remote.solutions_by_name(&requested).await?;
        let total = requested.len() as u64;
        for (done, solution) in found.iter().enumerate() {
            check(cancel)?;
            self.store.upsert_solution(&SolutionRow {
                solution_id: solution.solution_id.clone(),
                unique_name: solution.unique_name.clone(),
                friendly_name: solution.friendly_name.clone(),
                publisher: solution.publisher.clone(),
                is_managed: solution.is_managed,
                version: solution.version.clone(),
                is_source: params.source_solutions.contains(&solution.unique_name),
                is_target: params.target_solutions.contains(&solution.unique_name),
            })?;
            stats.solutions += 1;
            reporter.report("solutions", done as u64 + 1, total);
        }
        for name in &requested {
            if !found.iter().any(|s| &s.unique_name == name) {
                warnings.push(format!("solution not found: {name}"));
            }
        }

        // Phase 2: components, fetched per solution in parallel
        let solution_ids: Vec<String> = found.iter().map(|solution| solution.solution_id.clone()).collect();
        let memberships: Vec<Result<Vec<RemoteComponent>, RemoteError>> =
            stream::iter(solution_ids.into_iter().map(|solution_id| {
                let remote = Arc::clone(&self.remote);
                async move { remote.components_of_solution(&solution_id).await }
            }))
            .buffer_unordered(max_parallel)
            .collect()
            .await;

        let mut components: Vec<RemoteComponent> = Vec::new();
        let mut seen_objects: HashSet<String> = HashSet::new();
        for membership in memberships {
            for component in membership? {
                if !params.include_component_types.is_empty()
                    && !params.include_component_types.contains(&component.component_type)
                {
                    continue;
                }
                if seen_objects.insert(component.object_id.clone()) {
                    components.push(component);
                }
            }
        }

        // Per-run metadata cache for entity-scoped table resolution
        let table_cache: Mutex<HashMap<String, Option<String>>> = Mutex::new(HashMap::new());
        let total = components.len() as u64;
        for (done, component) in components.iter().enumerate() {
            check(cancel)?;
            let table_logical_name = if component.entity_scoped {
                self.resolve_table(component, &table_cache).await?
            } else {
                None
            };
            self.store.upsert_component(&ComponentRow {
                component_id: component.component_id.clone(),
                component_type: component.component_type.clone(),
                type_code: component.type_code,
                object_id: component.object_id.clone(),
                logical_name: component.logical_name.clone(),
                display_name: component.display_name.clone(),
                table_logical_name: table_logical_name.unwrap_or_default(),
            })?;
            stats.components += 1;
            reporter.report("components", done as u64 + 1, total);
        }

        // Phase 3: layers, fetched per component in parallel
        let eager = params.payload_mode == PayloadMode::Eager;
        let fetched: Vec<Result<(RemoteComponent, Vec<RemoteLayer>), PipelineError>> =
            stream::iter(components.iter().cloned().map(|component| {
                let remote = Arc::clone(&self.remote);
                let cancel = cancel.clone();
                async move {
                    check(&cancel)?;
                    let layers = remote.layers_of_component(&component).await?;
                    Ok((component, layers))
                }
            }))
            .buffer_unordered(max_parallel)
            .collect()
            .await;

        let mut stacks: Vec<(Vec<LayerRow>, Vec<HashSet<String>>)> = Vec::new();
        let total = fetched.len() as u64;
        for (done, item) in fetched.into_iter().enumerate() {
            check(cancel)?;
            let (component, layers) = item?;
            let mut rows = Vec::with_capacity(layers.len());
            let mut changes = Vec::with_capacity(layers.len());
            for (ordinal, layer) in layers.into_iter().enumerate() {
                let component_json = match (&layer.component_json, eager) {
                    (Some(json), _) => Some(json.clone()),
                    (None, true) => {
                        self.remote.component_payload(&component, &layer.solution_name).await?
                    }
                    (None, false) => None,
                };
                rows.push(LayerRow {
                    layer_id: format!("{}:{}", component.component_id, ordinal),
                    component_id: component.component_id.clone(),
                    ordinal: ordinal as i64,
                    solution_id: layer.solution_id.clone(),
                    solution_name: layer.solution_name.clone(),
                    publisher: layer.publisher.clone(),
                    is_managed: layer.is_managed,
                    version: layer.version.clone(),
                    created_on: layer.created_on.clone(),
                    component_json,
                });
                changes.push(layer.changed_attributes.iter().cloned().collect());
            }
            self.store.replace_layers(&component.component_id, &rows)?;
            stats.layers += rows.len() as u64;
            stacks.push((rows, changes));
            reporter.report("layers", done as u64 + 1, total);
        }

        // Phase 4: attributes from every layer that has a payload
        let total = stats.layers.max(1);
        let mut done = 0u64;
        for (rows, changes) in &stacks {
            for (layer, changed) in rows.iter().zip(changes) {
                check(cancel)?;
                done += 1;
                let Some(json) = &layer.component_json else {
                    continue;
                };
                let attributes: Vec<LayerAttributeRow> = extract_attributes(json, changed);
                stats.attributes += attributes.len() as u64;
                self.store.replace_attributes(&layer.layer_id, &attributes)?;
                reporter.report("attributes", done, total);
            }
        }
        reporter.report("attributes", total, total);

        Ok((stats, warnings))
    }

    async fn resolve_table(
        &self,
        component: &RemoteComponent,
        cache: &Mutex<HashMap<String, Option<String>>>,
    ) -> Result<Option<String>, PipelineError> {
        if let Some(cached) = cache.lock().get(&component.object_id) {
            return Ok(cached.clone());
        }
        let resolved = self.remote.table_logical_name(component).await?;
        cache.lock().insert(component.object_id.clone(), resolved.clone());
        Ok(resolved)
    }
}

fn check(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

fn dedup_preserving(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}

#[cfg(test)]
#[path = "indexer_tests.rs"]
mod tests;
