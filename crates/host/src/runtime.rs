// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host runtime: routes UI commands to workers and plugin events back out.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use ddk_core::{Connection, CorrelationId, InstanceId, PluginId, WorkerKey};
use thiserror::Error;
use tracing::{debug, warn};

use crate::bridge::UiBridge;
use crate::connections::ConnectionStore;
use crate::discovery::{discover_plugins, DiscoveredPlugin};
use crate::supervisor::{SupervisorError, WorkerSupervisor};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unknown plugin: {0}")]
    PluginNotFound(PluginId),

    #[error("no active connection")]
    NoActiveConnection,

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Ties the supervisor, connection store, and UI bridge together.
pub struct HostRuntime {
    supervisor: Arc<WorkerSupervisor>,
    connections: Arc<ConnectionStore>,
    bridge: Arc<dyn UiBridge>,
    plugins: parking_lot::Mutex<Vec<DiscoveredPlugin>>,
    /// Workers with a live event pump.
    pumps: Arc<parking_lot::Mutex<HashSet<WorkerKey>>>,
}

impl HostRuntime {
    pub fn new(
        supervisor: Arc<WorkerSupervisor>,
        connections: Arc<ConnectionStore>,
        bridge: Arc<dyn UiBridge>,
    ) -> Self {
        Self {
            supervisor,
            connections,
            bridge,
            plugins: parking_lot::Mutex::new(Vec::new()),
            pumps: Arc::new(parking_lot::Mutex::new(HashSet::new())),
        }
    }

    /// Refresh the discovered plugin list.
    pub fn discover(&self, plugins_dir: &Path) {
        let found = discover_plugins(plugins_dir);
        debug!(count = found.len(), "plugins discovered");
        *self.plugins.lock() = found;
    }

    pub fn plugins(&self) -> Vec<DiscoveredPlugin> {
        self.plugins.lock().clone()
    }

    pub fn find_plugin(&self, id: &PluginId) -> Option<DiscoveredPlugin> {
        self.plugins.lock().iter().find(|p| &p.manifest.id == id).cloned()
    }

    pub fn connections(&self) -> &Arc<ConnectionStore> {
        &self.connections
    }

    fn active_connection(&self) -> Option<Connection> {
        self.connections.list().into_iter().find(|c| c.active)
    }

    /// Run one plugin command, starting the instance's worker on demand.
    pub async fn execute_command(
        &self,
        plugin_id: &PluginId,
        instance: &InstanceId,
        command: &str,
        payload: Vec<u8>,
        correlation_id: CorrelationId,
    ) -> Result<Vec<u8>, RuntimeError> {
        let plugin = self
            .find_plugin(plugin_id)
            .ok_or_else(|| RuntimeError::PluginNotFound(plugin_id.clone()))?;
        let connection = self.active_connection().ok_or(RuntimeError::NoActiveConnection)?;

        let key = WorkerKey::new(plugin_id.clone(), instance.clone());
        self.supervisor.ensure_started(&plugin, instance, &connection).await?;
        self.ensure_event_pump(&key).await;

        Ok(self.supervisor.execute(&key, command, payload, correlation_id).await?)
    }

    /// Pump the worker's event stream into the UI bridge, once per worker.
    async fn ensure_event_pump(&self, key: &WorkerKey) {
        {
            let mut pumps = self.pumps.lock();
            if pumps.contains(key) {
                return;
            }
            pumps.insert(key.clone());
        }
        match self.supervisor.subscribe(key, Vec::new()).await {
            Ok(subscription) => {
                let bridge = Arc::clone(&self.bridge);
                let pumps = Arc::clone(&self.pumps);
                let key = key.clone();
                tokio::spawn(async move {
                    subscription.forward_to(|event| bridge.push_event(event)).await;
                    pumps.lock().remove(&key);
                    debug!(key = %key, "event pump ended");
                });
            }
            Err(e) => {
                warn!(key = %key, error = %e, "event subscription failed");
                self.pumps.lock().remove(key);
            }
        }
    }

    /// Stop one plugin instance.
    pub async fn stop_instance(&self, key: &WorkerKey) -> Result<(), RuntimeError> {
        Ok(self.supervisor.stop(key).await?)
    }

    /// Stop every worker; called at host shutdown.
    pub async fn shutdown(&self) {
        self.supervisor.stop_all().await;
    }
}
