// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-environment pooled remote-service clients with a concurrency gate.
//!
//! Each registered environment owns a root client (the template), a pool of
//! idle clones, and a semaphore capping concurrent leases. Waiters park on
//! the semaphore in FIFO order; a cancelled wait never consumes a slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::{ClientError, ServiceClient};

/// Default `maxConcurrencyPerEnvironment`.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

struct Environment {
    root: ServiceClient,
    idle: Mutex<Vec<ServiceClient>>,
    gate: Arc<Semaphore>,
    disposed: AtomicBool,
}

/// Pooled + leased client manager, one entry per remote-service base url.
pub struct ClientMultiplexer {
    capacity: usize,
    disposed: AtomicBool,
    environments: Mutex<HashMap<String, Arc<Environment>>>,
}

impl ClientMultiplexer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            disposed: AtomicBool::new(false),
            environments: Mutex::new(HashMap::new()),
        }
    }

    /// Register an environment. Idempotent per url; the first call wins.
    pub fn register_environment<F>(&self, url: &str, root_factory: F) -> Result<(), ClientError>
    where
        F: FnOnce() -> Result<ServiceClient, ClientError>,
    {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ClientError::Disposed);
        }
        let mut environments = self.environments.lock();
        if environments.contains_key(url) {
            return Ok(());
        }
        let root = root_factory()?;
        environments.insert(
            url.to_string(),
            Arc::new(Environment {
                root,
                idle: Mutex::new(Vec::new()),
                gate: Arc::new(Semaphore::new(self.capacity)),
                disposed: AtomicBool::new(false),
            }),
        );
        debug!(url, capacity = self.capacity, "environment registered");
        Ok(())
    }

    fn environment(&self, url: &str) -> Result<Arc<Environment>, ClientError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ClientError::Disposed);
        }
        self.environments
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| ClientError::EnvironmentNotRegistered(url.to_string()))
    }

    /// A fresh clone of the root client, outside the concurrency gate.
    /// Intended for short operations.
    pub fn service_client(&self, url: &str) -> Result<ServiceClient, ClientError> {
        Ok(self.environment(url)?.root.clone())
    }

    /// Await a slot on the environment's gate and lease a pooled client.
    ///
    /// Cancellation of the wait is honored and reported as
    /// [`ClientError::Cancelled`] without consuming a slot.
    pub async fn lease(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ClientLease, ClientError> {
        let env = self.environment(url)?;
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            acquired = env.gate.clone().acquire_owned() => {
                acquired.map_err(|_| ClientError::Disposed)?
            }
        };
        if env.disposed.load(Ordering::Acquire) {
            return Err(ClientError::Disposed);
        }
        let client = env.idle.lock().pop().unwrap_or_else(|| env.root.clone());
        Ok(ClientLease { client: Some(client), env, _permit: permit })
    }

    /// Currently leased count for an environment (diagnostics and tests).
    pub fn leased_count(&self, url: &str) -> Result<usize, ClientError> {
        let env = self.environment(url)?;
        Ok(self.capacity - env.gate.available_permits())
    }

    /// Dispose all pooled clients and roots. Subsequent operations fail
    /// with [`ClientError::Disposed`]; parked waiters wake with the same.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let environments: Vec<Arc<Environment>> =
            self.environments.lock().drain().map(|(_, env)| env).collect();
        for env in environments {
            env.disposed.store(true, Ordering::Release);
            env.gate.close();
            env.idle.lock().clear();
            // The root drops last, with the environment Arc.
        }
        debug!("client multiplexer disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for ClientMultiplexer {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// An exclusive lease on one pooled client.
///
/// Releasing (explicitly or on drop) returns the client to the pool and the
/// slot to the gate. Release is idempotent.
pub struct ClientLease {
    client: Option<ServiceClient>,
    env: Arc<Environment>,
    _permit: OwnedSemaphorePermit,
}

impl ClientLease {
    pub fn client(&self) -> &ServiceClient {
        // Invariant: `client` is Some until drop.
        match &self.client {
            Some(client) => client,
            None => unreachable!("lease used after release"),
        }
    }

    /// Return the client to the pool and free the slot.
    pub fn release(self) {
        // Drop runs the return-to-pool logic.
    }
}

impl Drop for ClientLease {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            if !self.env.disposed.load(Ordering::Acquire) {
                self.env.idle.lock().push(client);
            }
        }
        // `_permit` drops here, releasing the gate slot in FIFO order.
    }
}

impl std::ops::Deref for ClientLease {
    type Target = ServiceClient;

    fn deref(&self) -> &Self::Target {
        self.client()
    }
}

#[cfg(test)]
#[path = "mux_tests.rs"]
mod tests;
