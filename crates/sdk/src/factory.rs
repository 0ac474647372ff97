// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client factory bound to one connection and a token source.

use std::sync::Arc;

use ddk_core::ConnectionId;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, ServiceClient, TokenSource};
use crate::mux::{ClientLease, ClientMultiplexer};

/// Manufactures remote-service clients for a plugin.
///
/// Bound to the worker's initially bound connection; every manufactured
/// client fetches tokens through the shared [`TokenSource`], so plugins
/// never see or store credentials. With pooling enabled (the default),
/// construction delegates to the [`ClientMultiplexer`].
pub struct ClientFactory {
    bound_connection: ConnectionId,
    tokens: Arc<dyn TokenSource>,
    mux: Arc<ClientMultiplexer>,
    pooling: bool,
}

impl ClientFactory {
    pub fn new(
        bound_connection: ConnectionId,
        tokens: Arc<dyn TokenSource>,
        mux: Arc<ClientMultiplexer>,
    ) -> Self {
        Self { bound_connection, tokens, mux, pooling: true }
    }

    pub fn with_pooling(mut self, pooling: bool) -> Self {
        self.pooling = pooling;
        self
    }

    /// Connection this factory (and its worker) is bound to.
    pub fn bound_connection(&self) -> &ConnectionId {
        &self.bound_connection
    }

    /// Ensure an environment is registered with the multiplexer.
    pub fn register_environment(&self, url: &str) -> Result<(), ClientError> {
        let tokens = Arc::clone(&self.tokens);
        self.mux.register_environment(url, || ServiceClient::new(url, tokens))
    }

    /// A client for short operations, outside the lease discipline.
    pub fn service_client(&self, url: &str) -> Result<ServiceClient, ClientError> {
        if self.pooling {
            self.register_environment(url)?;
            self.mux.service_client(url)
        } else {
            ServiceClient::new(url, Arc::clone(&self.tokens))
        }
    }

    /// Lease a pooled client under the environment's concurrency gate.
    pub async fn lease(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ClientLease, ClientError> {
        self.register_environment(url)?;
        self.mux.lease(url, cancel).await
    }
}

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;
