// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reverse-RPC token client.
//!
//! One connection to the host's token callback socket, opened lazily and
//! reused for the worker's lifetime. A reset channel is reconnected once
//! per call. Tokens pass through this client straight to the HTTP layer;
//! nothing is cached or written on the worker side.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use ddk_core::ConnectionId;
use ddk_sdk::{ClientError, TokenSource};
use ddk_wire::{read_frame, write_frame, ProtocolError, ReverseRequest, ReverseResponse};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::debug;

const TOKEN_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Worker-side client for the host's reverse (token) endpoint.
pub struct ReverseTokenClient {
    socket_path: PathBuf,
    bound_connection: ConnectionId,
    stream: Mutex<Option<UnixStream>>,
}

impl ReverseTokenClient {
    pub fn new(socket_path: PathBuf, bound_connection: ConnectionId) -> Self {
        Self { socket_path, bound_connection, stream: Mutex::new(None) }
    }

    async fn round_trip(
        &self,
        stream: &mut UnixStream,
        request: &ReverseRequest,
    ) -> Result<ReverseResponse, ProtocolError> {
        write_frame(stream, request, TOKEN_RPC_TIMEOUT).await?;
        read_frame(stream, TOKEN_RPC_TIMEOUT).await
    }

    async fn call(&self, request: &ReverseRequest) -> Result<ReverseResponse, ClientError> {
        let mut guard = self.stream.lock().await;

        // First attempt over the cached connection, if any.
        if let Some(stream) = guard.as_mut() {
            match self.round_trip(stream, request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    debug!(error = %e, "token channel reset, reconnecting");
                    *guard = None;
                }
            }
        }

        // Fresh connection; a failure here is final.
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| ClientError::Token(format!("token socket connect failed: {e}")))?;
        let response = self
            .round_trip(&mut stream, request)
            .await
            .map_err(|e| ClientError::Token(format!("token callback failed: {e}")))?;
        *guard = Some(stream);
        Ok(response)
    }
}

#[async_trait]
impl TokenSource for ReverseTokenClient {
    async fn access_token(&self, resource: &str) -> Result<String, ClientError> {
        let request = ReverseRequest::GetAccessToken {
            connection_id: self.bound_connection.clone(),
            resource: resource.to_string(),
        };
        match self.call(&request).await? {
            ReverseResponse::Token { access_token, .. } => Ok(access_token),
            ReverseResponse::Error { code, message } => {
                Err(ClientError::Token(format!("{code}: {message}")))
            }
        }
    }
}

#[cfg(test)]
#[path = "token_client_tests.rs"]
mod tests;
