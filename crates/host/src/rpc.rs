// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forward RPC client: host side of the worker control channel.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ddk_wire::{read_frame, write_frame, ForwardRequest, ForwardResponse, ProtocolError};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::debug;

/// Request/response client over one Unix stream connection.
///
/// The connection is opened lazily and re-opened once per call after a
/// transport reset. Calls are serialized; event subscriptions use their own
/// connection (see [`EventSubscription`]).
pub struct ForwardClient {
    socket_path: PathBuf,
    timeout: Duration,
    stream: Mutex<Option<UnixStream>>,
}

impl ForwardClient {
    pub fn new(socket_path: PathBuf, timeout: Duration) -> Self {
        Self { socket_path, timeout, stream: Mutex::new(None) }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn round_trip(
        &self,
        stream: &mut UnixStream,
        request: &ForwardRequest,
        timeout: Duration,
    ) -> Result<ForwardResponse, ProtocolError> {
        write_frame(stream, request, timeout).await?;
        read_frame(stream, timeout).await
    }

    /// Send one request with the default timeout.
    pub async fn request(&self, request: &ForwardRequest) -> Result<ForwardResponse, ProtocolError> {
        self.request_with_timeout(request, self.timeout).await
    }

    /// Send one request with an explicit timeout. A reset connection is
    /// re-opened and the request retried once.
    pub async fn request_with_timeout(
        &self,
        request: &ForwardRequest,
        timeout: Duration,
    ) -> Result<ForwardResponse, ProtocolError> {
        let mut guard = self.stream.lock().await;

        if let Some(stream) = guard.as_mut() {
            match self.round_trip(stream, request, timeout).await {
                Ok(response) => return Ok(response),
                Err(ProtocolError::Timeout) => {
                    // A timed-out exchange leaves the stream mid-frame.
                    *guard = None;
                    return Err(ProtocolError::Timeout);
                }
                Err(e) => {
                    debug!(error = %e, "forward channel reset, reconnecting");
                    *guard = None;
                }
            }
        }

        let mut stream = UnixStream::connect(&self.socket_path).await.map_err(ProtocolError::from)?;
        let response = self.round_trip(&mut stream, request, timeout).await?;
        *guard = Some(stream);
        Ok(response)
    }
}

/// A live `SubscribeEvents` stream on its own connection.
pub struct EventSubscription {
    stream: UnixStream,
    timeout: Duration,
}

impl EventSubscription {
    /// Open a subscription. Resolves once the worker acknowledges.
    pub async fn open(
        socket_path: &Path,
        event_types: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, ProtocolError> {
        let mut stream = UnixStream::connect(socket_path).await.map_err(ProtocolError::from)?;
        write_frame(&mut stream, &ForwardRequest::SubscribeEvents { event_types }, timeout).await?;
        match read_frame::<_, ForwardResponse>(&mut stream, timeout).await? {
            ForwardResponse::Subscribed => Ok(Self { stream, timeout }),
            other => {
                debug!(response = ?other, "unexpected subscribe acknowledgment");
                Err(ProtocolError::ConnectionClosed)
            }
        }
    }

    /// Next pushed event. `None` when the worker closed the stream.
    ///
    /// Waits up to `idle_timeout`; returns `Err(Timeout)` if nothing arrives,
    /// which leaves the stream intact for the next call.
    pub async fn next_event(
        &mut self,
        idle_timeout: Duration,
    ) -> Result<Option<ddk_core::PluginEvent>, ProtocolError> {
        let frame = tokio::time::timeout(idle_timeout, async {
            ddk_wire::read_message(&mut self.stream).await
        })
        .await;
        let bytes = match frame {
            Err(_) => return Err(ProtocolError::Timeout),
            Ok(Err(ProtocolError::ConnectionClosed)) => return Ok(None),
            Ok(Err(e)) => return Err(e),
            Ok(Ok(bytes)) => bytes,
        };
        match ddk_wire::decode::<ForwardResponse>(&bytes)? {
            ForwardResponse::Event { event } => Ok(Some(event)),
            other => {
                debug!(response = ?other, "unexpected frame on event stream");
                Ok(None)
            }
        }
    }

    /// Blocking-style drain loop: deliver events to `sink` until the stream
    /// closes.
    pub async fn forward_to(mut self, sink: impl Fn(ddk_core::PluginEvent)) {
        loop {
            match self.next_event(self.timeout).await {
                Ok(Some(event)) => sink(event),
                Ok(None) => return,
                Err(ProtocolError::Timeout) => continue,
                Err(_) => return,
            }
        }
    }
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
