// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forward RPC server: accepts host connections and dispatches requests.
//!
//! A connection carries request/response pairs until it either upgrades to
//! an event stream (`SubscribeEvents`) or delivers `Shutdown`. Execute is
//! serialized per worker; event streaming and GetCommands run alongside.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ddk_sdk::PluginError;
use ddk_wire::{
    decode, read_message, write_frame, ErrorCode, ForwardRequest, ForwardResponse, ProtocolError,
};
use tokio::io::AsyncReadExt;
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::worker::{InitializeParams, Worker, WorkerError};

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Run the accept loop until the worker's shutdown token fires.
pub async fn serve(listener: UnixListener, worker: Arc<Worker>) {
    let shutdown = worker.shutdown_token();
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let worker = Arc::clone(&worker);
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, worker).await {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept failed"),
            }
        }
    }
    // Let in-flight responses flush before the process exits.
    let drain = async {
        while connections.join_next().await.is_some() {}
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        warn!("connections still draining at shutdown");
    }
}

fn log_connection_error(e: ProtocolError) {
    match e {
        ProtocolError::ConnectionClosed => debug!("host disconnected"),
        other => warn!(error = %other, "connection error"),
    }
}

async fn handle_connection(mut stream: UnixStream, worker: Arc<Worker>) -> Result<(), ProtocolError> {
    let shutdown = worker.shutdown_token();
    loop {
        let bytes = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            read = read_message(&mut stream) => read?,
        };

        // An unparseable request is an unknown method, not a dead connection.
        let request: ForwardRequest = match decode(&bytes) {
            Ok(request) => request,
            Err(_) => {
                let response = ForwardResponse::error(ErrorCode::UnknownMethod, "unknown method");
                write_frame(&mut stream, &response, RESPONSE_TIMEOUT).await?;
                continue;
            }
        };
        debug!(request = ?request, "forward request");

        match request {
            ForwardRequest::Initialize {
                plugin_id,
                storage_path,
                config,
                token_socket,
                connection_id,
                connection_url,
            } => {
                let params = InitializeParams {
                    plugin_id,
                    storage_path,
                    config,
                    token_socket,
                    connection_id,
                    connection_url,
                };
                let response = match worker.initialize(params).await {
                    Ok((plugin_name, plugin_version)) => {
                        ForwardResponse::Initialized { plugin_name, plugin_version }
                    }
                    Err(e) => ForwardResponse::error(worker_error_code(&e), e.to_string()),
                };
                write_frame(&mut stream, &response, RESPONSE_TIMEOUT).await?;
            }

            ForwardRequest::GetCommands => {
                let response = ForwardResponse::Commands { commands: worker.commands() };
                write_frame(&mut stream, &response, RESPONSE_TIMEOUT).await?;
            }

            ForwardRequest::Execute { command, payload, correlation_id } => {
                let response = match worker.execute(&command, &payload).await {
                    Ok(result) => ForwardResponse::Executed { result, correlation_id },
                    Err(e) => ForwardResponse::command_error(
                        worker_error_code(&e),
                        e.to_string(),
                        correlation_id,
                    ),
                };
                write_frame(&mut stream, &response, RESPONSE_TIMEOUT).await?;
            }

            ForwardRequest::SubscribeEvents { event_types } => {
                // The connection is an event stream from here on.
                return stream_events(stream, worker, event_types).await;
            }

            ForwardRequest::Shutdown => {
                write_frame(&mut stream, &ForwardResponse::ShuttingDown, RESPONSE_TIMEOUT).await?;
                worker.request_shutdown();
                return Ok(());
            }
        }
    }
}

fn worker_error_code(e: &WorkerError) -> ErrorCode {
    match e {
        WorkerError::AlreadyInitialized => ErrorCode::AlreadyInitialized,
        WorkerError::NotInitialized => ErrorCode::PluginNotLoaded,
        WorkerError::Initialization(_) | WorkerError::Context(_) => {
            ErrorCode::PluginInitializationFailed
        }
        WorkerError::Plugin(PluginError::UnknownCommand(_)) => ErrorCode::CommandUnknown,
        WorkerError::Plugin(PluginError::NotInitialized) => ErrorCode::PluginNotLoaded,
        WorkerError::Plugin(PluginError::Initialization(_)) => {
            ErrorCode::PluginInitializationFailed
        }
        WorkerError::Plugin(PluginError::CommandFailed(_)) => ErrorCode::CommandFailed,
    }
}

/// Push buffered events to the subscriber until it hangs up or the worker
/// shuts down. Events recorded before the subscription are delivered first;
/// order is emission order throughout.
async fn stream_events(
    stream: UnixStream,
    worker: Arc<Worker>,
    event_types: Vec<String>,
) -> Result<(), ProtocolError> {
    let shutdown = worker.shutdown_token();
    let (mut reader, mut writer) = stream.into_split();
    write_frame(&mut writer, &ForwardResponse::Subscribed, RESPONSE_TIMEOUT).await?;

    let filter: Option<HashSet<String>> =
        if event_types.is_empty() { None } else { Some(event_types.into_iter().collect()) };
    let mut cursor = 0u64;
    loop {
        let (events, next) = worker.events().drain_since(cursor);
        cursor = next;
        for event in events {
            let wanted = filter.as_ref().map_or(true, |f| f.contains(&event.event_type));
            if !wanted {
                continue;
            }
            write_frame(&mut writer, &ForwardResponse::Event { event }, RESPONSE_TIMEOUT).await?;
        }

        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = worker.events().wait_beyond(cursor) => {}
            _ = wait_eof(&mut reader) => {
                debug!("event subscriber disconnected");
                return Ok(());
            }
        }
    }
}

/// Resolve when the subscriber half-closes or drops its connection.
async fn wait_eof(reader: &mut OwnedReadHalf) {
    let mut buf = [0u8; 16];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {} // Subscribers don't send; ignore stray bytes.
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
