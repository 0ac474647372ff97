// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reverse RPC endpoint: the per-worker token callback socket.
//!
//! One listener per worker, bound under the user's private runtime
//! directory with 0600 permissions. The worker normally keeps one
//! connection open for its lifetime; reconnects after a reset are accepted.

use std::path::Path;
use std::sync::Arc;

use ddk_core::ConnectionId;
use ddk_wire::{read_message, write_frame, ErrorCode, ReverseRequest, ReverseResponse};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::token::{TokenError, TokenService};

const RESPONSE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Bind the token callback socket with user-private permissions.
pub fn bind_token_socket(path: &Path) -> std::io::Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
        restrict(parent, 0o700)?;
    }
    let _ = std::fs::remove_file(path);
    let listener = UnixListener::bind(path)?;
    restrict(path, 0o600)?;
    Ok(listener)
}

#[cfg(unix)]
fn restrict(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Serve token callbacks until `shutdown` fires.
///
/// `bound_connection` resolves the empty connection id in requests.
pub async fn serve_token_endpoint(
    listener: UnixListener,
    tokens: Arc<dyn TokenService>,
    bound_connection: ConnectionId,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let tokens = Arc::clone(&tokens);
                    let bound = bound_connection.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(handle_token_connection(stream, tokens, bound, shutdown));
                }
                Err(e) => error!(error = %e, "token endpoint accept failed"),
            }
        }
    }
}

async fn handle_token_connection(
    mut stream: UnixStream,
    tokens: Arc<dyn TokenService>,
    bound_connection: ConnectionId,
    shutdown: CancellationToken,
) {
    loop {
        let bytes = tokio::select! {
            _ = shutdown.cancelled() => return,
            read = read_message(&mut stream) => match read {
                Ok(bytes) => bytes,
                Err(_) => {
                    debug!("token channel closed");
                    return;
                }
            }
        };
        let request: ReverseRequest = match ddk_wire::decode(&bytes) {
            Ok(request) => request,
            Err(_) => {
                let response = ReverseResponse::Error {
                    code: ErrorCode::UnknownMethod,
                    message: "unknown method".to_string(),
                };
                if write_frame(&mut stream, &response, RESPONSE_TIMEOUT).await.is_err() {
                    return;
                }
                continue;
            }
        };

        let ReverseRequest::GetAccessToken { connection_id, resource } = request;
        let effective = if connection_id.is_empty() { bound_connection.clone() } else { connection_id };

        let response = match tokens.access_token(&effective, &resource).await {
            Ok((access_token, expires_at_unix)) => {
                ReverseResponse::Token { access_token, expires_at_unix }
            }
            Err(e) => ReverseResponse::Error { code: token_error_code(&e), message: e.to_string() },
        };
        if write_frame(&mut stream, &response, RESPONSE_TIMEOUT).await.is_err() {
            return;
        }
    }
}

fn token_error_code(e: &TokenError) -> ErrorCode {
    match e {
        TokenError::AuthRequired(_) | TokenError::UnknownConnection(_) => ErrorCode::AuthRequired,
        TokenError::RefreshFailed(_) => ErrorCode::TokenRefreshFailed,
        TokenError::LoginFailed(_) | TokenError::Cache(_) => ErrorCode::Internal,
    }
}

#[cfg(test)]
#[path = "reverse_tests.rs"]
mod tests;
