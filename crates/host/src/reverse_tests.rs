// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ddk_core::ConnectionId;
use ddk_wire::{read_frame, write_frame, ErrorCode, ReverseRequest, ReverseResponse};
use tempfile::tempdir;
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::token::{TokenError, TokenService};

const T: Duration = Duration::from_secs(5);

struct ScriptedTokens;

#[async_trait]
impl TokenService for ScriptedTokens {
    async fn access_token(
        &self,
        connection_id: &ConnectionId,
        _resource: &str,
    ) -> Result<(String, u64), TokenError> {
        match connection_id.as_str() {
            "expired" => Err(TokenError::AuthRequired(connection_id.clone())),
            other => Ok((format!("tok-{other}"), 4_000_000_000)),
        }
    }
}

async fn start_endpoint(dir: &std::path::Path) -> (std::path::PathBuf, CancellationToken) {
    let socket = dir.join("token.sock");
    let listener = bind_token_socket(&socket).unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(serve_token_endpoint(
        listener,
        Arc::new(ScriptedTokens),
        "bound-conn".into(),
        shutdown.clone(),
    ));
    (socket, shutdown)
}

async fn ask(stream: &mut UnixStream, connection_id: &str) -> ReverseResponse {
    let request = ReverseRequest::GetAccessToken {
        connection_id: connection_id.into(),
        resource: "https://org.example.test".to_string(),
    };
    write_frame(stream, &request, T).await.unwrap();
    read_frame(stream, T).await.unwrap()
}

#[tokio::test]
async fn token_requests_are_answered() {
    let temp = tempdir().unwrap();
    let (socket, _shutdown) = start_endpoint(temp.path()).await;

    let mut stream = UnixStream::connect(&socket).await.unwrap();
    match ask(&mut stream, "c1").await {
        ReverseResponse::Token { access_token, expires_at_unix } => {
            assert_eq!(access_token, "tok-c1");
            assert_eq!(expires_at_unix, 4_000_000_000);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn empty_connection_id_resolves_to_the_bound_connection() {
    let temp = tempdir().unwrap();
    let (socket, _shutdown) = start_endpoint(temp.path()).await;

    let mut stream = UnixStream::connect(&socket).await.unwrap();
    match ask(&mut stream, "").await {
        ReverseResponse::Token { access_token, .. } => assert_eq!(access_token, "tok-bound-conn"),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn auth_failures_map_to_auth_required() {
    let temp = tempdir().unwrap();
    let (socket, _shutdown) = start_endpoint(temp.path()).await;

    let mut stream = UnixStream::connect(&socket).await.unwrap();
    match ask(&mut stream, "expired").await {
        ReverseResponse::Error { code, .. } => assert_eq!(code, ErrorCode::AuthRequired),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn reconnection_after_reset_is_accepted() {
    let temp = tempdir().unwrap();
    let (socket, _shutdown) = start_endpoint(temp.path()).await;

    {
        let mut first = UnixStream::connect(&socket).await.unwrap();
        let _ = ask(&mut first, "c1").await;
        // first connection drops here
    }
    let mut second = UnixStream::connect(&socket).await.unwrap();
    match ask(&mut second, "c1").await {
        ReverseResponse::Token { .. } => {}
        other => panic!("unexpected response: {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn socket_is_user_private() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempdir().unwrap();
    let (socket, _shutdown) = start_endpoint(temp.path()).await;

    let mode = std::fs::metadata(&socket).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
