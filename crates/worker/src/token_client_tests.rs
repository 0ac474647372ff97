// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ddk_sdk::TokenSource;
use ddk_wire::{read_frame, write_frame, ErrorCode, ReverseRequest, ReverseResponse};
use tempfile::tempdir;
use tokio::net::UnixListener;

use super::*;

/// Minimal token endpoint: answers every GetAccessToken, counting calls.
fn spawn_token_endpoint(listener: UnixListener, served: Arc<AtomicU64>, fail: bool) {
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };
            let served = served.clone();
            tokio::spawn(async move {
                loop {
                    let request: ReverseRequest =
                        match read_frame(&mut stream, Duration::from_secs(5)).await {
                            Ok(r) => r,
                            Err(_) => break,
                        };
                    let ReverseRequest::GetAccessToken { connection_id, .. } = request;
                    served.fetch_add(1, Ordering::SeqCst);
                    let response = if fail {
                        ReverseResponse::Error {
                            code: ErrorCode::AuthRequired,
                            message: "login required".to_string(),
                        }
                    } else {
                        ReverseResponse::Token {
                            access_token: format!("token-for-{}", connection_id),
                            expires_at_unix: 4_000_000_000,
                        }
                    };
                    if write_frame(&mut stream, &response, Duration::from_secs(5)).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
}

#[tokio::test]
async fn token_round_trip_carries_the_bound_connection() {
    let temp = tempdir().unwrap();
    let socket = temp.path().join("token.sock");
    let listener = UnixListener::bind(&socket).unwrap();
    let served = Arc::new(AtomicU64::new(0));
    spawn_token_endpoint(listener, served.clone(), false);

    let client = ReverseTokenClient::new(socket, "c1".into());
    let token = client.access_token("https://org.example.test").await.unwrap();
    assert_eq!(token, "token-for-c1");
    assert_eq!(served.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connection_is_reused_across_calls() {
    let temp = tempdir().unwrap();
    let socket = temp.path().join("token.sock");
    let listener = UnixListener::bind(&socket).unwrap();
    let served = Arc::new(AtomicU64::new(0));
    spawn_token_endpoint(listener, served.clone(), false);

    let client = ReverseTokenClient::new(socket, "c1".into());
    for _ in 0..3 {
        client.access_token("https://org.example.test").await.unwrap();
    }
    assert_eq!(served.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn reconnects_after_a_channel_reset() {
    let temp = tempdir().unwrap();
    let socket = temp.path().join("token.sock");
    let served = Arc::new(AtomicU64::new(0));

    // Endpoint that serves exactly one request per connection, then hangs up.
    let listener = UnixListener::bind(&socket).unwrap();
    {
        let served = served.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else { break };
                let _request: ReverseRequest =
                    match read_frame(&mut stream, Duration::from_secs(5)).await {
                        Ok(r) => r,
                        Err(_) => continue,
                    };
                served.fetch_add(1, Ordering::SeqCst);
                let response = ReverseResponse::Token {
                    access_token: "tok".to_string(),
                    expires_at_unix: 4_000_000_000,
                };
                let _ = write_frame(&mut stream, &response, Duration::from_secs(5)).await;
                // stream drops here: the cached worker connection is now dead
            }
        });
    }

    let client = ReverseTokenClient::new(socket, "c1".into());
    client.access_token("https://org.example.test").await.unwrap();
    // Second call finds the cached stream reset and must reconnect.
    client.access_token("https://org.example.test").await.unwrap();
    assert_eq!(served.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn host_error_surfaces_as_token_failure() {
    let temp = tempdir().unwrap();
    let socket = temp.path().join("token.sock");
    let listener = UnixListener::bind(&socket).unwrap();
    spawn_token_endpoint(listener, Arc::new(AtomicU64::new(0)), true);

    let client = ReverseTokenClient::new(socket, "c1".into());
    let err = client.access_token("https://org.example.test").await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("AuthRequired"), "unexpected error: {message}");
}
