// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token provider: interactive login, silent refresh, encrypted cache.
//!
//! Identity-provider internals live behind [`IdentityBroker`]; the provider
//! owns the loopback redirect listener, the per-connection refresh
//! single-flight, and the `session:expired` latch.

mod browser;
mod cache;
mod crypto;

pub use browser::{BrowserError, SystemUrlOpener, UrlOpener};
pub use cache::{TokenCache, TokenRecord};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ddk_core::{event_type, AuthState, Clock, Connection, ConnectionId, PluginEvent, SystemClock};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use uuid::Uuid;

use crate::bridge::UiBridge;
use crate::connections::ConnectionStore;

/// A token is considered stale this long before its actual expiry.
pub const EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// How long the loopback listener waits for the browser redirect.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("authentication required for connection {0}")]
    AuthRequired(ConnectionId),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("interactive login failed: {0}")]
    LoginFailed(String),

    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("token cache error: {0}")]
    Cache(String),
}

/// Result of a completed credential exchange or refresh.
#[derive(Clone, PartialEq)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_at_unix: u64,
    pub principal: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("access_token", &"<redacted>")
            .field("expires_at_unix", &self.expires_at_unix)
            .field("principal", &self.principal)
            .finish()
    }
}

/// The identity provider, treated as a library: given user consent it
/// produces tokens and refreshes them. Implementations talk to the real
/// authority; tests script it.
#[async_trait]
pub trait IdentityBroker: Send + Sync {
    /// Authorization url the browser is sent to.
    fn authorize_url(&self, connection: &Connection, redirect_uri: &str, state: &str) -> String;

    /// Exchange the redirect code for tokens.
    async fn exchange_code(
        &self,
        connection: &Connection,
        code: &str,
        redirect_uri: &str,
    ) -> Result<IssuedToken, TokenError>;

    /// Silent refresh with previously issued refresh material.
    async fn refresh(
        &self,
        connection: &Connection,
        refresh_token: &str,
        resource: &str,
    ) -> Result<IssuedToken, TokenError>;
}

/// What the reverse RPC endpoint needs from the provider.
#[async_trait]
pub trait TokenService: Send + Sync {
    async fn access_token(
        &self,
        connection_id: &ConnectionId,
        resource: &str,
    ) -> Result<(String, u64), TokenError>;
}

/// Owns login, refresh, and the cache for every connection.
pub struct TokenProvider<C: Clock = SystemClock> {
    cache: TokenCache,
    broker: Arc<dyn IdentityBroker>,
    connections: Arc<ConnectionStore>,
    bridge: Arc<dyn UiBridge>,
    opener: Arc<dyn UrlOpener>,
    clock: C,
    /// Per-connection `session:expired` latch: true once emitted, reset by
    /// the next successful interactive login.
    latches: parking_lot::Mutex<HashMap<ConnectionId, bool>>,
    /// Per-connection single-flight refresh locks.
    refresh_locks: parking_lot::Mutex<HashMap<ConnectionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<C: Clock> TokenProvider<C> {
    pub fn new(
        cache: TokenCache,
        broker: Arc<dyn IdentityBroker>,
        connections: Arc<ConnectionStore>,
        bridge: Arc<dyn UiBridge>,
        opener: Arc<dyn UrlOpener>,
        clock: C,
    ) -> Self {
        Self {
            cache,
            broker,
            connections,
            bridge,
            opener,
            clock,
            latches: parking_lot::Mutex::new(HashMap::new()),
            refresh_locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn is_fresh(&self, record: &TokenRecord) -> bool {
        !record.invalid && record.expires_at_unix > self.clock.now_secs() + EXPIRY_SKEW.as_secs()
    }

    fn refresh_lock(&self, id: &ConnectionId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.refresh_locks.lock().entry(id.clone()).or_default())
    }

    /// Emit `session:expired` once per connection (until the next login)
    /// and produce the `AuthRequired` failure.
    fn auth_required(&self, id: &ConnectionId) -> TokenError {
        let mut latches = self.latches.lock();
        let latched = latches.entry(id.clone()).or_insert(false);
        if !*latched {
            *latched = true;
            self.bridge.push_event(PluginEvent::new(
                "host",
                event_type::SESSION_EXPIRED,
                serde_json::json!({ "connectionId": id.as_str() }),
                self.clock.now_ms(),
            ));
        }
        TokenError::AuthRequired(id.clone())
    }

    fn store_issued(&self, id: &ConnectionId, issued: &IssuedToken) -> Result<(), TokenError> {
        self.cache.put(
            id.clone(),
            TokenRecord {
                access_token: issued.access_token.clone(),
                expires_at_unix: issued.expires_at_unix,
                principal: issued.principal.clone(),
                refresh_token: issued.refresh_token.clone(),
                invalid: false,
            },
        )
    }

    fn require_connection(&self, id: &ConnectionId) -> Result<Connection, TokenError> {
        self.connections.get(id).ok_or_else(|| TokenError::UnknownConnection(id.clone()))
    }

    /// Valid cached token, or a silent refresh, or `AuthRequired`.
    pub async fn get_access_token(
        &self,
        id: &ConnectionId,
        resource: &str,
    ) -> Result<(String, u64), TokenError> {
        let connection = self.require_connection(id)?;

        // Lock-free fast path once a fresh token is observed.
        if let Some(record) = self.cache.get(id) {
            if self.is_fresh(&record) {
                return Ok((record.access_token, record.expires_at_unix));
            }
        }

        // Single-flight refresh: concurrent requesters queue here and
        // re-check the cache, so exactly one refresh runs.
        let lock = self.refresh_lock(id);
        let _guard = lock.lock().await;
        if let Some(record) = self.cache.get(id) {
            if self.is_fresh(&record) {
                return Ok((record.access_token, record.expires_at_unix));
            }
        }

        let refreshable = self
            .cache
            .get(id)
            .filter(|record| !record.invalid && !record.refresh_token.is_empty());
        let Some(record) = refreshable else {
            return Err(self.auth_required(id));
        };

        match self.broker.refresh(&connection, &record.refresh_token, resource).await {
            Ok(issued) => {
                self.store_issued(id, &issued)?;
                Ok((issued.access_token, issued.expires_at_unix))
            }
            Err(e) => {
                warn!(connection = %id, error = %e, "token refresh failed");
                self.cache.mark_invalid(id)?;
                Err(self.auth_required(id))
            }
        }
    }

    /// Interactive login: system browser, loopback redirect, code exchange.
    pub async fn login_interactive(&self, id: &ConnectionId) -> Result<(String, u64), TokenError> {
        let connection = self.require_connection(id)?;

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| TokenError::LoginFailed(format!("loopback listener: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| TokenError::LoginFailed(e.to_string()))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{port}/callback");
        let state = Uuid::new_v4().to_string();

        let url = self.broker.authorize_url(&connection, &redirect_uri, &state);
        self.opener.open(&url).map_err(|e| TokenError::LoginFailed(e.to_string()))?;

        let code = wait_for_redirect(listener, &state, LOGIN_TIMEOUT).await?;
        let issued = self.broker.exchange_code(&connection, &code, &redirect_uri).await?;
        self.store_issued(id, &issued)?;
        self.latches.lock().insert(id.clone(), false);

        info!(connection = %id, principal = %issued.principal, "interactive login succeeded");
        Ok((issued.principal, issued.expires_at_unix))
    }

    /// Clear the cached record. Later token requests fail `AuthRequired`
    /// (without re-emitting `session:expired`) until the next login.
    pub fn logout(&self, id: &ConnectionId) -> Result<(), TokenError> {
        self.cache.remove(id)?;
        self.latches.lock().insert(id.clone(), true);
        Ok(())
    }

    pub fn has_valid(&self, id: &ConnectionId) -> bool {
        self.cache.get(id).map(|record| self.is_fresh(&record)).unwrap_or(false)
    }

    /// Derived auth state for a connection listing.
    pub fn auth_state(&self, id: &ConnectionId) -> AuthState {
        AuthState { is_authenticated: self.has_valid(id), principal: self.cache.principal(id) }
    }
}

#[async_trait]
impl<C: Clock> TokenService for TokenProvider<C> {
    async fn access_token(
        &self,
        connection_id: &ConnectionId,
        resource: &str,
    ) -> Result<(String, u64), TokenError> {
        self.get_access_token(connection_id, resource).await
    }
}

/// Wait for the browser redirect carrying our `state`, answer it with a
/// tiny page, and hand back the authorization code.
async fn wait_for_redirect(
    listener: TcpListener,
    expected_state: &str,
    timeout: Duration,
) -> Result<String, TokenError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let accepted = tokio::time::timeout_at(deadline, listener.accept())
            .await
            .map_err(|_| TokenError::LoginFailed("timed out waiting for redirect".to_string()))?;
        let (mut stream, _) = accepted.map_err(|e| TokenError::LoginFailed(e.to_string()))?;

        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap_or(0);
        let head = String::from_utf8_lossy(&buf[..n]).to_string();

        let Some(path) = request_path(&head) else {
            respond(&mut stream, 400, "Bad request").await;
            continue;
        };
        if !path.starts_with("/callback") {
            respond(&mut stream, 404, "Not found").await;
            continue;
        }
        let params = parse_query(&path);
        if params.get("state").map(String::as_str) != Some(expected_state) {
            respond(&mut stream, 400, "State mismatch").await;
            continue;
        }
        if let Some(error) = params.get("error") {
            respond(&mut stream, 200, "Login failed. You can close this window.").await;
            return Err(TokenError::LoginFailed(error.clone()));
        }
        if let Some(code) = params.get("code") {
            respond(&mut stream, 200, "Login complete. You can close this window.").await;
            return Ok(code.clone());
        }
        respond(&mut stream, 400, "Missing code").await;
    }
}

fn request_path(head: &str) -> Option<String> {
    let line = head.lines().next()?;
    let mut parts = line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    parts.next().map(str::to_string)
}

fn parse_query(path: &str) -> HashMap<String, String> {
    let Some((_, query)) = path.split_once('?') else {
        return HashMap::new();
    };
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn respond(stream: &mut TcpStream, status: u16, body: &str) {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        _ => "Not Found",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
