// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote-service client with on-demand token acquisition.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from remote-service clients and the multiplexer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("environment not registered: {0}")]
    EnvironmentNotRegistered(String),

    #[error("client multiplexer is disposed")]
    Disposed,

    #[error("cancelled")]
    Cancelled,

    #[error("token acquisition failed: {0}")]
    Token(String),

    #[error("invalid base url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote service returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Produces access tokens for a resource. The worker's implementation is a
/// reverse-RPC call into the host; no refreshable credential exists on this
/// side of the boundary.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self, resource: &str) -> Result<String, ClientError>;
}

/// HTTP client bound to one remote environment.
///
/// Cheap to clone; the multiplexer keeps a root instance as a template and
/// clones it for pooled leases.
#[derive(Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl ServiceClient {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenSource>) -> Result<Self, ClientError> {
        let base_url = normalize_base_url(base_url)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(ClientError::Http)?;
        Ok(Self { http, base_url, tokens })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a JSON document relative to the base url.
    ///
    /// `path_and_query` starts with `/`. A bearer token for the environment is
    /// acquired per request; tokens are never stored on the client.
    pub async fn get_json(&self, path_and_query: &str) -> Result<serde_json::Value, ClientError> {
        let token = self.tokens.access_token(&self.base_url).await?;
        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self.http.get(&url).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status: status.as_u16(), body });
        }
        Ok(response.json().await?)
    }
}

/// Strip a trailing slash and reject obviously invalid urls.
fn normalize_base_url(url: &str) -> Result<String, ClientError> {
    let trimmed = url.trim().trim_end_matches('/');
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(ClientError::InvalidUrl {
            url: url.to_string(),
            reason: "expected http(s) scheme".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
