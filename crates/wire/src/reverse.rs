// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reverse channel: worker → host token callback.
//!
//! Exactly one method. Tokens travel over this socket and nowhere else:
//! never through process arguments, environment, or worker-side disk.

use ddk_core::ConnectionId;
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Request from worker to host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ReverseRequest {
    /// Obtain an access token for a connection and resource.
    ///
    /// An empty `connection_id` means "the worker's initially bound connection".
    GetAccessToken { connection_id: ConnectionId, resource: String },
}

/// Response from host to worker.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ReverseResponse {
    Token { access_token: String, expires_at_unix: u64 },
    Error { code: ErrorCode, message: String },
}

// Manual Debug: the token value must not leak through debug logging.
impl std::fmt::Debug for ReverseResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token { expires_at_unix, .. } => f
                .debug_struct("Token")
                .field("access_token", &"<redacted>")
                .field("expires_at_unix", expires_at_unix)
                .finish(),
            Self::Error { code, message } => {
                f.debug_struct("Error").field("code", code).field("message", message).finish()
            }
        }
    }
}

#[cfg(test)]
#[path = "reverse_tests.rs"]
mod tests;
