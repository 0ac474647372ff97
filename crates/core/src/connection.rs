// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connections to remote environments.

use serde::{Deserialize, Serialize};

use crate::id::ConnectionId;

/// A host-managed connection to one remote environment.
///
/// Only the identity fields are persisted; auth state is derived from the
/// token cache at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub active: bool,
}

impl Connection {
    pub fn new(id: impl Into<ConnectionId>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), url: url.into(), active: false }
    }
}

/// Derived authentication state for a connection. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    pub is_authenticated: bool,
    /// Principal that last authenticated, if any.
    pub principal: Option<String>,
}
