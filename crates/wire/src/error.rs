// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error codes carried in wire-level error responses.

use serde::{Deserialize, Serialize};

/// Machine-readable kind attached to every RPC error response.
///
/// Handlers catch internal faults and translate them into
/// `(code, message)` pairs; the message is human-readable, the code is what
/// callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Supervisor / RPC
    WorkerStartFailed,
    WorkerTerminated,
    AlreadyInitialized,
    UnknownMethod,

    // Token provider
    AuthRequired,
    TokenRefreshFailed,

    // Plugin runtime
    PluginNotLoaded,
    PluginInitializationFailed,
    CommandUnknown,
    CommandFailed,

    // Multiplexer and common
    EnvironmentNotRegistered,
    Disposed,
    Cancelled,
    Timeout,

    // Indexer / query
    IndexStartFailed,
    IndexInProgress,
    ComponentNotFound,
    LayerNotFound,

    /// Request failed validation (malformed AST, missing fields).
    InvalidRequest,

    /// Unclassified internal fault.
    Internal,
}

ddk_core::simple_display! {
    ErrorCode {
        WorkerStartFailed => "WorkerStartFailed",
        WorkerTerminated => "WorkerTerminated",
        AlreadyInitialized => "AlreadyInitialized",
        UnknownMethod => "UnknownMethod",
        AuthRequired => "AuthRequired",
        TokenRefreshFailed => "TokenRefreshFailed",
        PluginNotLoaded => "PluginNotLoaded",
        PluginInitializationFailed => "PluginInitializationFailed",
        CommandUnknown => "CommandUnknown",
        CommandFailed => "CommandFailed",
        EnvironmentNotRegistered => "EnvironmentNotRegistered",
        Disposed => "Disposed",
        Cancelled => "Cancelled",
        Timeout => "Timeout",
        IndexStartFailed => "IndexStartFailed",
        IndexInProgress => "IndexInProgress",
        ComponentNotFound => "ComponentNotFound",
        LayerNotFound => "LayerNotFound",
        InvalidRequest => "InvalidRequest",
        Internal => "Internal",
    }
}
