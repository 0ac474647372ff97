// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ddk-sdk: the surface a ddk plugin is built against.
//!
//! A plugin is a cdylib exporting one entry symbol (see [`declare_plugin!`]).
//! At runtime it receives a [`PluginContext`] with storage, config, events,
//! and a [`ClientFactory`] for remote-service access. Plugins never hold
//! credentials; tokens are fetched on demand through the worker's
//! [`TokenSource`], which calls back into the host.

pub mod abi;
pub mod client;
pub mod context;
pub mod factory;
pub mod mux;
pub mod plugin;

pub use abi::{PluginDecl, SDK_VERSION};
pub use client::{ClientError, ServiceClient, TokenSource};
pub use context::{ContextError, PluginContext};
pub use factory::ClientFactory;
pub use mux::{ClientLease, ClientMultiplexer, DEFAULT_MAX_CONCURRENCY};
pub use plugin::{Plugin, PluginError};
