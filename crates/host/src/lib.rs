// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ddk-host: the trusted process that supervises plugin workers.
//!
//! The host owns credentials and the per-worker reverse (token callback)
//! endpoints; workers obtain tokens only by calling back in. Forward RPC
//! drives plugin commands and streams plugin events, which the host relays
//! to the UI bridge.

pub mod bridge;
pub mod connections;
pub mod discovery;
pub mod env;
pub mod reverse;
pub mod rpc;
pub mod runtime;
pub mod supervisor;
pub mod token;

pub use bridge::{ChannelBridge, UiBridge};
pub use connections::ConnectionStore;
pub use discovery::{discover_plugins, DiscoveredPlugin};
pub use reverse::serve_token_endpoint;
pub use rpc::{EventSubscription, ForwardClient};
pub use runtime::HostRuntime;
pub use supervisor::{HealthState, SupervisorConfig, SupervisorError, WorkerHandle, WorkerSupervisor};
pub use token::{
    IdentityBroker, IssuedToken, TokenCache, TokenError, TokenProvider, TokenService,
};
