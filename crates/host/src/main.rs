// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ddk-host binary.
//!
//! Headless harness around [`HostRuntime`]: the desktop shell embeds the
//! library and supplies its own UI bridge and identity broker; this binary
//! wires the system defaults, logs pushed events, and runs until Ctrl-C.

use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use ddk_core::{Connection, SystemClock};
use ddk_host::token::{IdentityBroker, IssuedToken, SystemUrlOpener, TokenCache, TokenError};
use ddk_host::{
    env, ChannelBridge, ConnectionStore, HostRuntime, SupervisorConfig, TokenProvider,
    WorkerSupervisor,
};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Placeholder broker: interactive login needs the embedding shell to
/// supply the real identity-provider library.
struct UnconfiguredBroker;

#[async_trait]
impl IdentityBroker for UnconfiguredBroker {
    fn authorize_url(&self, _connection: &Connection, _redirect_uri: &str, _state: &str) -> String {
        String::new()
    }

    async fn exchange_code(
        &self,
        _connection: &Connection,
        _code: &str,
        _redirect_uri: &str,
    ) -> Result<IssuedToken, TokenError> {
        Err(TokenError::LoginFailed("no identity broker configured".to_string()))
    }

    async fn refresh(
        &self,
        _connection: &Connection,
        _refresh_token: &str,
        _resource: &str,
    ) -> Result<IssuedToken, TokenError> {
        Err(TokenError::RefreshFailed("no identity broker configured".to_string()))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "host failed");
            eprintln!("ddk-host: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let state_dir = env::state_dir()?;
    let data_dir = env::data_dir()?;
    std::fs::create_dir_all(&state_dir)?;
    std::fs::create_dir_all(&data_dir)?;

    let file_appender = tracing_appender::rolling::daily(state_dir.join("logs"), "ddk-host.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::new(env::log_filter()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    let connections = Arc::new(ConnectionStore::open(&state_dir.join("connections.json"))?);
    let cache = TokenCache::open(&state_dir.join("tokens.bin"))?;
    let (bridge, mut events) = ChannelBridge::new();
    let bridge = Arc::new(bridge);

    let provider = Arc::new(TokenProvider::new(
        cache,
        Arc::new(UnconfiguredBroker),
        Arc::clone(&connections),
        Arc::clone(&bridge) as _,
        Arc::new(SystemUrlOpener),
        SystemClock,
    ));
    let supervisor = Arc::new(WorkerSupervisor::new(
        SupervisorConfig::from_env(data_dir.join("storage")),
        provider,
    ));
    let runtime = HostRuntime::new(supervisor, connections, bridge);
    runtime.discover(&data_dir.join("plugins"));
    info!(plugins = runtime.plugins().len(), "host ready");

    // Headless: pushed plugin events go to the log.
    let event_log = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(
                plugin_id = %event.plugin_id,
                event_type = %event.event_type,
                "plugin event"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    runtime.shutdown().await;
    event_log.abort();
    Ok(())
}
