// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ddk-worker binary.
//!
//! Startup contract: bind the forward endpoint, write exactly one line
//! `SOCKET_PATH=<path>` to stdout, flush, then serve. Exit code 0 on
//! graceful shutdown, non-zero on fatal error. All logging goes to stderr.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use ddk_worker::{env, serve, PluginLoader, Worker};
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum MainError {
    #[error(transparent)]
    Env(#[from] env::WorkerEnvError),

    #[error(transparent)]
    Loader(#[from] ddk_worker::LoaderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env::log_filter()))
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "worker failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), MainError> {
    let worker_env = env::worker_env()?;

    // The loader owns the shared default set of native libraries; it must
    // outlive the plugin instance, so it lives for the whole of run().
    let mut loader = PluginLoader::new();
    let loaded = loader.load(&worker_env.plugin_assembly, &worker_env.plugin_entry)?;

    if let Some(parent) = worker_env.forward_socket.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Unlink any stale socket from a previous worker at this path.
    let _ = std::fs::remove_file(&worker_env.forward_socket);
    let listener = UnixListener::bind(&worker_env.forward_socket)?;

    let worker = Arc::new(Worker::new(worker_env.plugin_id.clone().into(), loaded));

    // Readiness line: the host keys worker startup on seeing exactly this.
    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "SOCKET_PATH={}", worker_env.forward_socket.display())?;
        stdout.flush()?;
    }

    serve(listener, Arc::clone(&worker)).await;

    if let Some(worker) = ddk_worker::worker::teardown_or_warn(worker) {
        worker.teardown().await;
    }
    let _ = std::fs::remove_file(&worker_env.forward_socket);
    Ok(())
}
