// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker health monitoring.
//!
//! A per-worker task probes process exit and, when the worker has been
//! idle past the health interval, pings it with the zero-cost
//! `GetCommands` RPC. Three consecutive failed pings mark the worker
//! unhealthy and stop it; the next command for that instance restarts.

use std::collections::HashMap;
use std::sync::Arc;

use ddk_core::{Clock, SystemClock, WorkerKey};
use ddk_wire::ForwardRequest;
use tracing::warn;

use super::handle::{HealthState, WorkerHandle};
use super::{stop_worker, SupervisorConfig};

type WorkerMap = Arc<parking_lot::Mutex<HashMap<WorkerKey, Arc<WorkerHandle>>>>;

pub(crate) fn spawn_monitor(workers: WorkerMap, handle: Arc<WorkerHandle>, config: SupervisorConfig) {
    tokio::spawn(async move {
        let clock = SystemClock;
        let mut strikes = 0u32;
        loop {
            tokio::time::sleep(config.health_interval).await;

            if handle.health() == HealthState::Terminated {
                remove(&workers, &handle);
                return;
            }

            // Crash detection comes before pings: a dead process fails fast.
            if let Some(code) = handle.try_wait().await {
                handle.record_exit(code);
                handle.reverse_shutdown.cancel();
                remove(&workers, &handle);
                warn!(key = %handle.key(), exit_code = code, "worker exited unexpectedly");
                return;
            }

            // Recent traffic counts as health; only idle workers get pinged.
            let idle_ms = clock.now_ms().saturating_sub(handle.last_heartbeat_ms());
            if idle_ms < config.health_interval.as_millis() as u64 {
                strikes = 0;
                continue;
            }

            let ping = tokio::time::timeout(
                config.health_ping_timeout,
                handle.client.request_with_timeout(
                    &ForwardRequest::GetCommands,
                    config.health_ping_timeout,
                ),
            )
            .await;
            match ping {
                Ok(Ok(_)) => {
                    strikes = 0;
                    handle.heartbeat(clock.now_ms());
                }
                _ => {
                    strikes += 1;
                    if strikes >= config.health_strikes {
                        warn!(key = %handle.key(), strikes, "worker unhealthy, stopping");
                        handle.set_health(HealthState::Unhealthy);
                        stop_worker(&handle, &config).await;
                        remove(&workers, &handle);
                        return;
                    }
                }
            }
        }
    });
}

fn remove(workers: &WorkerMap, handle: &Arc<WorkerHandle>) {
    let mut map = workers.lock();
    // Only remove our own entry; a restart may have replaced it already.
    if let Some(current) = map.get(handle.key()) {
        if Arc::ptr_eq(current, handle) {
            map.remove(handle.key());
        }
    }
}
