// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coalesced, monotonic progress eventing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ddk_core::{event_type, Clock, OperationId, PluginEvent, PluginId, SystemClock};
use parking_lot::Mutex;

/// Minimum interval between progress events (phase boundaries always emit).
const COALESCE_INTERVAL: Duration = Duration::from_millis(100);

/// Overall percent span of each phase.
fn phase_range(phase: &str) -> (u64, u64) {
    match phase {
        "solutions" => (0, 10),
        "components" => (10, 45),
        "layers" => (45, 80),
        _ => (80, 100),
    }
}

struct State {
    last_emit: Option<Instant>,
    max_percent: u64,
}

/// Emits `plugin:sla:index-progress` events, at most one per 100 ms, with
/// a percent that never decreases across phases.
pub struct ProgressReporter {
    plugin_id: PluginId,
    operation_id: OperationId,
    emit: Arc<dyn Fn(PluginEvent) + Send + Sync>,
    state: Mutex<State>,
}

impl ProgressReporter {
    pub fn new(
        plugin_id: PluginId,
        operation_id: OperationId,
        emit: Arc<dyn Fn(PluginEvent) + Send + Sync>,
    ) -> Self {
        Self {
            plugin_id,
            operation_id,
            emit,
            state: Mutex::new(State { last_emit: None, max_percent: 0 }),
        }
    }

    pub fn report(&self, phase: &str, current: u64, total: u64) {
        let (base, end) = phase_range(phase);
        let span = end - base;
        let ratio = if total == 0 { span } else { current.min(total) * span / total };
        let raw_percent = base + ratio;

        let percent = {
            let mut state = self.state.lock();
            let percent = raw_percent.max(state.max_percent);
            state.max_percent = percent;

            let phase_boundary = current >= total;
            let due = state
                .last_emit
                .map(|at| at.elapsed() >= COALESCE_INTERVAL)
                .unwrap_or(true);
            if !phase_boundary && !due {
                return;
            }
            state.last_emit = Some(Instant::now());
            percent
        };

        (self.emit)(PluginEvent::new(
            self.plugin_id.clone(),
            event_type::INDEX_PROGRESS,
            serde_json::json!({
                "operationId": self.operation_id.as_str(),
                "phase": phase,
                "percent": percent,
                "current": current,
                "total": total,
            }),
            SystemClock.now_ms(),
        ));
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
