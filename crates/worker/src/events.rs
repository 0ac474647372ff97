// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded in-memory event buffer.
//!
//! Single producer (the plugin), single consumer (the event subscription
//! handler). The buffer is a ring of `capacity` events: when full, the
//! oldest entry is dropped and a lost-event counter incremented. Sequence
//! numbers are absolute, so a subscriber that attaches after events were
//! recorded still receives everything that has not been evicted.

use std::collections::VecDeque;

use ddk_core::PluginEvent;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Default buffer bound; beyond this, oldest events are dropped.
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

struct Inner {
    events: VecDeque<PluginEvent>,
    /// Absolute sequence number of `events[0]`.
    start_seq: u64,
    dropped: u64,
}

/// Append-only event log with cursor-based draining.
pub struct EventBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner { events: VecDeque::new(), start_seq: 0, dropped: 0 }),
            notify: Notify::new(),
        }
    }

    /// Append one event. Never blocks; evicts the oldest event when full.
    pub fn append(&self, event: PluginEvent) {
        {
            let mut inner = self.inner.lock();
            if inner.events.len() == self.capacity {
                inner.events.pop_front();
                inner.start_seq += 1;
                inner.dropped += 1;
            }
            inner.events.push_back(event);
        }
        self.notify.notify_waiters();
    }

    /// Events at or after `cursor`, plus the cursor for the next drain.
    ///
    /// A cursor older than the retained window resumes at the window start
    /// (the evicted events are counted in [`EventBuffer::dropped`]).
    pub fn drain_since(&self, cursor: u64) -> (Vec<PluginEvent>, u64) {
        let inner = self.inner.lock();
        let from = cursor.max(inner.start_seq);
        let skip = (from - inner.start_seq) as usize;
        let events: Vec<PluginEvent> = inner.events.iter().skip(skip).cloned().collect();
        let next = inner.start_seq + inner.events.len() as u64;
        (events, next)
    }

    /// Wait until at least one event at or after `cursor` exists.
    pub async fn wait_beyond(&self, cursor: u64) {
        loop {
            let notified = self.notify.notified();
            {
                let inner = self.inner.lock();
                if inner.start_seq + inner.events.len() as u64 > cursor {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Count of events evicted before being drained.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
