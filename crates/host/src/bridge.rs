// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seam to the UI bridge.
//!
//! The desktop shell's JSON-RPC bridge is out of scope; the host treats it
//! as an opaque sink that accepts pushed events. [`ChannelBridge`] is the
//! in-process implementation used for embedding and tests.

use ddk_core::PluginEvent;
use tokio::sync::mpsc;
use tracing::warn;

/// Accepts events for delivery to the UI.
pub trait UiBridge: Send + Sync {
    fn push_event(&self, event: PluginEvent);
}

/// mpsc-backed bridge; the receiver side is the embedder's problem.
pub struct ChannelBridge {
    tx: mpsc::UnboundedSender<PluginEvent>,
}

impl ChannelBridge {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PluginEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UiBridge for ChannelBridge {
    fn push_event(&self, event: PluginEvent) {
        if self.tx.send(event).is_err() {
            warn!("UI bridge receiver dropped; event discarded");
        }
    }
}

/// Bridge that drops everything. For headless operation.
pub struct NullBridge;

impl UiBridge for NullBridge {
    fn push_event(&self, _event: PluginEvent) {}
}
