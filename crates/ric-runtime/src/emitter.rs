// SPDX-License-Identifier: MIT OR Apache-2.0
//! Non-blocking channel emitter (§6).

use ric_core::{Event, EventEmitter};
use tokio::sync::mpsc;

/// Emits events onto a bounded [`mpsc::Sender`] via `try_send`: a full
/// channel drops the event rather than blocking the caller, matching §6's
/// "channel-emitter uses non-blocking send". Events for a single worker are
/// always delivered in program order, since they flow through one sender.
#[derive(Debug, Clone)]
pub struct ChannelEventEmitter {
    tx: mpsc::Sender<Event>,
}

impl ChannelEventEmitter {
    /// Create a paired emitter/receiver with a channel of `capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventEmitter for ChannelEventEmitter {
    fn emit(&self, event: Event) {
        if self.tx.try_send(event).is_err() {
            tracing::debug!("event dropped: channel full or closed");
        }
    }
}
