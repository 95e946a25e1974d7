//! FIFO buffer for commands received before readiness.

use std::collections::VecDeque;

use mapframe_core::Message;
use tracing::debug;

/// A deferred command and the origin it must be answered on.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub origin: String,
    pub message: Message,
}

#[derive(Debug, Default)]
pub struct MessageQueue {
    entries: VecDeque<QueuedMessage>,
    flushing: bool,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.  `PING` is never queued; returns `false` for it.
    pub fn enqueue(&mut self, origin: &str, message: Message) -> bool {
        if message.is_ping() {
            return false;
        }
        debug!("queueing message until ready: {}", message.kind);
        self.entries.push_back(QueuedMessage {
            origin: origin.to_string(),
            message,
        });
        true
    }

    /// Takes every queued entry for replay, in arrival order.
    ///
    /// Returns `None` while a flush is already running or when there is
    /// nothing to replay; [`MessageQueue::end_flush`] must follow a `Some`.
    pub fn begin_flush(&mut self) -> Option<Vec<QueuedMessage>> {
        if self.flushing || self.entries.is_empty() {
            return None;
        }
        self.flushing = true;
        Some(self.entries.drain(..).collect())
    }

    pub fn end_flush(&mut self) {
        self.flushing = false;
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<QueuedMessage> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.flushing = false;
    }
}
