//! Fan-out of change events from the watch set to viewer sessions.
//!
//! Delivery is best-effort and at-most-once per subscriber. Events published
//! while nobody listens are dropped, and a subscriber that falls behind skips
//! ahead to the newest events. Viewers re-render the whole file on every
//! event, so a later event for the same file always supersedes a lost one.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::watcher::event::ChangeEvent;

/// Per-subscriber backlog before the oldest events are discarded.
const CAPACITY: usize = 16;

/// Single-producer, multi-consumer change event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { tx }
    }

    /// Publish an event to every current subscriber.
    ///
    /// Returns how many subscribers it reached; zero means it was dropped.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Start listening. Only events published after this call are seen.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One listener on the bus. Dropping it unregisters the listener.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// Wait for the next event, skipping over any that were lost to lag.
    ///
    /// Returns `None` once every publisher is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber lagged, skipping ahead");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
