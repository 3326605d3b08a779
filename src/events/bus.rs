//! # Event bus for broadcasting engine events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from multiple sources (executor, finalizers,
//! observer workers).
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never suspends.
//! - **Bounded capacity**: a single ring buffer stores recent events for all
//!   receivers; slow receivers observe `RecvError::Lagged(n)` and skip the `n`
//!   oldest items.
//! - **No persistence**: events published while no receiver exists are dropped.
//!
//! The executor uses a single receiver (its observer listener) that fans out
//! to user observers via [`ObserverSet`](crate::observers::ObserverSet);
//! facts the engine must not lose (the backoff log) are recorded directly, not
//! through this bus.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for engine events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender); multiple
/// publishers can publish concurrently and each receiver sees its own clone of
/// every event sent after it subscribed.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped; the call still returns
    /// immediately.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver observing subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
