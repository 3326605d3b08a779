//! # Non-blocking event fan-out to multiple observers.
//!
//! Provides [`ObserverSet`] — distributes events to multiple observers
//! concurrently without blocking the publisher.
//!
//! ## Architecture
//! ```text
//! emit(event)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► observer1.on_event()
//!     │    (bounded)         └──────► panic → ObserverPanicked
//!     ├──► [queue 2] ──► worker 2 ──► observer2.on_event()
//!     └──► [queue N] ──► worker N ──► observerN.on_event()
//! ```
//!
//! ## Rules
//! - **No cross-observer ordering**: observer A may process event N while B
//!   processes N+5; per-observer delivery stays FIFO.
//! - **Overflow**: the event is dropped for that observer only and an
//!   `ObserverOverflow` is published (overflow events themselves are never
//!   re-reported, preventing feedback loops).
//! - **Non-blocking**: `emit()` returns immediately (uses `try_send`).
//! - **Isolation**: a slow or panicking observer does not affect others;
//!   worker tasks catch panics with `catch_unwind` and keep running.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};
use crate::observers::Observe;

/// Per-observer channel metadata.
struct ObserverChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for multiple event observers.
pub struct ObserverSet {
    channels: Vec<ObserverChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl ObserverSet {
    /// Creates a new set and spawns one worker task per observer.
    ///
    /// Each observer gets a bounded mpsc queue (capacity from
    /// [`Observe::queue_capacity`], clamped to 1) and a dedicated worker that
    /// runs until the queue is closed.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn Observe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(observers.len());
        let mut workers = Vec::with_capacity(observers.len());

        for obs in observers {
            let cap = obs.queue_capacity().max(1);
            let name = obs.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let o = Arc::clone(&obs);
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = o.on_event(ev.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = {
                            let any = &*panic_err;
                            if let Some(msg) = any.downcast_ref::<&'static str>() {
                                (*msg).to_string()
                            } else if let Some(msg) = any.downcast_ref::<String>() {
                                msg.clone()
                            } else {
                                "unknown panic".to_string()
                            }
                        };
                        bus_for_worker.publish(Event::observer_panicked(o.name(), info));
                    }
                }
            });
            channels.push(ObserverChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Emits an event to all observers (clones into an `Arc`).
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Emits a pre-allocated `Arc<Event>` to all observers.
    ///
    /// Uses `try_send`; on a full or closed queue the event is dropped for
    /// that observer and an `ObserverOverflow` is published (unless the event
    /// itself is an overflow report).
    pub fn emit_arc(&self, event: Arc<Event>) {
        let is_overflow_evt = matches!(event.kind, EventKind::ObserverOverflow);

        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if !is_overflow_evt {
                        self.bus.publish(Event::observer_overflow(channel.name, "full"));
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    if !is_overflow_evt {
                        self.bus
                            .publish(Event::observer_overflow(channel.name, "closed"));
                    }
                }
            }
        }
    }

    /// Gracefully shuts down all observer workers.
    ///
    /// 1. Drops all channel senders (workers see the channel closed)
    /// 2. Awaits all worker tasks to finish
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counter {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Observe for Counter {
        async fn on_event(&self, _event: &Event) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "counter"
        }
    }

    struct Panicker;

    #[async_trait]
    impl Observe for Panicker {
        async fn on_event(&self, _event: &Event) {
            panic!("observer blew up");
        }

        fn name(&self) -> &'static str {
            "panicker"
        }
    }

    #[tokio::test]
    async fn events_reach_every_observer() {
        let bus = Bus::new(16);
        let seen_a = Arc::new(AtomicUsize::new(0));
        let seen_b = Arc::new(AtomicUsize::new(0));
        let set = ObserverSet::new(
            vec![
                Arc::new(Counter {
                    seen: seen_a.clone(),
                }),
                Arc::new(Counter {
                    seen: seen_b.clone(),
                }),
            ],
            bus,
        );

        for _ in 0..3 {
            set.emit(&Event::now(EventKind::ExecutorStarted));
        }
        set.shutdown().await;

        assert_eq!(seen_a.load(Ordering::SeqCst), 3);
        assert_eq!(seen_b.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn panicking_observer_is_isolated_and_reported() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let seen = Arc::new(AtomicUsize::new(0));
        let set = ObserverSet::new(
            vec![
                Arc::new(Panicker),
                Arc::new(Counter { seen: seen.clone() }),
            ],
            bus,
        );

        set.emit(&Event::now(EventKind::ExecutorStarted));

        // the healthy observer still sees the event
        tokio::time::timeout(Duration::from_secs(1), async {
            while seen.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("healthy observer starved");

        // the panic is reported on the bus
        let reported = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Ok(ev) = rx.recv().await {
                    if ev.kind == EventKind::ObserverPanicked {
                        return ev;
                    }
                }
            }
        })
        .await
        .expect("panic report missing");
        assert!(reported.reason.as_deref().unwrap().contains("panicker"));

        set.shutdown().await;
    }
}
