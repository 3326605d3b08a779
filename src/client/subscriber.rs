//! # Subscriber: fans in queues and tracks uncommitted deliveries.
//!
//! [`Subscriber`] is the consuming half of the backend boundary. `get()`
//! yields the next [`FrozenTask`] across all subscribed queues and records it
//! in an uncommitted set; `commit()` acknowledges the delivery, `rollback()`
//! redelivers exactly the original bytes.
//!
//! ## Delivery lifecycle
//! ```text
//! get() ──► decode ──► stamp meta.received ──► freeze ──► uncommitted set
//!                                                            │
//!                                  commit(task) ── remove ───┤ (discard)
//!                                  rollback(task) ─ remove ──┘ (head-of-queue redelivery)
//! ```
//!
//! ## Rules
//! - `meta.received` is stamped exactly once, here, at decode time.
//! - Committing a delivery that is not pending is an error (double commits are
//!   a protocol violation, not a silent no-op).
//! - Rollback does **not** touch any retry counter; looping protection is the
//!   caller's concern.
//! - The local implementation fixes its queue set at construction;
//!   `subscribe`/`unsubscribe` are rejected as unsupported.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::broker::{LocalBroker, Subscription};
use crate::error::{BrokerError, CommitError, ReceiveError};
use crate::tasks::{Codec, FrozenTask};

/// Consuming half of the backend boundary.
///
/// The executor consumes this trait; the commit/rollback contract is what any
/// distributed backend must reproduce.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Yields the next task across all subscribed queues.
    ///
    /// With `timeout = Some(d)`, fails with [`ReceiveError::Timeout`] when no
    /// task arrives within `d`. Decodes the wire bytes, stamps
    /// `meta.received`, and records the delivery as uncommitted.
    async fn get(&self, timeout: Option<Duration>) -> Result<FrozenTask, ReceiveError>;

    /// Acknowledges the delivery: it may be permanently discarded.
    ///
    /// Fails with [`CommitError::NotPending`] if the delivery is not in the
    /// uncommitted set (already committed or rolled back).
    async fn commit(&self, task: &FrozenTask) -> Result<(), CommitError>;

    /// Requests redelivery of exactly the original bytes.
    ///
    /// Does not increment any retry counter; callers guard against infinite
    /// redelivery loops themselves.
    async fn rollback(&self, task: &FrozenTask) -> Result<(), CommitError>;

    /// Adds a queue to the subscription. Backends may reject this.
    async fn subscribe(&self, _queue_name: &str) -> Result<(), ReceiveError> {
        Err(ReceiveError::Unsupported { op: "subscribe" })
    }

    /// Removes a queue from the subscription. Backends may reject this.
    async fn unsubscribe(&self, _queue_name: &str) -> Result<(), ReceiveError> {
        Err(ReceiveError::Unsupported { op: "unsubscribe" })
    }
}

/// One fetched-but-unacknowledged delivery.
struct PendingDelivery {
    /// The original wire bytes, kept verbatim for rollback.
    bytes: Vec<u8>,
    /// Queue the bytes came from.
    queue_name: String,
}

/// In-process subscriber over a [`LocalBroker`] fan-in subscription.
///
/// The queue set is fixed at construction.
pub struct LocalSubscriber {
    broker: Arc<LocalBroker>,
    codec: Arc<dyn Codec>,
    subscription: tokio::sync::Mutex<Subscription>,
    // sync mutex: registration happens without an await point, so a fetch
    // cancelled between channel receipt and registration cannot strand a
    // half-tracked delivery
    pending: Mutex<HashMap<Uuid, PendingDelivery>>,
}

impl LocalSubscriber {
    /// Opens a subscription over the given queues.
    ///
    /// Fails with the broker's subscribe policy outcome (e.g.
    /// `NoSuchQueue` under `Exception`, `EmptySubscription` when every queue
    /// was skipped).
    pub async fn bind(
        broker: Arc<LocalBroker>,
        codec: Arc<dyn Codec>,
        queue_names: &[&str],
    ) -> Result<Self, BrokerError> {
        let subscription = broker.subscribe(queue_names).await?;
        Ok(Self {
            broker,
            codec,
            subscription: tokio::sync::Mutex::new(subscription),
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Number of fetched-but-unacknowledged deliveries.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending set poisoned").len()
    }

    async fn next_delivery(
        &self,
        timeout: Option<Duration>,
    ) -> Result<crate::broker::Delivery, ReceiveError> {
        let mut sub = self.subscription.lock().await;
        let next = sub.next();
        match timeout {
            None => next.await.ok_or(ReceiveError::Disconnected),
            Some(d) => match tokio::time::timeout(d, next).await {
                Ok(Some(delivery)) => Ok(delivery),
                Ok(None) => Err(ReceiveError::Disconnected),
                Err(_elapsed) => Err(ReceiveError::Timeout { timeout: d }),
            },
        }
    }
}

#[async_trait]
impl Subscriber for LocalSubscriber {
    async fn get(&self, timeout: Option<Duration>) -> Result<FrozenTask, ReceiveError> {
        let delivery = self.next_delivery(timeout).await?;

        let mut task = self.codec.decode(&delivery.payload)?;
        // the one place `received` is ever stamped
        task.meta.received = Some(Utc::now());
        let frozen = FrozenTask::freeze(task);

        self.pending.lock().expect("pending set poisoned").insert(
            frozen.delivery_id(),
            PendingDelivery {
                bytes: delivery.payload,
                queue_name: delivery.queue_name,
            },
        );
        Ok(frozen)
    }

    async fn commit(&self, task: &FrozenTask) -> Result<(), CommitError> {
        let removed = self
            .pending
            .lock()
            .expect("pending set poisoned")
            .remove(&task.delivery_id());
        match removed {
            // dropping the bytes is the local form of "discard permanently"
            Some(_delivery) => Ok(()),
            None => Err(CommitError::NotPending {
                delivery_id: task.delivery_id(),
            }),
        }
    }

    async fn rollback(&self, task: &FrozenTask) -> Result<(), CommitError> {
        let delivery = self
            .pending
            .lock()
            .expect("pending set poisoned")
            .remove(&task.delivery_id())
            .ok_or(CommitError::NotPending {
                delivery_id: task.delivery_id(),
            })?;
        self.broker
            .redeliver(delivery.bytes, &delivery.queue_name)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerConfig;
    use crate::client::publisher::{LocalPublisher, Publisher};
    use crate::tasks::{JsonCodec, Task};

    async fn rig(queues: &[&str]) -> (Arc<LocalBroker>, LocalPublisher, LocalSubscriber) {
        let broker = LocalBroker::new(BrokerConfig::default());
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        for q in queues {
            broker.declare(q).await;
        }
        let publisher = LocalPublisher::new(broker.clone(), codec.clone());
        let subscriber = LocalSubscriber::bind(broker.clone(), codec, queues)
            .await
            .unwrap();
        (broker, publisher, subscriber)
    }

    #[tokio::test]
    async fn get_stamps_received_and_tracks_pending() {
        let (_b, publisher, subscriber) = rig(&["main"]).await;
        let task = Task::new("echo", b"hi".to_vec()).with_queue("main");
        publisher.send(&task, None).await.unwrap();

        let frozen = subscriber.get(None).await.unwrap();
        assert_eq!(frozen.payload(), b"hi");
        assert!(frozen.meta().received.is_some());
        assert_eq!(subscriber.pending_count(), 1);
    }

    #[tokio::test]
    async fn commit_is_rejected_the_second_time() {
        let (_b, publisher, subscriber) = rig(&["main"]).await;
        publisher
            .send(&Task::new("echo", vec![]).with_queue("main"), None)
            .await
            .unwrap();

        let frozen = subscriber.get(None).await.unwrap();
        subscriber.commit(&frozen).await.unwrap();
        assert_eq!(subscriber.pending_count(), 0);

        let err = subscriber.commit(&frozen).await.unwrap_err();
        assert!(matches!(err, CommitError::NotPending { .. }));
    }

    #[tokio::test]
    async fn rollback_redelivers_identical_bytes_first() {
        let (_b, publisher, subscriber) = rig(&["main"]).await;
        publisher
            .send(&Task::new("echo", b"one".to_vec()).with_queue("main"), None)
            .await
            .unwrap();
        publisher
            .send(&Task::new("echo", b"two".to_vec()).with_queue("main"), None)
            .await
            .unwrap();

        let first = subscriber.get(None).await.unwrap();
        assert_eq!(first.payload(), b"one");
        subscriber.rollback(&first).await.unwrap();

        // redelivery preempts the rest of the queue and carries the same
        // correlation id and attempt (no counter was touched)
        let again = subscriber.get(None).await.unwrap();
        assert_eq!(again.payload(), b"one");
        assert_eq!(again.correlation_id(), first.correlation_id());
        assert_eq!(again.meta().attempt, first.meta().attempt);
        assert_ne!(again.delivery_id(), first.delivery_id());
    }

    #[tokio::test]
    async fn get_times_out_with_dedicated_error() {
        let (_b, _p, subscriber) = rig(&["main"]).await;
        let err = subscriber
            .get(Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, ReceiveError::Timeout { .. }));
    }

    #[tokio::test]
    async fn changing_subscriptions_is_unsupported() {
        let (_b, _p, subscriber) = rig(&["main"]).await;
        assert!(matches!(
            subscriber.subscribe("other").await.unwrap_err(),
            ReceiveError::Unsupported { op: "subscribe" }
        ));
        assert!(matches!(
            subscriber.unsubscribe("main").await.unwrap_err(),
            ReceiveError::Unsupported { op: "unsubscribe" }
        ));
    }

    #[tokio::test]
    async fn fan_in_across_queues_with_per_queue_order() {
        let (_b, publisher, subscriber) = rig(&["a", "b"]).await;
        for i in 0..3u8 {
            publisher
                .send(&Task::new("t", vec![i]).with_queue("a"), None)
                .await
                .unwrap();
        }
        publisher
            .send(&Task::new("t", vec![9]).with_queue("b"), None)
            .await
            .unwrap();

        let mut a_payloads = Vec::new();
        let mut b_payloads = Vec::new();
        for _ in 0..4 {
            let ft = subscriber.get(None).await.unwrap();
            match ft.meta().queue_name.as_str() {
                "a" => a_payloads.push(ft.payload().to_vec()),
                "b" => b_payloads.push(ft.payload().to_vec()),
                other => panic!("unexpected queue {other}"),
            }
            subscriber.commit(&ft).await.unwrap();
        }
        assert_eq!(a_payloads, vec![vec![0], vec![1], vec![2]]);
        assert_eq!(b_payloads, vec![vec![9]]);
    }
}
