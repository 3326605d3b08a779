//! # LocalBroker: in-process registry of named topics.
//!
//! [`LocalBroker`] owns the `name -> Topic` map and mediates publish/subscribe
//! access under the two independently configured [`MissingQueuePolicy`] values
//! in [`BrokerConfig`]. It is the in-memory, single-process reference backend;
//! a durable broker implements the same client traits and replaces it wholesale.
//!
//! ## Subscription fan-in
//! ```text
//! subscribe(["a", "b"]) ──► Subscription
//!     │
//!     ├──► pump "a": loop { topic.get() ──► tx.send((payload, "a")) }
//!     └──► pump "b": loop { topic.get() ──► tx.send((payload, "b")) }
//!                              │
//!                   capacity-1 channel ──► Subscription::next()
//! ```
//!
//! ## Rules
//! - Queue identity is unique per name; creation wakes every `Wait` waiter.
//! - Each pump keeps exactly **one** outstanding wait per queue and re-arms it
//!   immediately after its item is yielded ("yield one, re-arm one"), so no
//!   message from any subscribed queue is lost between consecutive yields.
//! - Cancelling the subscription cancels every outstanding wait. An item
//!   already dequeued but not yet yielded at that moment is dropped — this is
//!   the documented lossy edge of cooperative cancellation, reachable only
//!   through shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::policy::{BrokerConfig, MissingQueuePolicy};
use crate::broker::topic::Topic;
use crate::error::BrokerError;

/// One message yielded by a [`Subscription`]: the wire payload plus the queue
/// it came from.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// The raw wire bytes as published.
    pub payload: Vec<u8>,
    /// Name of the queue that delivered the payload.
    pub queue_name: String,
}

/// In-process broker: a registry of named [`Topic`]s plus missing-queue policy.
pub struct LocalBroker {
    cfg: BrokerConfig,
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    /// Wakes `Wait`-policy waiters whenever any queue is created.
    created: Notify,
}

impl LocalBroker {
    /// Creates an empty broker with the given configuration.
    pub fn new(cfg: BrokerConfig) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            topics: RwLock::new(HashMap::new()),
            created: Notify::new(),
        })
    }

    /// The broker configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.cfg
    }

    /// Returns the named topic, creating it if absent.
    ///
    /// Creation wakes every `Wait`-policy waiter so they can re-check.
    pub async fn declare(&self, name: &str) -> Arc<Topic> {
        {
            let topics = self.topics.read().await;
            if let Some(t) = topics.get(name) {
                return t.clone();
            }
        }
        let mut topics = self.topics.write().await;
        if let Some(t) = topics.get(name) {
            return t.clone();
        }
        let topic = Arc::new(Topic::new(name, self.cfg.queue_capacity));
        topics.insert(name.to_string(), topic.clone());
        drop(topics);
        self.created.notify_waiters();
        topic
    }

    /// Returns the named topic if it exists.
    pub async fn lookup(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.read().await.get(name).cloned()
    }

    /// Sorted names of all existing queues.
    pub async fn queue_names(&self) -> Vec<String> {
        let topics = self.topics.read().await;
        let mut names: Vec<String> = topics.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Publishes wire bytes into the named queue, resolving the configured
    /// publish policy when the queue does not exist.
    ///
    /// Suspends on a full queue (backpressure) and, under the `Wait` policy,
    /// until the queue is created.
    pub async fn publish(&self, payload: Vec<u8>, queue_name: &str) -> Result<(), BrokerError> {
        let topic = match self.resolve(queue_name, self.cfg.publish_policy, "publish").await? {
            Some(t) => t,
            None => return Ok(()),
        };
        // put only fails by closure; a full queue suspends instead
        topic.put(payload).await.map_err(|_| BrokerError::QueueClosed {
            name: queue_name.to_string(),
        })
    }

    /// Re-inserts wire bytes at the head of the named queue (rollback path).
    pub async fn redeliver(&self, payload: Vec<u8>, queue_name: &str) -> Result<(), BrokerError> {
        let topic = self.declare(queue_name).await;
        topic
            .put_front(payload)
            .await
            .map_err(|_| BrokerError::QueueClosed {
                name: queue_name.to_string(),
            })
    }

    /// Opens a fan-in subscription over the named queues.
    ///
    /// One pump per queue keeps a single outstanding wait and re-arms after
    /// every yield. Queues resolved away by a `Skip`/`Warn` policy are omitted;
    /// resolving to zero queues is [`BrokerError::EmptySubscription`].
    pub async fn subscribe(
        self: &Arc<Self>,
        queue_names: &[&str],
    ) -> Result<Subscription, BrokerError> {
        let mut pumps: Vec<(String, Option<Arc<Topic>>)> = Vec::new();
        for &name in queue_names {
            let existing = self.lookup(name).await;
            match (existing, self.cfg.subscribe_policy) {
                (Some(t), _) => pumps.push((name.to_string(), Some(t))),
                (None, MissingQueuePolicy::Skip) => {}
                (None, MissingQueuePolicy::Warn) => {
                    log::warn!("subscribe: no such queue '{name}', skipping");
                }
                (None, MissingQueuePolicy::Create) => {
                    pumps.push((name.to_string(), Some(self.declare(name).await)));
                }
                (None, MissingQueuePolicy::Exception) => {
                    return Err(BrokerError::NoSuchQueue {
                        name: name.to_string(),
                    });
                }
                // resolved lazily inside the pump
                (None, MissingQueuePolicy::Wait) => pumps.push((name.to_string(), None)),
            }
        }
        if pumps.is_empty() {
            return Err(BrokerError::EmptySubscription);
        }

        let (tx, rx) = mpsc::channel::<Delivery>(1);
        let token = CancellationToken::new();
        let mut workers = Vec::with_capacity(pumps.len());
        for (name, topic) in pumps {
            workers.push(tokio::spawn(Self::pump(
                self.clone(),
                name,
                topic,
                tx.clone(),
                token.clone(),
            )));
        }
        Ok(Subscription { rx, token, workers })
    }

    /// Closes every queue: pending and future puts/gets fail, subscriptions
    /// drain and disconnect.
    pub async fn close(&self) {
        let topics = self.topics.read().await;
        for topic in topics.values() {
            topic.close();
        }
    }

    /// Single-queue forwarder: one outstanding wait, re-armed after each yield.
    async fn pump(
        broker: Arc<Self>,
        name: String,
        topic: Option<Arc<Topic>>,
        tx: mpsc::Sender<Delivery>,
        token: CancellationToken,
    ) {
        let topic = match topic {
            Some(t) => t,
            None => {
                tokio::select! {
                    _ = token.cancelled() => return,
                    t = broker.wait_for(&name) => t,
                }
            }
        };
        drop(broker);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                got = topic.get() => match got {
                    Ok(payload) => {
                        let delivery = Delivery {
                            payload,
                            queue_name: name.clone(),
                        };
                        if tx.send(delivery).await.is_err() {
                            break;
                        }
                    }
                    Err(_closed) => break,
                }
            }
        }
    }

    /// Suspends until the named queue exists, then returns it.
    async fn wait_for(&self, name: &str) -> Arc<Topic> {
        loop {
            // register interest before re-checking, so a creation racing this
            // check cannot be missed
            let notified = self.created.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(t) = self.lookup(name).await {
                return t;
            }
            notified.await;
        }
    }

    async fn resolve(
        &self,
        name: &str,
        policy: MissingQueuePolicy,
        op: &str,
    ) -> Result<Option<Arc<Topic>>, BrokerError> {
        if let Some(t) = self.lookup(name).await {
            return Ok(Some(t));
        }
        match policy {
            MissingQueuePolicy::Skip => Ok(None),
            MissingQueuePolicy::Warn => {
                log::warn!("{op}: no such queue '{name}', dropping");
                Ok(None)
            }
            MissingQueuePolicy::Create => Ok(Some(self.declare(name).await)),
            MissingQueuePolicy::Exception => Err(BrokerError::NoSuchQueue {
                name: name.to_string(),
            }),
            MissingQueuePolicy::Wait => Ok(Some(self.wait_for(name).await)),
        }
    }
}

/// Handle to a fan-in subscription over multiple queues.
///
/// Dropping the subscription cancels every outstanding per-queue wait.
pub struct Subscription {
    rx: mpsc::Receiver<Delivery>,
    token: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl Subscription {
    /// Yields the next delivery from any subscribed queue.
    ///
    /// Returns `None` once the subscription is cancelled or every backing
    /// queue is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Cancels every outstanding per-queue wait.
    ///
    /// Documented unsafe: an item already dequeued but not yet yielded may be
    /// dropped.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
        for w in &self.workers {
            w.abort();
        }
    }
}
