//! # Publisher: sends tasks into named queues.
//!
//! [`Publisher`] is the producing half of the backend boundary: it serializes
//! a [`Task`] and hands the bytes to the transport. [`LocalPublisher`] is the
//! in-process implementation over [`LocalBroker`]; a distributed backend
//! implements the same trait.
//!
//! ## Timeouts
//! `send` may be bounded by a caller-supplied timeout (useful when the
//! destination queue is full and backpressure would suspend the publish).
//! A timeout surfaces as [`SendError::Timeout`], distinguishable from
//! [`SendError::Codec`] and [`SendError::Transport`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::broker::LocalBroker;
use crate::error::SendError;
use crate::tasks::{Codec, Task};

/// Producing half of the backend boundary.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Serializes the task and publishes it to `task.meta.queue_name`.
    ///
    /// With `timeout = Some(d)`, fails with [`SendError::Timeout`] if the
    /// transport does not accept the bytes within `d` (e.g. sustained
    /// backpressure on a full queue).
    async fn send(&self, task: &Task, timeout: Option<Duration>) -> Result<(), SendError>;
}

/// In-process publisher over a [`LocalBroker`].
pub struct LocalPublisher {
    broker: Arc<LocalBroker>,
    codec: Arc<dyn Codec>,
}

impl LocalPublisher {
    /// Creates a publisher over the given broker and codec.
    pub fn new(broker: Arc<LocalBroker>, codec: Arc<dyn Codec>) -> Self {
        Self { broker, codec }
    }
}

#[async_trait]
impl Publisher for LocalPublisher {
    async fn send(&self, task: &Task, timeout: Option<Duration>) -> Result<(), SendError> {
        let bytes = self.codec.encode(task)?;
        let queue = task.meta.queue_name.as_str();

        match timeout {
            None => self.broker.publish(bytes, queue).await.map_err(Into::into),
            Some(d) => match tokio::time::timeout(d, self.broker.publish(bytes, queue)).await {
                Ok(res) => res.map_err(Into::into),
                Err(_elapsed) => Err(SendError::Timeout { timeout: d }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerConfig, MissingQueuePolicy};
    use crate::tasks::JsonCodec;

    fn publisher(cfg: BrokerConfig) -> (Arc<LocalBroker>, LocalPublisher) {
        let broker = LocalBroker::new(cfg);
        let publisher = LocalPublisher::new(broker.clone(), Arc::new(JsonCodec));
        (broker, publisher)
    }

    #[tokio::test]
    async fn send_encodes_and_lands_in_the_queue() {
        let (broker, publisher) = publisher(BrokerConfig::default());
        let task = Task::new("echo", b"hi".to_vec()).with_queue("main");

        publisher.send(&task, None).await.unwrap();

        let topic = broker.lookup("main").await.expect("queue created");
        let bytes = topic.get().await.unwrap();
        let decoded = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(decoded.payload, b"hi");
        assert_eq!(decoded.correlation_id, task.correlation_id);
    }

    #[tokio::test]
    async fn send_into_full_queue_times_out_with_dedicated_error() {
        let (broker, publisher) = publisher(BrokerConfig {
            queue_capacity: 1,
            ..BrokerConfig::default()
        });
        broker.declare("main").await;
        let task = Task::new("echo", b"x".to_vec()).with_queue("main");

        publisher.send(&task, None).await.unwrap();
        let err = publisher
            .send(&task, Some(Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Timeout { .. }));
    }

    #[tokio::test]
    async fn send_respects_exception_policy() {
        let (_broker, publisher) = publisher(BrokerConfig {
            publish_policy: MissingQueuePolicy::Exception,
            ..BrokerConfig::default()
        });
        let task = Task::new("echo", vec![]).with_queue("ghost");
        let err = publisher.send(&task, None).await.unwrap_err();
        assert!(matches!(err, SendError::Transport(_)));
    }
}
