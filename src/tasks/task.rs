//! # Task: a unit of work plus its routing/retry metadata.
//!
//! A [`Task`] is what producers publish and processors consume: a routing key
//! (`task_type`), a correlation id, an opaque payload, and [`TaskMetadata`]
//! describing where it goes and how it retries.
//!
//! ## Rules
//! - `meta.attempt` only increases (bumped by the executor's retry path).
//! - `meta.received` is stamped exactly once, when a subscriber converts wire
//!   bytes into a task; it is a local delivery stamp and never serialized.
//!
//! ## Example
//! ```rust
//! use patchwork::Task;
//!
//! let task = Task::new("echo", b"hi".to_vec())
//!     .with_queue("main")
//!     .with_max_retries(3);
//!
//! assert_eq!(task.task_type, "echo");
//! assert_eq!(task.meta.queue_name, "main");
//! assert_eq!(task.meta.attempt, 0);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Routing and retry metadata carried with every [`Task`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Destination queue name.
    pub queue_name: String,

    /// Delivery attempt counter, starting at 0. Only ever increases.
    pub attempt: u32,

    /// Optional per-task retry ceiling; the executor takes the minimum of this
    /// and its own configured ceiling.
    pub max_retries: Option<u32>,

    /// Delays visibility: the task must not execute before this timestamp.
    pub not_before: Option<DateTime<Utc>>,

    /// Hard TTL: the task is expired once this timestamp has passed.
    pub expires: Option<DateTime<Utc>>,

    /// Stamped by the subscriber at the moment wire bytes became this task.
    /// Local to one delivery; never serialized.
    #[serde(skip)]
    pub received: Option<DateTime<Utc>>,
}

impl Default for TaskMetadata {
    fn default() -> Self {
        Self {
            queue_name: String::new(),
            attempt: 0,
            max_retries: None,
            not_before: None,
            expires: None,
            received: None,
        }
    }
}

/// A mutable work item.
///
/// Created by a producer (via [`Task::new`] and the `with_*` builders) or by
/// the executor's retry path (as a clone with a bumped attempt count, see
/// [`FrozenTask::retry`](crate::tasks::FrozenTask::retry)).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Routing key matched against registered processors.
    pub task_type: String,

    /// Correlates every retry clone of the same logical work item.
    pub correlation_id: Uuid,

    /// Opaque payload; the engine never inspects it.
    pub payload: Vec<u8>,

    /// Routing and retry metadata.
    pub meta: TaskMetadata,
}

impl Task {
    /// Creates a task with a fresh correlation id and default metadata.
    pub fn new(task_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            task_type: task_type.into(),
            correlation_id: Uuid::new_v4(),
            payload,
            meta: TaskMetadata::default(),
        }
    }

    /// Sets the destination queue.
    pub fn with_queue(mut self, queue_name: impl Into<String>) -> Self {
        self.meta.queue_name = queue_name.into();
        self
    }

    /// Sets the per-task retry ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.meta.max_retries = Some(max_retries);
        self
    }

    /// Delays visibility until the given timestamp.
    pub fn with_not_before(mut self, not_before: DateTime<Utc>) -> Self {
        self.meta.not_before = Some(not_before);
        self
    }

    /// Sets the hard TTL.
    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.meta.expires = Some(expires);
        self
    }

    /// Overrides the correlation id (retry clones keep the original's).
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = id;
        self
    }
}
