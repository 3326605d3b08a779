//! # FrozenTask: the immutable in-flight view of a task.
//!
//! A [`FrozenTask`] is what [`Subscriber::get`](crate::client::Subscriber::get)
//! returns: a read-only snapshot of the decoded [`Task`] plus a unique
//! `delivery_id` identifying this delivery in the subscriber's uncommitted set.
//! Freezing prevents the executor and middlewares from mutating in-flight state
//! outside the retry path.
//!
//! ## Lifecycle
//! ```text
//! Subscriber::get() ──► FrozenTask ──► Executor::handle()
//!                                          ├─► commit()   (success path)
//!                                          └─► abandoned  (rollback / redelivery)
//! ```
//!
//! The only sanctioned mutation is [`FrozenTask::retry`], which produces a
//! *new* [`Task`] with `attempt + 1` and cleared per-delivery fields.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::tasks::{Task, TaskMetadata};

/// Immutable, cheaply clonable view of an in-flight task.
///
/// Clones share the underlying task snapshot; the `delivery_id` is the identity
/// used by `commit`/`rollback` against the uncommitted set.
#[derive(Clone, Debug)]
pub struct FrozenTask {
    inner: Arc<Task>,
    delivery_id: Uuid,
}

impl FrozenTask {
    /// Freezes a decoded task under a fresh delivery id.
    ///
    /// Called by subscribers after stamping `meta.received`; not something
    /// application code normally constructs.
    pub fn freeze(task: Task) -> Self {
        Self {
            inner: Arc::new(task),
            delivery_id: Uuid::new_v4(),
        }
    }

    /// Identity of this delivery in the uncommitted set.
    pub fn delivery_id(&self) -> Uuid {
        self.delivery_id
    }

    /// Routing key matched against registered processors.
    pub fn task_type(&self) -> &str {
        &self.inner.task_type
    }

    /// Correlates every retry clone of the same logical work item.
    pub fn correlation_id(&self) -> Uuid {
        self.inner.correlation_id
    }

    /// Opaque payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.inner.payload
    }

    /// Routing and retry metadata.
    pub fn meta(&self) -> &TaskMetadata {
        &self.inner.meta
    }

    /// True once the task's hard TTL has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.inner.meta.expires, Some(expires) if expires <= now)
    }

    /// True while the task's visibility delay has not yet elapsed.
    pub fn is_deferred(&self, now: DateTime<Utc>) -> bool {
        matches!(self.inner.meta.not_before, Some(due) if due > now)
    }

    /// Produces the retry clone: same routing key, correlation id, and payload,
    /// with `attempt + 1` and cleared `received`/`not_before`.
    ///
    /// The caller (the executor's retry path) stamps the new `not_before` and
    /// enforces the retry ceiling before republishing.
    pub fn retry(&self) -> Task {
        let mut next = (*self.inner).clone();
        next.meta.attempt += 1;
        next.meta.received = None;
        next.meta.not_before = None;
        next
    }

    /// Thaws into an owned mutable [`Task`] copy (for tests and adapters).
    pub fn to_task(&self) -> Task {
        (*self.inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn frozen(task: Task) -> FrozenTask {
        FrozenTask::freeze(task)
    }

    #[test]
    fn retry_bumps_attempt_and_clears_delivery_fields() {
        let mut task = Task::new("echo", b"hi".to_vec()).with_queue("main");
        task.meta.attempt = 2;
        task.meta.not_before = Some(Utc::now());
        task.meta.received = Some(Utc::now());
        let ft = frozen(task);

        let next = ft.retry();
        assert_eq!(next.meta.attempt, 3);
        assert!(next.meta.not_before.is_none());
        assert!(next.meta.received.is_none());
        assert_eq!(next.correlation_id, ft.correlation_id());
        assert_eq!(next.payload, ft.payload());
    }

    #[test]
    fn clones_share_delivery_identity() {
        let ft = frozen(Task::new("echo", vec![]));
        let copy = ft.clone();
        assert_eq!(ft.delivery_id(), copy.delivery_id());
    }

    #[test]
    fn distinct_deliveries_of_same_task_differ() {
        let task = Task::new("echo", vec![]);
        let a = frozen(task.clone());
        let b = frozen(task);
        assert_ne!(a.delivery_id(), b.delivery_id());
        assert_eq!(a.correlation_id(), b.correlation_id());
    }

    #[test]
    fn expiry_and_deferral_checks() {
        let now = Utc::now();
        let expired = frozen(
            Task::new("echo", vec![]).with_expires(now - ChronoDuration::seconds(1)),
        );
        assert!(expired.is_expired(now));
        assert!(!expired.is_deferred(now));

        let deferred = frozen(
            Task::new("echo", vec![]).with_not_before(now + ChronoDuration::seconds(60)),
        );
        assert!(deferred.is_deferred(now));
        assert!(!deferred.is_expired(now));
    }
}
