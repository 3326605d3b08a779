//! # BackoffLog: the queryable channel for terminally failed tasks.
//!
//! Backed-off tasks (fatal dispositions, exhausted retries, unroutable task
//! types) are never silently discarded: the executor records each one here
//! with its reason, and the log doubles as an event observer so externally
//! published `TaskBackoff` events land in the same place.
//!
//! ```text
//! Executor::backoff_task(task, reason)
//!        ├──► BackoffLog::record(task, reason)     (direct, lossless)
//!        └──► Bus ──► observers (TaskBackoff event)
//! ```
//!
//! The direct record is what the "exactly once in the backoff log" guarantee
//! rests on; the bus path is best-effort observability.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::events::{Event, EventKind};
use crate::observers::Observe;
use crate::tasks::FrozenTask;

/// One terminally failed task with its reason and timestamp.
#[derive(Clone, Debug)]
pub struct BackoffEntry {
    /// The task as it was in flight.
    pub task: FrozenTask,
    /// Why the task was backed off.
    pub reason: String,
    /// When the entry was recorded.
    pub at: DateTime<Utc>,
}

/// Queryable log of backed-off tasks.
///
/// Thread-safe and cloneable - multiple references share the same entries.
#[derive(Clone, Default)]
pub struct BackoffLog {
    entries: Arc<Mutex<Vec<BackoffEntry>>>,
}

impl BackoffLog {
    /// Creates a new, empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a backed-off task. Called by the executor's backoff path.
    pub async fn record(&self, task: FrozenTask, reason: impl Into<String>) {
        let entry = BackoffEntry {
            task,
            reason: reason.into(),
            at: Utc::now(),
        };
        self.entries.lock().await.push(entry);
    }

    /// Returns a snapshot of all recorded entries, oldest first.
    pub async fn snapshot(&self) -> Vec<BackoffEntry> {
        self.entries.lock().await.clone()
    }

    /// Removes and returns all recorded entries, oldest first.
    pub async fn drain(&self) -> Vec<BackoffEntry> {
        std::mem::take(&mut *self.entries.lock().await)
    }

    /// Number of recorded entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// True when no entry has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl Observe for BackoffLog {
    /// Records externally published `TaskBackoff` events (e.g. from another
    /// executor sharing the bus). The local executor records directly and does
    /// not route its own backoffs through this path.
    async fn on_event(&self, event: &Event) {
        if event.kind != EventKind::TaskBackoff {
            return;
        }
        if let Some(task) = event.task.clone() {
            let reason = event
                .reason
                .as_deref()
                .unwrap_or("unspecified")
                .to_string();
            self.record(task, reason).await;
        }
    }

    fn name(&self) -> &'static str {
        "backoff_log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::Task;

    #[tokio::test]
    async fn record_and_snapshot() {
        let log = BackoffLog::new();
        let ft = FrozenTask::freeze(Task::new("echo", vec![]).with_queue("main"));
        log.record(ft.clone(), "bad input").await;

        let entries = log.snapshot().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, "bad input");
        assert_eq!(entries[0].task.delivery_id(), ft.delivery_id());
    }

    #[tokio::test]
    async fn drain_empties_the_log() {
        let log = BackoffLog::new();
        log.record(FrozenTask::freeze(Task::new("a", vec![])), "r1")
            .await;
        log.record(FrozenTask::freeze(Task::new("b", vec![])), "r2")
            .await;

        let drained = log.drain().await;
        assert_eq!(drained.len(), 2);
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn observes_backoff_events_only() {
        let log = BackoffLog::new();
        let ft = FrozenTask::freeze(Task::new("echo", vec![]).with_queue("main"));

        log.on_event(&Event::for_task(EventKind::TaskCompleted, &ft))
            .await;
        assert!(log.is_empty().await);

        log.on_event(
            &Event::for_task(EventKind::TaskBackoff, &ft)
                .with_task(ft.clone())
                .with_reason("expired"),
        )
        .await;
        assert_eq!(log.len().await, 1);
    }
}
