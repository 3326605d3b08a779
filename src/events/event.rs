//! # Engine events emitted by the executor and its collaborators.
//!
//! [`EventKind`] classifies events across three categories:
//! - **Task lifecycle**: fetched, completed, retry-scheduled, backoff, dropped,
//!   cancelled
//! - **Executor lifecycle**: started, terminating, stopped, terminate-timeout
//! - **Observer plumbing**: overflow and panic reports from observer workers
//!
//! The [`Event`] struct carries optional metadata (queue, routing key,
//! correlation id, attempt, reason, delay) plus a wall-clock timestamp and a
//! globally monotonic sequence number for ordering.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::tasks::FrozenTask;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of engine events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Task lifecycle events ===
    /// A task was fetched from the subscriber and dispatched to `handle()`.
    ///
    /// Sets: `queue`, `task_type`, `correlation_id`, `attempt`.
    TaskFetched,

    /// A task finished successfully and was committed.
    ///
    /// Sets: `queue`, `task_type`, `correlation_id`, `attempt`.
    TaskCompleted,

    /// A retry clone was published (attempt bumped, visibility delayed).
    ///
    /// Sets: `queue`, `task_type`, `correlation_id`, `attempt` (of the clone),
    /// `delay_ms`.
    TaskRetryScheduled,

    /// A task reached the backoff channel: terminal, never rescheduled.
    ///
    /// Sets: `queue`, `task_type`, `correlation_id`, `attempt`, `reason`,
    /// `task` (the full frozen task for inspection).
    TaskBackoff,

    /// A task was silently discarded by a `Drop` disposition.
    ///
    /// Sets: `queue`, `task_type`, `correlation_id`, `attempt`.
    TaskDropped,

    /// Processing of a task was cancelled; the task stays uncommitted.
    ///
    /// Sets: `queue`, `task_type`, `correlation_id`, `attempt`.
    TaskCancelled,

    // === Executor lifecycle events ===
    /// The executor's main loop is up and fetching.
    ExecutorStarted,

    /// Termination was requested; the executor is draining.
    ExecutorTerminating,

    /// The executor stopped cleanly.
    ExecutorStopped,

    /// The main loop did not exit within the terminate timeout and was
    /// aborted (documented unsafe; the in-flight fetch may be lost).
    ///
    /// Sets: `reason`.
    TerminateTimeout,

    // === Observer plumbing ===
    /// An observer's queue overflowed and an event was dropped for it.
    ///
    /// Sets: `reason` (observer and cause).
    ObserverOverflow,

    /// An observer panicked while handling an event.
    ///
    /// Sets: `reason` (observer and panic info).
    ObserverPanicked,
}

/// Engine event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Queue the task was received on (or destined for).
    pub queue: Option<Arc<str>>,
    /// Routing key of the task, if applicable.
    pub task_type: Option<Arc<str>>,
    /// Correlation id of the task, if applicable.
    pub correlation_id: Option<Uuid>,
    /// Attempt count the event refers to.
    pub attempt: Option<u32>,
    /// Human-readable reason (errors, overflow details, backoff cause).
    pub reason: Option<Arc<str>>,
    /// Retry visibility delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// The full frozen task, carried on backoff events for inspection.
    pub task: Option<FrozenTask>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            queue: None,
            task_type: None,
            correlation_id: None,
            attempt: None,
            reason: None,
            delay_ms: None,
            task: None,
        }
    }

    /// Creates an event carrying the identity fields of the given task.
    pub fn for_task(kind: EventKind, task: &FrozenTask) -> Self {
        Self::now(kind)
            .with_queue(task.meta().queue_name.as_str())
            .with_task_type(task.task_type())
            .with_correlation_id(task.correlation_id())
            .with_attempt(task.meta().attempt)
    }

    /// Attaches a queue name.
    #[inline]
    pub fn with_queue(mut self, queue: impl Into<Arc<str>>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Attaches a routing key.
    #[inline]
    pub fn with_task_type(mut self, task_type: impl Into<Arc<str>>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    /// Attaches a correlation id.
    #[inline]
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a retry visibility delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        let ms = delay.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches the full frozen task (backoff events).
    #[inline]
    pub fn with_task(mut self, task: FrozenTask) -> Self {
        self.task = Some(task);
        self
    }

    /// Creates an observer overflow event.
    #[inline]
    pub fn observer_overflow(observer: &'static str, cause: &'static str) -> Self {
        Event::now(EventKind::ObserverOverflow)
            .with_reason(format!("observer={observer} cause={cause}"))
    }

    /// Creates an observer panic event.
    #[inline]
    pub fn observer_panicked(observer: &'static str, info: String) -> Self {
        Event::now(EventKind::ObserverPanicked)
            .with_reason(format!("observer={observer} panic={info}"))
    }
}
