//! # Middleware: pre-execution checks and finalizer wrapping.
//!
//! Middlewares run in registration order before a task reaches the processing
//! unit. Each middleware has two capabilities:
//!
//! - [`Middleware::inspect`] may short-circuit with a [`TaskControl`] signal —
//!   the task then goes straight to finalization without ever executing
//!   (e.g. "task expired" → Fatal, "not yet due" → Retry).
//! - [`Middleware::wrap`] may replace the finalizer with one that wraps the
//!   given one (chain-of-responsibility over the finalization step, not the
//!   execution step).
//!
//! ```text
//! handle(task)
//!   ├─► mw1.inspect ──Err(ctl)──► finalize(ctl)          (short-circuit)
//!   │        │Ok
//!   ├─► fin = mw1.wrap(fin)
//!   ├─► mw2.inspect / wrap ...
//!   ├─► unit.submit(processor)
//!   └─► fin(outcome)        // innermost = the executor's base finalizer
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;

use crate::error::{RuntimeError, TaskControl, TaskError};
use crate::tasks::FrozenTask;

/// How one task attempt left the processing stage.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The processor returned success.
    Completed,
    /// The processor (or a middleware short-circuit) produced an error.
    Failed(TaskError),
    /// Processing was cancelled; finalization logs and leaves the task
    /// uncommitted (redelivered by the backend after restart).
    Cancelled,
}

/// The finalization continuation for one task.
///
/// The executor builds the innermost finalizer (handler-chain resolution,
/// disposition, commit); middlewares may wrap it.
pub type Finalizer =
    Box<dyn FnOnce(TaskOutcome) -> BoxFuture<'static, Result<(), RuntimeError>> + Send + 'static>;

/// Builds a finalizer from a closure.
pub fn finalizer<F, Fut>(f: F) -> Finalizer
where
    F: FnOnce(TaskOutcome) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<(), RuntimeError>> + Send + 'static,
{
    Box::new(move |outcome| Box::pin(f(outcome)))
}

/// A stage of the pre-execution pipeline.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Pre-execution check; `Err` short-circuits straight to finalization with
    /// the given control signal.
    async fn inspect(&self, _task: &FrozenTask) -> Result<(), TaskControl> {
        Ok(())
    }

    /// Returns the finalizer to use downstream — either `finalizer` unchanged
    /// or a replacement wrapping it.
    async fn wrap(&self, _task: &FrozenTask, finalizer: Finalizer) -> Finalizer {
        finalizer
    }

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Rejects tasks whose hard TTL has passed.
///
/// An expired task short-circuits with `Fatal` and lands in the backoff log
/// without ever reaching the processing unit.
pub struct ExpiryMiddleware;

#[async_trait]
impl Middleware for ExpiryMiddleware {
    async fn inspect(&self, task: &FrozenTask) -> Result<(), TaskControl> {
        if task.is_expired(Utc::now()) {
            return Err(TaskControl::fatal("task expired"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "expiry"
    }
}

/// Defers tasks whose visibility delay has not elapsed.
///
/// A not-yet-due task short-circuits with `Retry { not_before }`, which
/// re-schedules it through the ordinary retry path. Each deferral bumps the
/// attempt counter; with the in-memory broker (which re-queues promptly) pair
/// this with a retry backoff policy and a `max_retries` sized for the longest
/// expected deferral.
pub struct NotBeforeMiddleware;

#[async_trait]
impl Middleware for NotBeforeMiddleware {
    async fn inspect(&self, task: &FrozenTask) -> Result<(), TaskControl> {
        if task.is_deferred(Utc::now()) {
            return Err(TaskControl::Retry {
                countdown: None,
                not_before: task.meta().not_before,
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "not_before"
    }
}

/// Function-backed wrapping middleware used in tests and simple audit hooks:
/// runs the given callback on the outcome before delegating to the wrapped
/// finalizer.
pub struct TapMiddleware<F> {
    tap: Arc<F>,
}

impl<F> TapMiddleware<F>
where
    F: Fn(&TaskOutcome) + Send + Sync + 'static,
{
    /// Creates a middleware observing every outcome passing through
    /// finalization.
    pub fn new(tap: F) -> Self {
        Self { tap: Arc::new(tap) }
    }
}

#[async_trait]
impl<F> Middleware for TapMiddleware<F>
where
    F: Fn(&TaskOutcome) + Send + Sync + 'static,
{
    async fn wrap(&self, _task: &FrozenTask, fin: Finalizer) -> Finalizer {
        let tap = Arc::clone(&self.tap);
        finalizer(move |outcome| {
            (*tap)(&outcome);
            async move { fin(outcome).await }
        })
    }

    fn name(&self) -> &'static str {
        "tap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::Task;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn expiry_short_circuits_expired_tasks_only() {
        let now = Utc::now();
        let live = FrozenTask::freeze(
            Task::new("echo", vec![]).with_expires(now + ChronoDuration::seconds(60)),
        );
        assert!(ExpiryMiddleware.inspect(&live).await.is_ok());

        let stale = FrozenTask::freeze(
            Task::new("echo", vec![]).with_expires(now - ChronoDuration::seconds(1)),
        );
        let ctl = ExpiryMiddleware.inspect(&stale).await.unwrap_err();
        assert!(matches!(ctl, TaskControl::Fatal { .. }));
    }

    #[tokio::test]
    async fn not_before_defers_with_the_original_timestamp() {
        let due = Utc::now() + ChronoDuration::seconds(60);
        let deferred = FrozenTask::freeze(Task::new("echo", vec![]).with_not_before(due));

        let ctl = NotBeforeMiddleware.inspect(&deferred).await.unwrap_err();
        match ctl {
            TaskControl::Retry {
                countdown,
                not_before,
            } => {
                assert!(countdown.is_none());
                assert_eq!(not_before, Some(due));
            }
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrapped_finalizers_run_outermost_first() {
        use std::sync::Mutex;

        let order = Arc::new(Mutex::new(Vec::new()));
        let task = FrozenTask::freeze(Task::new("echo", vec![]));

        let o = order.clone();
        let base = finalizer(move |_outcome| {
            o.lock().unwrap().push("base");
            async { Ok::<(), RuntimeError>(()) }
        });

        let o1 = order.clone();
        let inner_mw = TapMiddleware::new(move |_| o1.lock().unwrap().push("inner"));
        let o2 = order.clone();
        let outer_mw = TapMiddleware::new(move |_| o2.lock().unwrap().push("outer"));

        // registration order: inner first, outer second — the later
        // registration wraps the earlier one and fires first
        let fin = inner_mw.wrap(&task, base).await;
        let fin = outer_mw.wrap(&task, fin).await;
        fin(TaskOutcome::Completed).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["outer", "inner", "base"]);
    }
}
