//! # Executor: the task-processing orchestrator.
//!
//! The [`Executor`] pulls tasks from a [`Subscriber`], runs each through the
//! middleware pipeline, routes it to a registered processor on the
//! [`ProcessingUnit`], and resolves the outcome through the exception-handler
//! chain into a disposition (commit / retry / backoff / drop).
//!
//! ## Architecture
//! ```text
//! Subscriber::get() ◄──┐
//!        │             │ re-armed immediately after every fetch
//!        ▼             │
//!   main_loop ─────────┘        terminate token ──► exit
//!        │ dispatch
//!        ▼
//!   handle(task)  (one spawned future per task, tracked in a JoinSet)
//!        ├─► middlewares: inspect (may short-circuit) / wrap finalizer
//!        ├─► route task_type ──► unit.submit(processor) ──► join
//!        └─► finalizer(outcome)
//!               ├─ Completed ──► commit
//!               ├─ App error ──► handler chain ──► Retry / Fatal / Drop
//!               │                  ├─ Retry  ─► clone, bump attempt, republish
//!               │                  │            (over the ceiling → backoff)
//!               │                  ├─ Fatal  ─► backoff log
//!               │                  └─ Drop   ─► discard
//!               ├─ Cancelled ──► log, NO commit (redelivered after restart)
//!               └─ commit exactly once afterwards (except the cancelled path)
//! ```
//!
//! ## Shutdown
//! - **Graceful** ([`Component::terminate`]): cancel the termination token;
//!   wait up to `terminate_timeout` for the main loop, aborting it as the
//!   documented-unsafe last resort; drain the unit (same bound) and tear it
//!   down; then wait for every outstanding finalization so no task is left
//!   uncommitted on a clean stop.
//! - **Fatal** (harakiri): a dead unit, a main-loop fetch error, or a failing
//!   finalizer schedules `terminate()`; with `debug = true` it panics
//!   immediately instead. Uncommitted tasks are recovered via redelivery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::client::{Publisher, Subscriber};
use crate::component::{Component, Lifecycle};
use crate::config::ExecutorConfig;
use crate::error::{ReceiveError, RuntimeError, TaskControl, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::executor::handlers::HandlerChain;
use crate::executor::middleware::{Finalizer, Middleware, TaskOutcome};
use crate::executor::processor::Processor;
use crate::executor::unit::{ProcessJob, ProcessingUnit};
use crate::observers::{BackoffLog, ObserverSet};
use crate::tasks::FrozenTask;

use async_trait::async_trait;

/// The task-processing orchestrator. Built via
/// [`ExecutorBuilder`](crate::executor::ExecutorBuilder); driven through the
/// [`Component`] lifecycle (`run()` / `terminate()`).
///
/// An executor instance is single-use: once terminated it does not restart.
/// Build a fresh one to resume processing.
pub struct Executor {
    lifecycle: Lifecycle,
    pub(crate) inner: Arc<Inner>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    observer_set: Mutex<Option<ObserverSet>>,
    listener_handle: Mutex<Option<JoinHandle<()>>>,
    observers_stop: CancellationToken,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").finish_non_exhaustive()
    }
}

/// Shared state reachable from the main loop and every per-task future.
pub(crate) struct Inner {
    pub(crate) cfg: ExecutorConfig,
    pub(crate) subscriber: Arc<dyn Subscriber>,
    pub(crate) publisher: Arc<dyn Publisher>,
    pub(crate) unit: Arc<dyn ProcessingUnit>,
    pub(crate) middlewares: Vec<Arc<dyn Middleware>>,
    pub(crate) processors: HashMap<String, Arc<dyn Processor>>,
    pub(crate) handlers: HandlerChain,
    pub(crate) bus: Bus,
    pub(crate) backoff_log: BackoffLog,
    pub(crate) terminate: CancellationToken,
    pub(crate) in_flight: AtomicUsize,
    pub(crate) tasks: Mutex<JoinSet<()>>,
    pub(crate) exec: Weak<Executor>,
}

impl Executor {
    pub(crate) fn assemble(
        inner: Arc<Inner>,
        observer_set: ObserverSet,
    ) -> Executor {
        Executor {
            lifecycle: Lifecycle::new(),
            inner,
            loop_handle: Mutex::new(None),
            observer_set: Mutex::new(Some(observer_set)),
            listener_handle: Mutex::new(None),
            observers_stop: CancellationToken::new(),
        }
    }

    /// True while any fetched task has not finished finalizing.
    pub fn busy(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst) > 0
    }

    /// The queryable log of terminally failed tasks.
    pub fn backoff_log(&self) -> &BackoffLog {
        &self.inner.backoff_log
    }

    /// The event bus; subscribe for ad-hoc inspection beyond the observer set.
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Subscribes to the bus and fans events out to the observer set.
    fn spawn_observer_listener(&self) {
        let Some(set) = self
            .observer_set
            .lock()
            .expect("observer slot poisoned")
            .take()
        else {
            return;
        };
        let mut rx = self.inner.bus.subscribe();
        let stop = self.observers_stop.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => {
                        // flush what is already buffered before exiting
                        while let Ok(ev) = rx.try_recv() {
                            set.emit_arc(Arc::new(ev));
                        }
                        break;
                    }
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit_arc(Arc::new(ev)),
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("observer listener lagged; skipped {n} events");
                        }
                    }
                }
            }
            set.shutdown().await;
        });
        *self
            .listener_handle
            .lock()
            .expect("listener slot poisoned") = Some(handle);
    }
}

#[async_trait]
impl Component for Executor {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    async fn on_start(&self) -> Result<bool, RuntimeError> {
        self.spawn_observer_listener();

        let handle = tokio::spawn(Inner::main_loop(self.inner.clone()));
        *self.loop_handle.lock().expect("loop slot poisoned") = Some(handle);

        self.inner.bus.publish(Event::now(EventKind::ExecutorStarted));
        Ok(true)
    }

    async fn on_stop(&self) -> Result<(), RuntimeError> {
        let timeout = self.inner.cfg.terminate_timeout;
        self.inner
            .bus
            .publish(Event::now(EventKind::ExecutorTerminating));
        self.inner.terminate.cancel();

        // stage 1: let the main loop observe the token and exit; abort it as
        // the documented-unsafe last resort
        let mut aborted = false;
        let handle = self.loop_handle.lock().expect("loop slot poisoned").take();
        if let Some(mut h) = handle {
            if tokio::time::timeout(timeout, &mut h).await.is_err() {
                log::warn!(
                    "main loop did not observe termination within {timeout:?}; \
                     aborting (the in-flight fetch may be lost)"
                );
                self.inner.bus.publish(
                    Event::now(EventKind::TerminateTimeout).with_reason("main loop aborted"),
                );
                h.abort();
                let _ = tokio::time::timeout(timeout, h).await;
                aborted = true;
            }
        }

        // stage 2: drain the unit (bounded), then tear it down; teardown
        // cancels whatever is still running
        if !self.inner.unit.drain(timeout).await {
            log::warn!("processing unit still busy after {timeout:?}; cancelling remaining jobs");
        }
        self.inner.unit.shutdown().await;

        // stage 3: every outstanding finalization must finish so that no task
        // is left uncommitted on a clean shutdown
        let mut tasks = std::mem::take(&mut *self.inner.tasks.lock().expect("task set poisoned"));
        while tasks.join_next().await.is_some() {}

        self.inner.bus.publish(Event::now(EventKind::ExecutorStopped));
        self.observers_stop.cancel();
        let listener = self
            .listener_handle
            .lock()
            .expect("listener slot poisoned")
            .take();
        if let Some(h) = listener {
            let _ = h.await;
        }

        if aborted {
            return Err(RuntimeError::TerminateTimeout { timeout });
        }
        Ok(())
    }
}

impl Inner {
    /// Main fetch loop: races the subscriber's next task against the
    /// termination token. Termination drops the pending fetch; a successful
    /// fetch dispatches and immediately re-arms, so there is always at least
    /// one outstanding fetch while the loop runs.
    async fn main_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.terminate.cancelled() => break,
                fetched = self.subscriber.get(None) => match fetched {
                    Ok(task) => self.dispatch(task),
                    Err(ReceiveError::Disconnected) => {
                        log::error!("subscriber disconnected; initiating fatal shutdown");
                        self.harakiri("subscriber disconnected");
                        break;
                    }
                    Err(e) => {
                        log::error!("fetch failed: {e}; initiating fatal shutdown");
                        self.harakiri(&format!("fetch failed: {e}"));
                        break;
                    }
                }
            }
        }
    }

    /// Spawns `handle()` for one fetched task and tracks it in the in-flight
    /// set.
    fn dispatch(self: &Arc<Self>, task: FrozenTask) {
        self.bus.publish(Event::for_task(EventKind::TaskFetched, &task));
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let me = self.clone();
        self.tasks
            .lock()
            .expect("task set poisoned")
            .spawn(async move {
                me.clone().handle(task).await;
                me.in_flight.fetch_sub(1, Ordering::SeqCst);
            });
    }

    /// Runs one task through middleware, execution, and finalization.
    async fn handle(self: Arc<Self>, task: FrozenTask) {
        let mut fin = self.base_finalizer(task.clone());

        // middleware pipeline: a control signal skips execution entirely
        let mut short_circuit: Option<TaskControl> = None;
        for mw in &self.middlewares {
            match mw.inspect(&task).await {
                Ok(()) => fin = mw.wrap(&task, fin).await,
                Err(ctl) => {
                    log::debug!(
                        "middleware '{}' short-circuited task {} ({})",
                        mw.name(),
                        task.correlation_id(),
                        ctl.as_label()
                    );
                    short_circuit = Some(ctl);
                    break;
                }
            }
        }

        let outcome = match short_circuit {
            Some(ctl) => TaskOutcome::Failed(TaskError::Control(ctl)),
            None => self.execute(&task).await,
        };

        if let Err(e) = fin(outcome).await {
            log::error!("finalizer failed: {}", e.as_message());
            self.harakiri(&format!("finalizer failed: {e}"));
        }
    }

    /// Routes the task to its processor and runs it on the unit.
    async fn execute(self: &Arc<Self>, task: &FrozenTask) -> TaskOutcome {
        let Some(processor) = self.processors.get(task.task_type()).cloned() else {
            return TaskOutcome::Failed(TaskError::Control(TaskControl::NoHandler));
        };

        let job: ProcessJob = {
            let task = task.clone();
            Box::pin(async move { processor.process(task).await })
        };

        // submission suspends while the unit is saturated
        let handle = match self.unit.submit(job).await {
            Ok(h) => h,
            Err(e) => {
                log::error!("unit rejected submission: {e}");
                self.harakiri(&format!("unit rejected submission: {e}"));
                return TaskOutcome::Cancelled;
            }
        };

        match handle.join().await {
            Some(Ok(())) => TaskOutcome::Completed,
            Some(Err(e)) => TaskOutcome::Failed(e),
            None => TaskOutcome::Cancelled,
        }
    }

    /// Builds the innermost finalizer: handler resolution, disposition, and
    /// the exactly-once commit.
    fn base_finalizer(self: &Arc<Self>, task: FrozenTask) -> Finalizer {
        let me = self.clone();
        Box::new(move |outcome| Box::pin(async move { me.finalize(task, outcome).await }))
    }

    async fn finalize(
        self: Arc<Self>,
        task: FrozenTask,
        outcome: TaskOutcome,
    ) -> Result<(), RuntimeError> {
        let disposition = match outcome {
            TaskOutcome::Cancelled => {
                // cancellation is handled upstream: no disposition, no commit;
                // the backend redelivers after restart
                log::warn!(
                    "processing cancelled for task {}; left uncommitted",
                    task.correlation_id()
                );
                self.bus
                    .publish(Event::for_task(EventKind::TaskCancelled, &task));
                return Ok(());
            }
            TaskOutcome::Completed => None,
            TaskOutcome::Failed(TaskError::Control(ctl)) => Some(ctl),
            TaskOutcome::Failed(TaskError::App(err)) => {
                Some(self.handlers.resolve(&task, &err).await)
            }
        };

        let applied = match disposition {
            None => {
                self.bus
                    .publish(Event::for_task(EventKind::TaskCompleted, &task));
                Ok(())
            }
            Some(ctl) => self.apply_control(&task, ctl).await,
        };

        // commit exactly once, whatever the disposition did
        let committed = self.commit_task(&task).await;
        applied?;
        committed
    }

    async fn apply_control(&self, task: &FrozenTask, ctl: TaskControl) -> Result<(), RuntimeError> {
        match ctl {
            TaskControl::Retry {
                countdown,
                not_before,
            } => self.schedule_retry(task, countdown, not_before).await,
            TaskControl::Fatal { reason } => {
                self.backoff_task(task, reason.unwrap_or_else(|| "fatal".to_string()))
                    .await;
                Ok(())
            }
            TaskControl::Drop => {
                log::debug!("task {} dropped", task.correlation_id());
                self.bus
                    .publish(Event::for_task(EventKind::TaskDropped, task));
                Ok(())
            }
            TaskControl::NoHandler => {
                self.backoff_task(
                    task,
                    format!("no processor registered for '{}'", task.task_type()),
                )
                .await;
                Ok(())
            }
        }
    }

    /// Clones the task with a bumped attempt and republishes it; over the
    /// retry ceiling the task is routed to backoff instead.
    async fn schedule_retry(
        &self,
        task: &FrozenTask,
        countdown: Option<std::time::Duration>,
        not_before: Option<chrono::DateTime<Utc>>,
    ) -> Result<(), RuntimeError> {
        let mut next = task.retry();

        let ceiling = match next.meta.max_retries {
            Some(own) => own.min(self.cfg.max_retries),
            None => self.cfg.max_retries,
        };
        if next.meta.attempt > ceiling {
            self.backoff_task(
                task,
                format!(
                    "max retries exceeded (attempt {} > ceiling {})",
                    next.meta.attempt, ceiling
                ),
            )
            .await;
            return Ok(());
        }

        let now = Utc::now();
        let (visible_at, delay) = if let Some(at) = not_before {
            (Some(at), (at - now).to_std().unwrap_or_default())
        } else if let Some(d) = countdown {
            let at = now + chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero());
            (Some(at), d)
        } else if let Some(policy) = self.cfg.retry_backoff {
            let d = policy.delay_for(task.meta().attempt);
            let at = now + chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero());
            (Some(at), d)
        } else {
            // default retry policy: immediate requeue, no backoff
            (None, std::time::Duration::ZERO)
        };
        next.meta.not_before = visible_at;

        self.bus.publish(
            Event::for_task(EventKind::TaskRetryScheduled, task)
                .with_attempt(next.meta.attempt)
                .with_delay(delay),
        );

        if let Err(e) = self.publisher.send(&next, None).await {
            // a clone that cannot be republished must not vanish silently
            log::error!("retry publish failed: {e}; routing to backoff");
            self.backoff_task(task, format!("retry publish failed: {e}"))
                .await;
        }
        Ok(())
    }

    /// Terminal, non-retryable disposition: record and report, never requeue.
    async fn backoff_task(&self, task: &FrozenTask, reason: String) {
        log::error!("task {} backed off: {reason}", task.correlation_id());
        self.backoff_log.record(task.clone(), reason.clone()).await;
        self.bus.publish(
            Event::for_task(EventKind::TaskBackoff, task)
                .with_task(task.clone())
                .with_reason(reason),
        );
    }

    async fn commit_task(&self, task: &FrozenTask) -> Result<(), RuntimeError> {
        self.subscriber
            .commit(task)
            .await
            .map_err(|e| RuntimeError::FinalizeFailure {
                reason: format!("commit failed: {e}"),
            })
    }

    /// Fatal shutdown. With `debug` set, fails loudly right here; otherwise
    /// schedules a graceful `terminate()` — which drains what it can, but
    /// unlike a requested shutdown gives no guarantee that every in-flight
    /// task commits.
    pub(crate) fn harakiri(&self, reason: &str) {
        log::error!("fatal engine failure: {reason}");
        if self.cfg.debug {
            panic!("executor harakiri: {reason}");
        }
        if let Some(exec) = self.exec.upgrade() {
            tokio::spawn(async move {
                if let Err(e) = exec.terminate().await {
                    log::error!("harakiri termination failed: {e}");
                }
            });
        }
    }
}
