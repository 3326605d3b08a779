//! # Processing unit: the collaborator that actually runs task payloads.
//!
//! The executor never executes processors inline; it submits them to a
//! [`ProcessingUnit`] and finalizes on the returned [`UnitHandle`]. The unit is
//! an external collaborator behind a trait — [`SpawnUnit`] is the bundled
//! tokio-based implementation with bounded concurrency; a thread pool or
//! remote worker fleet implements the same seam.
//!
//! ## Contract
//! - `submit` may **suspend** while the unit is saturated (bounded capacity);
//!   it fails only when the unit is shut down.
//! - `drain(timeout)` waits for the busy state to clear, bounded.
//! - `shutdown` closes intake, cancels whatever is still running, and waits
//!   for the workers to settle. A cancelled job resolves its handle to `None`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{oneshot, watch, Semaphore};
use tokio::task::AbortHandle;
use tokio_util::task::TaskTracker;

use crate::error::TaskError;

/// A boxed processing future: one task attempt, ready to run.
pub type ProcessJob = BoxFuture<'static, Result<(), TaskError>>;

/// Errors produced by a processing unit.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitError {
    /// The unit is shut down and accepts no further submissions.
    #[error("processing unit is closed")]
    Closed,
}

/// Completion handle for one submitted job.
pub struct UnitHandle {
    rx: oneshot::Receiver<Result<(), TaskError>>,
}

impl UnitHandle {
    /// Resolves when the job completes.
    ///
    /// Returns `None` when the job was cancelled (unit teardown) or died
    /// without producing a result (processor panic) — the caller treats both
    /// as "handled upstream" and leaves the task uncommitted.
    pub async fn join(self) -> Option<Result<(), TaskError>> {
        self.rx.await.ok()
    }
}

/// The worker-pool seam consumed by the executor.
#[async_trait]
pub trait ProcessingUnit: Send + Sync {
    /// Submits a job; suspends while the unit is saturated.
    async fn submit(&self, job: ProcessJob) -> Result<UnitHandle, UnitError>;

    /// True while any submitted job is still running.
    fn is_busy(&self) -> bool;

    /// Waits up to `timeout` for the busy state to clear; true on success.
    async fn drain(&self, timeout: Duration) -> bool;

    /// Closes intake, cancels still-running jobs, and waits for workers to
    /// settle. Cancelled jobs resolve their handles to `None`.
    async fn shutdown(&self);
}

/// Decrements the active count even when the job is aborted mid-flight.
struct ActiveGuard {
    tx: watch::Sender<usize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.tx.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Tokio-based processing unit with bounded concurrency.
///
/// Each submission acquires one of `capacity` permits (suspending when all are
/// taken) and runs on its own spawned task.
pub struct SpawnUnit {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    active: watch::Sender<usize>,
    aborts: Mutex<Vec<AbortHandle>>,
}

impl SpawnUnit {
    /// Creates a unit running at most `capacity` jobs concurrently
    /// (clamped to a minimum of 1).
    pub fn new(capacity: usize) -> Self {
        let (active, _) = watch::channel(0usize);
        Self {
            permits: Arc::new(Semaphore::new(capacity.max(1))),
            tracker: TaskTracker::new(),
            active,
            aborts: Mutex::new(Vec::new()),
        }
    }
}

impl Default for SpawnUnit {
    /// A unit with capacity 16.
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl ProcessingUnit for SpawnUnit {
    async fn submit(&self, job: ProcessJob) -> Result<UnitHandle, UnitError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| UnitError::Closed)?;
        if self.tracker.is_closed() {
            return Err(UnitError::Closed);
        }

        let (tx, rx) = oneshot::channel();
        self.active.send_modify(|n| *n += 1);
        let guard = ActiveGuard {
            tx: self.active.clone(),
        };

        let handle = self.tracker.spawn(async move {
            let res = job.await;
            drop(permit);
            drop(guard);
            let _ = tx.send(res);
        });

        let mut aborts = self.aborts.lock().expect("unit aborts poisoned");
        aborts.retain(|h| !h.is_finished());
        aborts.push(handle.abort_handle());
        Ok(UnitHandle { rx })
    }

    fn is_busy(&self) -> bool {
        *self.active.borrow() > 0
    }

    async fn drain(&self, timeout: Duration) -> bool {
        let mut rx = self.active.subscribe();
        let result = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0)).await,
            Ok(Ok(_))
        );
        result
    }

    async fn shutdown(&self) {
        self.permits.close();
        self.tracker.close();
        let handles: Vec<AbortHandle> = {
            let mut aborts = self.aborts.lock().expect("unit aborts poisoned");
            aborts.drain(..).collect()
        };
        for h in handles {
            h.abort();
        }
        self.tracker.wait().await;
    }
}
