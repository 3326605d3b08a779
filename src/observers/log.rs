//! # Simple logging observer for debugging and demos.
//!
//! [`LogWriter`] forwards events to the `log` facade in a compact
//! human-readable format. Primarily useful for development and demos; for
//! structured logging or metrics, implement a custom [`Observe`].
//!
//! ## Output format
//! ```text
//! [fetched] queue=main type=echo attempt=0
//! [retry] queue=main type=echo attempt=1 delay_ms=200
//! [backoff] queue=main type=echo reason="bad input"
//! [completed] queue=main type=echo attempt=1
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::observers::Observe;

/// Log-facade observer.
///
/// Enabled via the `logging` feature. Not intended for production use.
pub struct LogWriter;

#[async_trait]
impl Observe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let queue = e.queue.as_deref().unwrap_or("-");
        let task_type = e.task_type.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::TaskFetched => {
                log::info!(
                    "[fetched] queue={queue} type={task_type} attempt={:?}",
                    e.attempt
                );
            }
            EventKind::TaskCompleted => {
                log::info!(
                    "[completed] queue={queue} type={task_type} attempt={:?}",
                    e.attempt
                );
            }
            EventKind::TaskRetryScheduled => {
                log::info!(
                    "[retry] queue={queue} type={task_type} attempt={:?} delay_ms={:?}",
                    e.attempt,
                    e.delay_ms
                );
            }
            EventKind::TaskBackoff => {
                log::warn!(
                    "[backoff] queue={queue} type={task_type} reason={:?}",
                    e.reason
                );
            }
            EventKind::TaskDropped => {
                log::info!("[dropped] queue={queue} type={task_type}");
            }
            EventKind::TaskCancelled => {
                log::warn!("[cancelled] queue={queue} type={task_type}");
            }
            EventKind::ExecutorStarted => log::info!("[executor-started]"),
            EventKind::ExecutorTerminating => log::info!("[executor-terminating]"),
            EventKind::ExecutorStopped => log::info!("[executor-stopped]"),
            EventKind::TerminateTimeout => {
                log::error!("[terminate-timeout] reason={:?}", e.reason);
            }
            EventKind::ObserverOverflow => {
                log::warn!("[observer-overflow] {:?}", e.reason);
            }
            EventKind::ObserverPanicked => {
                log::error!("[observer-panicked] {:?}", e.reason);
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
