//! # Executor configuration.
//!
//! [`ExecutorConfig`] defines the executor's behavior: shutdown drain bound,
//! retry ceiling, event bus capacity, debug failure mode, and the optional
//! retry backoff policy. The recognized fields are fixed by the struct itself;
//! collaborators (unit, middlewares, processors, handlers, observers) are
//! wired through [`ExecutorBuilder`](crate::executor::ExecutorBuilder).
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use patchwork::{BackoffPolicy, ExecutorConfig};
//!
//! let mut cfg = ExecutorConfig::default();
//! cfg.terminate_timeout = Duration::from_secs(10);
//! cfg.max_retries = 5;
//! cfg.retry_backoff = Some(BackoffPolicy::default());
//!
//! assert_eq!(cfg.max_retries, 5);
//! ```

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Configuration for an [`Executor`](crate::executor::Executor).
#[derive(Clone, Copy, Debug)]
pub struct ExecutorConfig {
    /// Bound for each graceful-shutdown stage: waiting for the main loop,
    /// and draining the processing unit.
    pub terminate_timeout: Duration,

    /// Hard retry ceiling. A task's own `max_retries` only lowers it (the
    /// executor takes the minimum of the two).
    pub max_retries: u32,

    /// Capacity of the event bus channel.
    pub bus_capacity: usize,

    /// Fail loudly instead of shutting down: internal errors panic
    /// immediately rather than scheduling termination.
    pub debug: bool,

    /// Visibility delay for retries that carry no explicit countdown or
    /// timestamp. `None` requeues immediately (the default retry policy).
    pub retry_backoff: Option<BackoffPolicy>,
}

impl Default for ExecutorConfig {
    /// Provides a default configuration:
    /// - `terminate_timeout = 30s`
    /// - `max_retries = 3`
    /// - `bus_capacity = 1024`
    /// - `debug = false`
    /// - `retry_backoff = None` (immediate requeue)
    fn default() -> Self {
        Self {
            terminate_timeout: Duration::from_secs(30),
            max_retries: 3,
            bus_capacity: 1024,
            debug: false,
            retry_backoff: None,
        }
    }
}
