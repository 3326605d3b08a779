//! Error types used by the patchwork engine and task code.
//!
//! This module defines the full error taxonomy of the engine:
//!
//! - [`TaskControl`] — structured control signals driving task disposition
//!   (retry / fatal / drop / no-handler). These are expected outcomes, not bugs.
//! - [`AppError`] / [`ErrorKind`] — application failures raised by processors,
//!   routed through the executor's handler chain. `ErrorKind` is a closed enum
//!   with an explicit is-a relation ([`ErrorKind::parent`]) used for
//!   most-specific-first handler dispatch.
//! - [`RuntimeError`] — failures of the engine itself (terminate timeout, unit
//!   failure, finalization failure). These trigger fatal shutdown.
//! - [`SendError`] / [`ReceiveError`] / [`CommitError`] — client boundary
//!   errors with dedicated timeout variants, distinguishable from codec and
//!   transport failures so infrastructure retries are never misrouted into the
//!   task-retry machinery.
//! - [`TopicError`] / [`BrokerError`] / [`CodecError`] — transport-layer errors.
//!
//! All types provide `as_label()` (stable snake_case, for logs/metrics) and
//! most provide `as_message()` helpers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// # Control signals for task disposition.
///
/// Raised by middlewares, processors, and exception handlers to finalize how a
/// task leaves the executor. These are part of the protocol, not errors in the
/// engine: the finalization state machine consumes them directly and the
/// generic handler chain never "handles" them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskControl {
    /// Re-schedule the task: clone with a bumped attempt and republish.
    ///
    /// `countdown` delays visibility relative to now; `not_before` sets an
    /// absolute timestamp. When both are `None`, the executor falls back to
    /// its configured retry backoff policy (or immediate requeue).
    #[error("retry requested (countdown: {countdown:?}, not_before: {not_before:?})")]
    Retry {
        /// Relative delay before the clone becomes visible.
        countdown: Option<Duration>,
        /// Absolute visibility timestamp (wins over `countdown`).
        not_before: Option<DateTime<Utc>>,
    },

    /// Terminal, non-retryable disposition: record in the backoff log and stop.
    #[error("fatal: {}", reason.as_deref().unwrap_or("unspecified"))]
    Fatal {
        /// Human-readable reason carried into the backoff log.
        reason: Option<String>,
    },

    /// Silently discard the task.
    #[error("drop requested")]
    Drop,

    /// No processor is registered for the task's routing key.
    ///
    /// Raised internally by the executor before submission; resolved to the
    /// backoff channel (a missing route is neither droppable nor retryable).
    #[error("no processor registered for task type")]
    NoHandler,
}

impl TaskControl {
    /// Convenience constructor for a retry after a relative delay.
    pub fn retry_in(countdown: Duration) -> Self {
        TaskControl::Retry {
            countdown: Some(countdown),
            not_before: None,
        }
    }

    /// Convenience constructor for an immediate retry.
    pub fn retry_now() -> Self {
        TaskControl::Retry {
            countdown: None,
            not_before: None,
        }
    }

    /// Convenience constructor for a fatal disposition with a reason.
    pub fn fatal(reason: impl Into<String>) -> Self {
        TaskControl::Fatal {
            reason: Some(reason.into()),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskControl::Retry { .. } => "control_retry",
            TaskControl::Fatal { .. } => "control_fatal",
            TaskControl::Drop => "control_drop",
            TaskControl::NoHandler => "control_no_handler",
        }
    }
}

/// Closed classification of application errors.
///
/// Stands in for an open exception hierarchy: the is-a relation is explicit
/// ([`ErrorKind::parent`]) and handler dispatch walks [`ErrorKind::ancestry`]
/// most-specific-first.
///
/// ```text
/// Any
///  ├── Transient
///  │    ├── Timeout
///  │    └── Unavailable
///  ├── InvalidInput
///  ├── NotFound
///  └── Internal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Root of the hierarchy; a handler registered here sees every app error.
    Any,
    /// Recoverable by waiting: the operation may succeed if repeated later.
    Transient,
    /// An operation exceeded its deadline.
    Timeout,
    /// A collaborator is temporarily unreachable or overloaded.
    Unavailable,
    /// The task payload or arguments are malformed.
    InvalidInput,
    /// A referenced entity does not exist.
    NotFound,
    /// A defect inside the processor itself.
    Internal,
}

impl ErrorKind {
    /// Returns the parent kind, or `None` for the root.
    pub fn parent(self) -> Option<ErrorKind> {
        match self {
            ErrorKind::Any => None,
            ErrorKind::Timeout | ErrorKind::Unavailable => Some(ErrorKind::Transient),
            ErrorKind::Transient
            | ErrorKind::InvalidInput
            | ErrorKind::NotFound
            | ErrorKind::Internal => Some(ErrorKind::Any),
        }
    }

    /// Walks from this kind up to the root: `self`, parent, …, [`ErrorKind::Any`].
    pub fn ancestry(self) -> impl Iterator<Item = ErrorKind> {
        std::iter::successors(Some(self), |k| k.parent())
    }

    /// Returns true if `self` is `other` or a descendant of it.
    pub fn is_a(self, other: ErrorKind) -> bool {
        self.ancestry().any(|k| k == other)
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            ErrorKind::Any => "any",
            ErrorKind::Transient => "transient",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }
}

/// # An application failure raised by a processor.
///
/// Carries a closed [`ErrorKind`] used by the executor's handler chain to find
/// the most specific registered handler, plus a human-readable message.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}: {message}", kind.as_label())]
pub struct AppError {
    /// Classification used for handler dispatch.
    pub kind: ErrorKind,
    /// Human-readable failure message.
    pub message: String,
}

impl AppError {
    /// Creates an application error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for [`ErrorKind::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    /// Shorthand for [`ErrorKind::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    /// Shorthand for [`ErrorKind::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

/// # What a processor (or middleware short-circuit) produced for one task.
///
/// Either a control signal that finalizes disposition directly, or an
/// application error to be resolved through the handler chain.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// A structured disposition signal.
    #[error(transparent)]
    Control(#[from] TaskControl),

    /// An application failure routed through the handler chain.
    #[error(transparent)]
    App(#[from] AppError),
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Control(c) => c.as_label(),
            TaskError::App(_) => "app_error",
        }
    }
}

/// # Errors produced by the engine runtime itself.
///
/// These represent failures in the orchestration machinery, not in tasks.
/// Any of them reaching the executor triggers fatal shutdown (harakiri).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The main loop did not observe termination within the timeout and had to
    /// be aborted (documented unsafe: the in-flight fetch may be lost).
    #[error("terminate timeout {timeout:?} exceeded; main loop aborted")]
    TerminateTimeout {
        /// The configured terminate timeout.
        timeout: Duration,
    },

    /// The processing unit refused a submission or died unexpectedly.
    #[error("processing unit failure: {reason}")]
    UnitFailure {
        /// What the unit reported.
        reason: String,
    },

    /// A finalizer failed; the affected task may be left uncommitted.
    #[error("finalization failed: {reason}")]
    FinalizeFailure {
        /// What went wrong during finalization.
        reason: String,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::TerminateTimeout { .. } => "runtime_terminate_timeout",
            RuntimeError::UnitFailure { .. } => "runtime_unit_failure",
            RuntimeError::FinalizeFailure { .. } => "runtime_finalize_failure",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::TerminateTimeout { timeout } => {
                format!("terminate timeout exceeded after {timeout:?}")
            }
            RuntimeError::UnitFailure { reason } => format!("unit failure: {reason}"),
            RuntimeError::FinalizeFailure { reason } => format!("finalize failure: {reason}"),
        }
    }
}

/// # Errors raised by [`Topic`](crate::broker::Topic) operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicError {
    /// Non-suspending put on a full queue.
    #[error("topic is full")]
    Full,

    /// Non-suspending get on an empty queue.
    #[error("topic is empty")]
    Empty,

    /// The topic was closed; pending and future waits fail.
    #[error("topic is closed")]
    Closed,
}

/// # Errors raised by the broker layer.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BrokerError {
    /// The named queue does not exist (policy `Exception`).
    #[error("no such queue: {name}")]
    NoSuchQueue {
        /// The missing queue name.
        name: String,
    },

    /// The queue exists but is closed (broker shutting down).
    #[error("queue closed: {name}")]
    QueueClosed {
        /// The closed queue name.
        name: String,
    },

    /// The subscription resolved to zero queues (all skipped/missing).
    #[error("subscription has no queues")]
    EmptySubscription,
}

/// # Errors raised by a [`Codec`](crate::tasks::Codec).
#[derive(Error, Debug)]
pub enum CodecError {
    /// The task could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The wire bytes could not be deserialized into a task.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// # Errors raised by [`Publisher::send`](crate::client::Publisher::send).
///
/// The `Timeout` variant is distinct from codec and transport failures so a
/// caller can retry the infrastructure operation without routing it through the
/// task-retry machinery.
#[derive(Error, Debug)]
pub enum SendError {
    /// The caller-supplied timeout elapsed before the publish completed.
    #[error("send timed out after {timeout:?}")]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The task could not be serialized.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The broker rejected the publish.
    #[error(transparent)]
    Transport(#[from] BrokerError),
}

impl SendError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SendError::Timeout { .. } => "send_timeout",
            SendError::Codec(_) => "send_codec",
            SendError::Transport(_) => "send_transport",
        }
    }
}

/// # Errors raised by [`Subscriber::get`](crate::client::Subscriber::get) and
/// subscription management.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReceiveError {
    /// The caller-supplied timeout elapsed with no task available.
    #[error("receive timed out after {timeout:?}")]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The wire bytes could not be decoded into a task.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// All subscribed queues are gone; the subscription yields nothing further.
    #[error("subscription disconnected")]
    Disconnected,

    /// The backend does not support the requested operation.
    #[error("operation not supported: {op}")]
    Unsupported {
        /// The rejected operation name.
        op: &'static str,
    },
}

impl ReceiveError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ReceiveError::Timeout { .. } => "receive_timeout",
            ReceiveError::Codec(_) => "receive_codec",
            ReceiveError::Disconnected => "receive_disconnected",
            ReceiveError::Unsupported { .. } => "receive_unsupported",
        }
    }
}

/// # Errors raised by commit/rollback against the uncommitted set.
#[derive(Error, Debug)]
pub enum CommitError {
    /// The delivery is not in the uncommitted set (already committed, rolled
    /// back, or never fetched through this subscriber).
    #[error("delivery {delivery_id} is not pending")]
    NotPending {
        /// The delivery id that was not found.
        delivery_id: uuid::Uuid,
    },

    /// The backing queue rejected the redelivery.
    #[error(transparent)]
    Transport(#[from] BrokerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestry_walks_most_specific_first() {
        let chain: Vec<ErrorKind> = ErrorKind::Timeout.ancestry().collect();
        assert_eq!(
            chain,
            vec![ErrorKind::Timeout, ErrorKind::Transient, ErrorKind::Any]
        );
    }

    #[test]
    fn root_ancestry_is_only_itself() {
        let chain: Vec<ErrorKind> = ErrorKind::Any.ancestry().collect();
        assert_eq!(chain, vec![ErrorKind::Any]);
    }

    #[test]
    fn is_a_follows_parent_relation() {
        assert!(ErrorKind::Timeout.is_a(ErrorKind::Transient));
        assert!(ErrorKind::Timeout.is_a(ErrorKind::Any));
        assert!(!ErrorKind::Timeout.is_a(ErrorKind::InvalidInput));
        assert!(!ErrorKind::Transient.is_a(ErrorKind::Timeout));
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(TaskControl::Drop.as_label(), "control_drop");
        assert_eq!(TaskControl::retry_now().as_label(), "control_retry");
        assert_eq!(
            RuntimeError::TerminateTimeout {
                timeout: Duration::from_secs(5)
            }
            .as_label(),
            "runtime_terminate_timeout"
        );
        assert_eq!(
            SendError::Timeout {
                timeout: Duration::from_secs(1)
            }
            .as_label(),
            "send_timeout"
        );
    }
}
