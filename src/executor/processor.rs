//! # Processor: the per-task-type execution callback.
//!
//! The executor routes each fetched task by its `task_type` to a registered
//! [`Processor`]. A processor reports its outcome as `Result<(), TaskError>`:
//! `Ok` commits, an [`AppError`](crate::error::AppError) goes through the
//! handler chain, and a [`TaskControl`](crate::error::TaskControl) finalizes
//! disposition directly.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::tasks::FrozenTask;

/// Shared handle to a processor.
pub type ProcessorRef = Arc<dyn Processor>;

/// # Executes one task attempt.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use patchwork::{AppError, FrozenTask, Processor, TaskError};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Processor for Echo {
///     fn name(&self) -> &str { "echo" }
///
///     async fn process(&self, task: FrozenTask) -> Result<(), TaskError> {
///         if task.payload().is_empty() {
///             return Err(AppError::invalid_input("empty payload").into());
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Returns a stable, human-readable processor name.
    fn name(&self) -> &str;

    /// Runs one attempt of the task.
    async fn process(&self, task: FrozenTask) -> Result<(), TaskError>;
}

/// Function-backed processor implementation.
///
/// Wraps a closure that creates a fresh future per attempt, so no state leaks
/// between attempts; share state explicitly via `Arc` inside the closure.
pub struct ProcessorFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ProcessorFn<F> {
    /// Creates a new function-backed processor.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the processor and returns it as a shared handle.
    ///
    /// ## Example
    /// ```rust
    /// use patchwork::{FrozenTask, ProcessorFn, ProcessorRef, TaskError};
    ///
    /// let p: ProcessorRef = ProcessorFn::arc("echo", |task: FrozenTask| async move {
    ///     println!("{} bytes", task.payload().len());
    ///     Ok::<_, TaskError>(())
    /// });
    /// assert_eq!(p.name(), "echo");
    /// ```
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Processor for ProcessorFn<F>
where
    F: Fn(FrozenTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, task: FrozenTask) -> Result<(), TaskError> {
        (self.f)(task).await
    }
}
