//! # Exception handler chain: type-ordered disposition of application errors.
//!
//! When a processor fails with an [`AppError`], the executor resolves a
//! disposition by walking the registered handlers:
//!
//! - Handlers are registered per [`ErrorKind`]; dispatch walks the error's
//!   kind ancestry **most specific first** (`Timeout` before `Transient`
//!   before `Any`).
//! - Within one kind, handlers run **LIFO** (last registered first).
//! - A handler decides a disposition by returning a [`TaskControl`]; the first
//!   decision wins and stops further *non-idempotent* handlers. Handlers
//!   registered as **idempotent** (audit/logging hooks that must never be
//!   skipped) still run afterwards; their signals cannot override the
//!   decision.
//! - If no handler decides, the fallback is `Retry` with no backoff.
//!
//! Registration happens at construction through
//! [`ExecutorBuilder`](crate::executor::ExecutorBuilder); the chain is
//! immutable afterwards.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, ErrorKind, TaskControl};
use crate::tasks::FrozenTask;

/// # Inspects an application error and optionally decides its disposition.
///
/// Returning `Ok(())` passes (the handler observed but did not decide);
/// returning `Err(control)` decides the disposition.
#[async_trait]
pub trait ExceptionHandler: Send + Sync + 'static {
    /// Handles one application error for one task.
    async fn handle(&self, task: &FrozenTask, error: &AppError) -> Result<(), TaskControl>;

    /// Human-readable name (for logs).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Function-backed exception handler.
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the handler and returns it as a shared handle.
    ///
    /// ## Example
    /// ```rust
    /// use patchwork::{AppError, FrozenTask, HandlerFn, TaskControl};
    ///
    /// let fatal_on_bad_input = HandlerFn::arc("reject-bad-input", |_t: &FrozenTask, e: &AppError| {
    ///     let reason = e.message.clone();
    ///     async move { Err::<(), _>(TaskControl::fatal(reason)) }
    /// });
    /// assert_eq!(fatal_on_bad_input.name(), "reject-bad-input");
    /// # use patchwork::ExceptionHandler;
    /// ```
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> ExceptionHandler for HandlerFn<F>
where
    F: for<'a> Fn(&'a FrozenTask, &'a AppError) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskControl>> + Send + 'static,
{
    async fn handle(&self, task: &FrozenTask, error: &AppError) -> Result<(), TaskControl> {
        (self.f)(task, error).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct HandlerEntry {
    kind: ErrorKind,
    idempotent: bool,
    handler: Arc<dyn ExceptionHandler>,
}

/// Ordered registry of exception handlers.
#[derive(Default)]
pub struct HandlerChain {
    entries: Vec<HandlerEntry>,
}

impl HandlerChain {
    /// Creates an empty chain (fallback disposition only).
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for the given kind.
    pub fn add(&mut self, kind: ErrorKind, handler: Arc<dyn ExceptionHandler>, idempotent: bool) {
        self.entries.push(HandlerEntry {
            kind,
            idempotent,
            handler,
        });
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves the disposition for one application error.
    ///
    /// Walks the kind ancestry most-specific-first, LIFO within each kind;
    /// the first control signal decides, non-idempotent handlers after the
    /// decision are skipped, idempotent ones still run. Falls back to an
    /// immediate retry when nothing decides.
    pub async fn resolve(&self, task: &FrozenTask, error: &AppError) -> TaskControl {
        let mut disposition: Option<TaskControl> = None;

        for kind in error.kind.ancestry() {
            for entry in self.entries.iter().rev().filter(|e| e.kind == kind) {
                if disposition.is_some() && !entry.idempotent {
                    continue;
                }
                if let Err(ctl) = entry.handler.handle(task, error).await {
                    if disposition.is_none() {
                        disposition = Some(ctl);
                    } else {
                        log::debug!(
                            "handler '{}' signalled after disposition was decided; ignored",
                            entry.handler.name()
                        );
                    }
                }
            }
        }

        disposition.unwrap_or_else(TaskControl::retry_now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::Task;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn task() -> FrozenTask {
        FrozenTask::freeze(Task::new("echo", vec![]).with_queue("main"))
    }

    fn deciding(
        order: Arc<Mutex<Vec<&'static str>>>,
        tag: &'static str,
        ctl: TaskControl,
    ) -> Arc<dyn ExceptionHandler> {
        HandlerFn::arc(tag, move |_t: &FrozenTask, _e: &AppError| {
            let order = order.clone();
            let ctl = ctl.clone();
            async move {
                order.lock().unwrap().push(tag);
                Err::<(), TaskControl>(ctl)
            }
        })
    }

    fn passing(
        order: Arc<Mutex<Vec<&'static str>>>,
        tag: &'static str,
    ) -> Arc<dyn ExceptionHandler> {
        HandlerFn::arc(tag, move |_t: &FrozenTask, _e: &AppError| {
            let order = order.clone();
            async move {
                order.lock().unwrap().push(tag);
                Ok::<(), TaskControl>(())
            }
        })
    }

    #[tokio::test]
    async fn empty_chain_falls_back_to_immediate_retry() {
        let chain = HandlerChain::new();
        let ctl = chain
            .resolve(&task(), &AppError::internal("boom"))
            .await;
        assert_eq!(ctl, TaskControl::retry_now());
    }

    #[tokio::test]
    async fn most_specific_kind_is_tried_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut chain = HandlerChain::new();
        chain.add(ErrorKind::Any, deciding(order.clone(), "any", TaskControl::Drop), false);
        chain.add(
            ErrorKind::Transient,
            deciding(order.clone(), "transient", TaskControl::retry_now()),
            false,
        );
        chain.add(
            ErrorKind::Timeout,
            deciding(order.clone(), "timeout", TaskControl::fatal("t")),
            false,
        );

        let ctl = chain
            .resolve(&task(), &AppError::new(ErrorKind::Timeout, "slow"))
            .await;
        assert_eq!(ctl, TaskControl::fatal("t"));
        // the decision stopped the transient/any handlers entirely
        assert_eq!(*order.lock().unwrap(), vec!["timeout"]);
    }

    #[tokio::test]
    async fn lifo_within_one_kind() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut chain = HandlerChain::new();
        chain.add(ErrorKind::Any, passing(order.clone(), "first"), false);
        chain.add(ErrorKind::Any, passing(order.clone(), "second"), false);

        chain.resolve(&task(), &AppError::internal("x")).await;
        assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn idempotent_handlers_still_run_after_a_decision() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut chain = HandlerChain::new();
        chain.add(ErrorKind::Any, passing(order.clone(), "audit-any"), true);
        chain.add(ErrorKind::Any, deciding(order.clone(), "skipped", TaskControl::Drop), false);
        chain.add(
            ErrorKind::InvalidInput,
            deciding(order.clone(), "decider", TaskControl::fatal("bad")),
            false,
        );

        let ctl = chain
            .resolve(&task(), &AppError::invalid_input("nope"))
            .await;
        assert_eq!(ctl, TaskControl::fatal("bad"));
        assert_eq!(*order.lock().unwrap(), vec!["decider", "audit-any"]);
    }

    #[tokio::test]
    async fn idempotent_signals_cannot_override_the_decision() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut chain = HandlerChain::new();
        chain.add(ErrorKind::Any, deciding(order.clone(), "audit", TaskControl::Drop), true);
        chain.add(
            ErrorKind::NotFound,
            deciding(order.clone(), "decider", TaskControl::fatal("gone")),
            false,
        );

        let ctl = chain
            .resolve(&task(), &AppError::new(ErrorKind::NotFound, "missing"))
            .await;
        assert_eq!(ctl, TaskControl::fatal("gone"));
        assert_eq!(*order.lock().unwrap(), vec!["decider", "audit"]);
    }

    #[tokio::test]
    async fn handlers_of_unrelated_kinds_never_run() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut chain = HandlerChain::new();
        let h = hits.clone();
        chain.add(
            ErrorKind::Timeout,
            HandlerFn::arc("timeout-only", move |_t: &FrozenTask, _e: &AppError| {
                let h = h.clone();
                async move {
                    h.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), TaskControl>(())
                }
            }),
            false,
        );

        chain
            .resolve(&task(), &AppError::invalid_input("bad"))
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
