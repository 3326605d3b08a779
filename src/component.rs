//! # Generic component lifecycle.
//!
//! Every long-lived engine object (the executor today, a durable broker
//! adapter tomorrow) shares one lifecycle contract:
//!
//! ```text
//! stopped ──► starting ──► running ──► stopping ──► stopped
//!                │
//!                └─ on_start() returned false ──► stopped (startup aborted)
//! ```
//!
//! [`Lifecycle`] holds the state and the registered hooks; [`Component`] is the
//! trait whose provided [`run`](Component::run)/[`terminate`](Component::terminate)
//! drive the overridable [`on_start`](Component::on_start)/[`on_stop`](Component::on_stop)
//! hooks.
//!
//! ## Rules
//! - `run()` is a no-op (returns `false`) unless the component is stopped.
//! - Startup hooks dispatch after `on_start` succeeds and before the flip to
//!   running; shutdown hooks dispatch before `on_stop`.
//! - Hooks run in registration order; a failing hook is logged and does not
//!   abort the remaining dispatch (best-effort, not transactional).
//! - Hooks are registered explicitly via [`Lifecycle::add_startup_hook`] /
//!   [`Lifecycle::add_shutdown_hook`].

use std::borrow::Cow;
use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::RuntimeError;

/// Lifecycle states of a [`Component`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentState {
    /// Not running; the initial and final state.
    Stopped,
    /// `run()` accepted; `on_start` and startup hooks are executing.
    Starting,
    /// Fully operational.
    Running,
    /// `terminate()` accepted; shutdown hooks and `on_stop` are executing.
    Stopping,
}

/// A lifecycle callback dispatched on startup or shutdown.
///
/// Errors are caught and logged by the dispatcher; they never abort the
/// remaining hooks or the transition itself.
#[async_trait]
pub trait LifecycleHook: Send + Sync + 'static {
    /// Runs the hook.
    async fn call(&self) -> Result<(), String>;

    /// Human-readable name (for logs).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Function-backed lifecycle hook.
///
/// Wraps a closure that creates a fresh future per dispatch.
pub struct HookFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HookFn<F> {
    /// Creates a new function-backed hook.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the hook and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> LifecycleHook for HookFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    async fn call(&self) -> Result<(), String> {
        (self.f)().await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// State holder embedded in every [`Component`] implementation.
///
/// Transitions are atomic between await points; hook vectors are snapshotted
/// before dispatch so hooks may themselves register further hooks without
/// deadlocking.
pub struct Lifecycle {
    state: Mutex<ComponentState>,
    startup_hooks: Mutex<Vec<Arc<dyn LifecycleHook>>>,
    shutdown_hooks: Mutex<Vec<Arc<dyn LifecycleHook>>>,
}

impl Lifecycle {
    /// Creates a lifecycle in the stopped state with no hooks.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ComponentState::Stopped),
            startup_hooks: Mutex::new(Vec::new()),
            shutdown_hooks: Mutex::new(Vec::new()),
        }
    }

    /// Current state.
    pub fn state(&self) -> ComponentState {
        *self.state.lock().expect("lifecycle state poisoned")
    }

    /// True iff the component is in the running state.
    pub fn is_running(&self) -> bool {
        self.state() == ComponentState::Running
    }

    /// Registers a hook dispatched during startup, after `on_start`.
    pub fn add_startup_hook(&self, hook: Arc<dyn LifecycleHook>) {
        self.startup_hooks
            .lock()
            .expect("lifecycle hooks poisoned")
            .push(hook);
    }

    /// Registers a hook dispatched during shutdown, before `on_stop`.
    pub fn add_shutdown_hook(&self, hook: Arc<dyn LifecycleHook>) {
        self.shutdown_hooks
            .lock()
            .expect("lifecycle hooks poisoned")
            .push(hook);
    }

    /// Attempts `stopped -> starting`; false if the component is anywhere else.
    pub fn begin_start(&self) -> bool {
        self.transition(ComponentState::Stopped, ComponentState::Starting)
    }

    /// Completes startup: `starting -> running`.
    pub fn finish_start(&self) {
        self.set(ComponentState::Running);
    }

    /// Aborts startup (`on_start` failed or vetoed): back to stopped.
    pub fn abort_start(&self) {
        self.set(ComponentState::Stopped);
    }

    /// Attempts `running -> stopping`; false if the component is anywhere else.
    pub fn begin_stop(&self) -> bool {
        self.transition(ComponentState::Running, ComponentState::Stopping)
    }

    /// Completes shutdown: `stopping -> stopped`.
    pub fn finish_stop(&self) {
        self.set(ComponentState::Stopped);
    }

    /// Dispatches startup hooks in registration order, best-effort.
    pub async fn dispatch_startup(&self) {
        let hooks = self
            .startup_hooks
            .lock()
            .expect("lifecycle hooks poisoned")
            .clone();
        Self::dispatch(hooks, "startup").await;
    }

    /// Dispatches shutdown hooks in registration order, best-effort.
    pub async fn dispatch_shutdown(&self) {
        let hooks = self
            .shutdown_hooks
            .lock()
            .expect("lifecycle hooks poisoned")
            .clone();
        Self::dispatch(hooks, "shutdown").await;
    }

    async fn dispatch(hooks: Vec<Arc<dyn LifecycleHook>>, phase: &str) {
        for hook in hooks {
            if let Err(e) = hook.call().await {
                log::warn!("{phase} hook '{}' failed: {e}", hook.name());
            }
        }
    }

    fn transition(&self, from: ComponentState, to: ComponentState) -> bool {
        let mut state = self.state.lock().expect("lifecycle state poisoned");
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    fn set(&self, to: ComponentState) {
        *self.state.lock().expect("lifecycle state poisoned") = to;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Contract for objects with a supervised lifecycle.
///
/// Implementors embed a [`Lifecycle`] and override [`on_start`](Component::on_start)
/// / [`on_stop`](Component::on_stop); callers drive the provided
/// [`run`](Component::run) / [`terminate`](Component::terminate).
#[async_trait]
pub trait Component: Send + Sync {
    /// The embedded lifecycle state.
    fn lifecycle(&self) -> &Lifecycle;

    /// Startup hook. Returning `Ok(false)` vetoes startup (the component goes
    /// back to stopped without dispatching startup callbacks); an error aborts
    /// startup and propagates.
    async fn on_start(&self) -> Result<bool, RuntimeError> {
        Ok(true)
    }

    /// Shutdown hook, invoked after shutdown callbacks have dispatched.
    async fn on_stop(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Starts the component.
    ///
    /// Returns `Ok(false)` without side effects when the component is not
    /// stopped (already running, starting, or stopping).
    async fn run(&self) -> Result<bool, RuntimeError> {
        let lc = self.lifecycle();
        if !lc.begin_start() {
            return Ok(false);
        }
        match self.on_start().await {
            Ok(true) => {}
            Ok(false) => {
                lc.abort_start();
                return Ok(false);
            }
            Err(e) => {
                lc.abort_start();
                return Err(e);
            }
        }
        lc.dispatch_startup().await;
        lc.finish_start();
        Ok(true)
    }

    /// Stops the component.
    ///
    /// Returns `Ok(false)` without side effects unless the component is
    /// running. Shutdown callbacks dispatch before [`on_stop`](Component::on_stop).
    async fn terminate(&self) -> Result<bool, RuntimeError> {
        let lc = self.lifecycle();
        if !lc.begin_stop() {
            return Ok(false);
        }
        lc.dispatch_shutdown().await;
        let stopped = self.on_stop().await;
        lc.finish_stop();
        stopped?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Probe {
        lifecycle: Lifecycle,
        start_ok: bool,
        started: AtomicUsize,
        stopped: AtomicUsize,
    }

    impl Probe {
        fn new(start_ok: bool) -> Self {
            Self {
                lifecycle: Lifecycle::new(),
                start_ok,
                started: AtomicUsize::new(0),
                stopped: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Component for Probe {
        fn lifecycle(&self) -> &Lifecycle {
            &self.lifecycle
        }

        async fn on_start(&self) -> Result<bool, RuntimeError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(self.start_ok)
        }

        async fn on_stop(&self) -> Result<(), RuntimeError> {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_transitions_to_running_and_is_idempotent() {
        let c = Probe::new(true);
        assert!(c.run().await.unwrap());
        assert_eq!(c.lifecycle().state(), ComponentState::Running);

        // second run is a no-op
        assert!(!c.run().await.unwrap());
        assert_eq!(c.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn vetoed_start_returns_to_stopped() {
        let c = Probe::new(false);
        assert!(!c.run().await.unwrap());
        assert_eq!(c.lifecycle().state(), ComponentState::Stopped);
    }

    #[tokio::test]
    async fn terminate_requires_running() {
        let c = Probe::new(true);
        assert!(!c.terminate().await.unwrap());

        c.run().await.unwrap();
        assert!(c.terminate().await.unwrap());
        assert_eq!(c.lifecycle().state(), ComponentState::Stopped);
        assert_eq!(c.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hooks_run_in_registration_order_and_failures_do_not_abort() {
        let c = Probe::new(true);
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        c.lifecycle().add_startup_hook(HookFn::arc("first", move || {
            let o = o1.clone();
            async move {
                o.lock().unwrap().push("first");
                Ok::<(), String>(())
            }
        }));
        let o2 = order.clone();
        c.lifecycle()
            .add_startup_hook(HookFn::arc("failing", move || {
                let o = o2.clone();
                async move {
                    o.lock().unwrap().push("failing");
                    Err::<(), String>("boom".to_string())
                }
            }));
        let o3 = order.clone();
        c.lifecycle().add_startup_hook(HookFn::arc("last", move || {
            let o = o3.clone();
            async move {
                o.lock().unwrap().push("last");
                Ok::<(), String>(())
            }
        }));

        c.run().await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "failing", "last"]);
    }

    #[tokio::test]
    async fn shutdown_hooks_dispatch_before_on_stop() {
        struct Ordered {
            lifecycle: Lifecycle,
            hook_seen: Arc<AtomicBool>,
            hook_before_stop: Arc<AtomicBool>,
        }

        #[async_trait]
        impl Component for Ordered {
            fn lifecycle(&self) -> &Lifecycle {
                &self.lifecycle
            }

            async fn on_stop(&self) -> Result<(), RuntimeError> {
                self.hook_before_stop
                    .store(self.hook_seen.load(Ordering::SeqCst), Ordering::SeqCst);
                Ok(())
            }
        }

        let hook_seen = Arc::new(AtomicBool::new(false));
        let c = Ordered {
            lifecycle: Lifecycle::new(),
            hook_seen: hook_seen.clone(),
            hook_before_stop: Arc::new(AtomicBool::new(false)),
        };
        let flag = hook_seen.clone();
        c.lifecycle()
            .add_shutdown_hook(HookFn::arc("flag", move || {
                let f = flag.clone();
                async move {
                    f.store(true, Ordering::SeqCst);
                    Ok::<(), String>(())
                }
            }));

        c.run().await.unwrap();
        c.terminate().await.unwrap();
        assert!(c.hook_before_stop.load(Ordering::SeqCst));
    }
}
