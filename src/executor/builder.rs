//! # Builder for constructing an [`Executor`].
//!
//! All collaborators are registered explicitly here — processors by routing
//! key, middlewares in pipeline order, exception handlers per error kind,
//! observers for the event bus — and validated once at `build()`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use patchwork::{
//!     BrokerConfig, Component, ExecutorBuilder, ExecutorConfig, FrozenTask, JsonCodec,
//!     LocalBroker, LocalPublisher, LocalSubscriber, ProcessorFn, TaskError,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = LocalBroker::new(BrokerConfig::default());
//! let codec = Arc::new(JsonCodec);
//! broker.declare("main").await;
//!
//! let subscriber = LocalSubscriber::bind(broker.clone(), codec.clone(), &["main"]).await?;
//! let publisher = LocalPublisher::new(broker.clone(), codec);
//!
//! let executor = ExecutorBuilder::new(ExecutorConfig::default())
//!     .with_subscriber(Arc::new(subscriber))
//!     .with_publisher(Arc::new(publisher))
//!     .with_processor("echo", ProcessorFn::arc("echo", |task: FrozenTask| async move {
//!         println!("{:?}", task.payload());
//!         Ok::<_, TaskError>(())
//!     }))
//!     .build()?;
//!
//! executor.run().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::{Publisher, Subscriber};
use crate::config::ExecutorConfig;
use crate::error::ErrorKind;
use crate::events::Bus;
use crate::executor::core::{Executor, Inner};
use crate::executor::handlers::{ExceptionHandler, HandlerChain};
use crate::executor::middleware::Middleware;
use crate::executor::processor::Processor;
use crate::executor::unit::{ProcessingUnit, SpawnUnit};
use crate::observers::{BackoffLog, Observe, ObserverSet};

/// Errors raised by [`ExecutorBuilder::build`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// No subscriber was provided; the executor has nothing to fetch from.
    #[error("executor requires a subscriber")]
    MissingSubscriber,

    /// No publisher was provided; retries could not be republished.
    #[error("executor requires a publisher")]
    MissingPublisher,
}

/// Assembles an [`Executor`] from its configuration and collaborators.
pub struct ExecutorBuilder {
    cfg: ExecutorConfig,
    subscriber: Option<Arc<dyn Subscriber>>,
    publisher: Option<Arc<dyn Publisher>>,
    unit: Option<Arc<dyn ProcessingUnit>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    processors: HashMap<String, Arc<dyn Processor>>,
    handlers: HandlerChain,
    observers: Vec<Arc<dyn Observe>>,
}

impl ExecutorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: ExecutorConfig) -> Self {
        Self {
            cfg,
            subscriber: None,
            publisher: None,
            unit: None,
            middlewares: Vec::new(),
            processors: HashMap::new(),
            handlers: HandlerChain::new(),
            observers: Vec::new(),
        }
    }

    /// Sets the subscriber the executor fetches tasks from. Required.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    /// Sets the publisher used to republish retry clones. Required.
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Sets the processing unit. Defaults to [`SpawnUnit::default`].
    pub fn with_unit(mut self, unit: Arc<dyn ProcessingUnit>) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Appends a middleware; the pipeline runs in registration order.
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Registers the processor for a routing key. A later registration for
    /// the same key replaces the earlier one.
    pub fn with_processor(
        mut self,
        task_type: impl Into<String>,
        processor: Arc<dyn Processor>,
    ) -> Self {
        self.processors.insert(task_type.into(), processor);
        self
    }

    /// Registers an exception handler for an error kind (LIFO within a kind,
    /// most specific kind dispatched first).
    pub fn with_exception_handler(
        mut self,
        kind: ErrorKind,
        handler: Arc<dyn ExceptionHandler>,
    ) -> Self {
        self.handlers.add(kind, handler, false);
        self
    }

    /// Registers an idempotent exception handler: it still runs after another
    /// handler has decided the disposition (audit/logging hooks).
    pub fn with_idempotent_handler(
        mut self,
        kind: ErrorKind,
        handler: Arc<dyn ExceptionHandler>,
    ) -> Self {
        self.handlers.add(kind, handler, true);
        self
    }

    /// Adds an event observer.
    pub fn with_observer(mut self, observer: Arc<dyn Observe>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Validates the wiring and returns the executor.
    pub fn build(self) -> Result<Arc<Executor>, BuildError> {
        let subscriber = self.subscriber.ok_or(BuildError::MissingSubscriber)?;
        let publisher = self.publisher.ok_or(BuildError::MissingPublisher)?;
        let unit = self
            .unit
            .unwrap_or_else(|| Arc::new(SpawnUnit::default()) as Arc<dyn ProcessingUnit>);

        let bus = Bus::new(self.cfg.bus_capacity);
        let observer_set = ObserverSet::new(self.observers, bus.clone());
        let backoff_log = BackoffLog::new();

        let cfg = self.cfg;
        let middlewares = self.middlewares;
        let processors = self.processors;
        let handlers = self.handlers;

        Ok(Arc::new_cyclic(|weak| {
            let inner = Arc::new(Inner {
                cfg,
                subscriber,
                publisher,
                unit,
                middlewares,
                processors,
                handlers,
                bus,
                backoff_log,
                terminate: CancellationToken::new(),
                in_flight: AtomicUsize::new(0),
                tasks: Mutex::new(JoinSet::new()),
                exec: weak.clone(),
            });
            Executor::assemble(inner, observer_set)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerConfig, LocalBroker};
    use crate::client::{LocalPublisher, LocalSubscriber};
    use crate::tasks::JsonCodec;

    #[tokio::test]
    async fn build_rejects_missing_collaborators() {
        let err = ExecutorBuilder::new(ExecutorConfig::default())
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::MissingSubscriber);

        let broker = LocalBroker::new(BrokerConfig::default());
        broker.declare("main").await;
        let codec = Arc::new(JsonCodec);
        let subscriber = LocalSubscriber::bind(broker.clone(), codec, &["main"])
            .await
            .unwrap();

        let err = ExecutorBuilder::new(ExecutorConfig::default())
            .with_subscriber(Arc::new(subscriber))
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::MissingPublisher);
    }

    #[tokio::test]
    async fn build_succeeds_with_default_unit() {
        let broker = LocalBroker::new(BrokerConfig::default());
        broker.declare("main").await;
        let codec: Arc<JsonCodec> = Arc::new(JsonCodec);
        let subscriber = LocalSubscriber::bind(broker.clone(), codec.clone(), &["main"])
            .await
            .unwrap();
        let publisher = LocalPublisher::new(broker, codec);

        let executor = ExecutorBuilder::new(ExecutorConfig::default())
            .with_subscriber(Arc::new(subscriber))
            .with_publisher(Arc::new(publisher))
            .build()
            .unwrap();
        assert!(!executor.busy());
    }
}
