//! # patchwork
//!
//! **Patchwork** is a local task-messaging and execution engine for Rust:
//! an in-process publish/subscribe broker, a Publisher/Subscriber abstraction
//! over it, and an Executor that pulls tasks from a subscriber, runs them
//! through a middleware pipeline, and resolves success/failure through a
//! structured retry/backoff/exception-handling protocol.
//!
//! The in-memory broker is the development/testing backend; the client traits
//! are the boundary a durable, distributed backend drops into.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  producer                                   ┌──────────────────────────────┐
//!     │  Publisher::send(task)                │  LocalBroker                 │
//!     └──────► Codec::encode ────────────────►│  name ──► Topic (bounded     │
//!                                             │           FIFO, backpressure)│
//!                                             └──────┬───────────────────────┘
//!                                                    │ Subscription (fan-in,
//!                                                    │  yield one / re-arm one)
//!                                                    ▼
//!                                      Subscriber::get() ──► FrozenTask
//!                                                    │
//! ┌──────────────────────────────────────────────────┴──────────────────────┐
//! │  Executor (Component lifecycle: stopped→starting→running→stopping)      │
//! │                                                                         │
//! │  main loop ── select!{ subscriber.get() | terminate token }             │
//! │      │ dispatch (tracked per-task future)                               │
//! │      ▼                                                                  │
//! │  handle(task)                                                           │
//! │    ├─► middlewares: inspect (expired→Fatal, not due→Retry) / wrap fin.  │
//! │    ├─► route task_type ──► ProcessingUnit::submit ──► join              │
//! │    └─► finalizer(outcome)                                               │
//! │          ├─ Ok ────────────────────────► commit                         │
//! │          ├─ AppError ─► handler chain (most-specific kind, LIFO)        │
//! │          │      ├─ Retry ─► clone, attempt+1, republish (ceiling →      │
//! │          │      │           backoff log)                                │
//! │          │      ├─ Fatal ─► backoff log                                 │
//! │          │      └─ Drop  ─► discard                                     │
//! │          └─ commit exactly once (cancelled tasks stay uncommitted)      │
//! └────────────────────────────┬────────────────────────────────────────────┘
//!                              │ Bus (broadcast events)
//!                              ▼
//!                        ObserverSet ──► BackoffLog / LogWriter / custom
//! ```
//!
//! ### Per-task lifecycle
//! ```text
//! fetched ──► middleware ──► executing ──► finalizing ──► committed
//!                │                                │
//!                └── short-circuit ───────────────┤
//!                    (expired / not due)          ├─► retried   (clone republished)
//!                                                 ├─► backoff   (terminal, queryable)
//!                                                 └─► dropped   (silent)
//! ```
//!
//! ## Features
//! | Area                | Description                                                    | Key types / traits                        |
//! |---------------------|----------------------------------------------------------------|-------------------------------------------|
//! | **Data model**      | Work items with routing/retry metadata, immutable in flight.   | [`Task`], [`TaskMetadata`], [`FrozenTask`] |
//! | **Transport**       | Named bounded FIFO queues behind a policy-driven registry.     | [`Topic`], [`LocalBroker`], [`MissingQueuePolicy`] |
//! | **Client boundary** | What any backend implements; local reference implementations.  | [`Publisher`], [`Subscriber`], [`Codec`]  |
//! | **Lifecycle**       | Generic start/stop state machine with hooks.                   | [`Component`], [`Lifecycle`]              |
//! | **Execution**       | Fetch loop, middleware, routing, disposition, shutdown.        | [`Executor`], [`Middleware`], [`Processor`] |
//! | **Error protocol**  | Control signals and type-ordered handler dispatch.             | [`TaskControl`], [`ErrorKind`], [`ExceptionHandler`] |
//! | **Policies**        | Retry visibility delays with jitter.                           | [`BackoffPolicy`], [`JitterPolicy`]       |
//! | **Observability**   | Broadcast events, fan-out observers, queryable backoff log.    | [`Event`], [`Observe`], [`BackoffLog`]    |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] observer _(demo/reference only)_.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use patchwork::{
//!     AppError, BrokerConfig, Component, ErrorKind, ExecutorBuilder, ExecutorConfig,
//!     FrozenTask, HandlerFn, JsonCodec, LocalBroker, LocalPublisher, LocalSubscriber,
//!     ProcessorFn, Publisher, Task, TaskControl, TaskError,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = LocalBroker::new(BrokerConfig::default());
//!     let codec = Arc::new(JsonCodec);
//!     broker.declare("main").await;
//!
//!     let subscriber = LocalSubscriber::bind(broker.clone(), codec.clone(), &["main"]).await?;
//!     let publisher = Arc::new(LocalPublisher::new(broker.clone(), codec));
//!
//!     let executor = ExecutorBuilder::new(ExecutorConfig::default())
//!         .with_subscriber(Arc::new(subscriber))
//!         .with_publisher(publisher.clone())
//!         .with_processor("echo", ProcessorFn::arc("echo", |task: FrozenTask| async move {
//!             println!("echo: {:?}", std::str::from_utf8(task.payload()));
//!             Ok::<_, TaskError>(())
//!         }))
//!         .with_exception_handler(
//!             ErrorKind::InvalidInput,
//!             HandlerFn::arc("reject", |_t: &FrozenTask, e: &AppError| {
//!                 let reason = e.message.clone();
//!                 async move { Err::<(), _>(TaskControl::fatal(reason)) }
//!             }),
//!         )
//!         .build()?;
//!
//!     executor.run().await?;
//!     publisher.send(&Task::new("echo", b"hi".to_vec()).with_queue("main"), None).await?;
//!     // ... later
//!     executor.terminate().await?;
//!     Ok(())
//! }
//! ```

mod broker;
mod client;
mod component;
mod config;
mod error;
mod events;
mod executor;
mod observers;
mod policies;
mod tasks;

// ---- Public re-exports ----

pub use broker::{BrokerConfig, Delivery, LocalBroker, MissingQueuePolicy, Subscription, Topic};
pub use client::{LocalPublisher, LocalSubscriber, Publisher, Subscriber};
pub use component::{Component, ComponentState, HookFn, Lifecycle, LifecycleHook};
pub use config::ExecutorConfig;
pub use error::{
    AppError, BrokerError, CodecError, CommitError, ErrorKind, ReceiveError, RuntimeError,
    SendError, TaskControl, TaskError, TopicError,
};
pub use events::{Bus, Event, EventKind};
pub use executor::{
    finalizer, BuildError, ExceptionHandler, Executor, ExecutorBuilder, ExpiryMiddleware,
    Finalizer, HandlerChain, HandlerFn, Middleware, NotBeforeMiddleware, ProcessJob,
    ProcessingUnit, Processor, ProcessorFn, ProcessorRef, SpawnUnit, TapMiddleware, TaskOutcome,
    UnitError, UnitHandle,
};
pub use observers::{BackoffEntry, BackoffLog, Observe, ObserverSet};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use tasks::{Codec, FrozenTask, JsonCodec, Task, TaskMetadata};

// Optional: expose a simple built-in logging observer (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use observers::LogWriter;
