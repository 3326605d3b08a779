//! # Executor: orchestration of fetch, execution, and finalization.
//!
//! The public API from this module is the [`Executor`] (built through
//! [`ExecutorBuilder`]) plus the seams it consumes:
//! - [`Processor`] / [`ProcessorFn`]: per-routing-key execution callbacks;
//! - [`Middleware`] and the bundled [`ExpiryMiddleware`] /
//!   [`NotBeforeMiddleware`] / [`TapMiddleware`]: pre-execution checks and
//!   finalizer wrapping;
//! - [`ExceptionHandler`] / [`HandlerFn`]: type-ordered disposition of
//!   application errors;
//! - [`ProcessingUnit`] / [`SpawnUnit`]: the worker-pool collaborator that
//!   actually runs payloads.
//!
//! Internal modules:
//! - `core`: main loop, per-task handling, finalization, shutdown;
//! - `builder`: wiring and validation;
//! - `handlers`: the handler chain;
//! - `middleware`: the pipeline and finalizer plumbing;
//! - `processor`, `unit`: the execution seams.

mod builder;
mod core;
mod handlers;
mod middleware;
mod processor;
mod unit;

pub use builder::{BuildError, ExecutorBuilder};
pub use core::Executor;
pub use handlers::{ExceptionHandler, HandlerChain, HandlerFn};
pub use middleware::{
    finalizer, ExpiryMiddleware, Finalizer, Middleware, NotBeforeMiddleware, TapMiddleware,
    TaskOutcome,
};
pub use processor::{Processor, ProcessorFn, ProcessorRef};
pub use unit::{ProcessJob, ProcessingUnit, SpawnUnit, UnitError, UnitHandle};
