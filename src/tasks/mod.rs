//! # Task data model and serialization boundary.
//!
//! This module provides the core task-related types:
//! - [`Task`] - mutable work item (routing key, correlation id, payload, metadata)
//! - [`TaskMetadata`] - routing and retry metadata carried with every task
//! - [`FrozenTask`] - immutable in-flight view returned by `Subscriber::get`
//! - [`Codec`] / [`JsonCodec`] - serialization boundary for the wire format

mod codec;
mod frozen;
mod task;

pub use codec::{Codec, JsonCodec};
pub use frozen::FrozenTask;
pub use task::{Task, TaskMetadata};
