//! # In-process message transport: topics, registry, and fan-in subscriptions.
//!
//! This module is the transport layer under the client abstractions:
//! - [`Topic`] - a single named, bounded FIFO queue with backpressure
//! - [`MissingQueuePolicy`] / [`BrokerConfig`] - policy for access to queues
//!   that do not exist yet, configured independently for publish and subscribe
//! - [`LocalBroker`] - the registry of topics plus policy resolution
//! - [`Subscription`] / [`Delivery`] - multi-queue fan-in with the
//!   "yield one, re-arm one" discipline
//!
//! ## Quick wiring
//! ```text
//! LocalPublisher ──► LocalBroker::publish ──► Topic::put
//! LocalSubscriber ◄── Subscription::next ◄── pump ◄── Topic::get
//! ```
//!
//! Ordering is FIFO within one topic; across topics only eventually-fair
//! interleaving is promised.

mod local;
mod policy;
mod topic;

pub use local::{Delivery, LocalBroker, Subscription};
pub use policy::{BrokerConfig, MissingQueuePolicy};
pub use topic::Topic;
