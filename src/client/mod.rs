//! # Client layer: the backend boundary the executor consumes.
//!
//! [`Publisher`] and [`Subscriber`] are the two traits any messaging backend
//! must implement; [`LocalPublisher`] and [`LocalSubscriber`] are the
//! in-process reference implementations over
//! [`LocalBroker`](crate::broker::LocalBroker).
//!
//! ```text
//! producer ──► Publisher::send ──► Codec::encode ──► broker
//! executor ◄── Subscriber::get ◄── Codec::decode ◄── broker
//!                    │
//!                    ├── commit(task)    acknowledge, discard permanently
//!                    └── rollback(task)  redeliver identical bytes
//! ```

mod publisher;
mod subscriber;

pub use publisher::{LocalPublisher, Publisher};
pub use subscriber::{LocalSubscriber, Subscriber};
