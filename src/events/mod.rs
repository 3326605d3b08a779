//! Engine events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the executor and its collaborators.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: the executor (fetch/finalization paths) and
//!   `ObserverSet` workers (overflow/panic).
//! - **Consumer**: the executor's observer listener, fanning out to the
//!   [`ObserverSet`](crate::observers::ObserverSet).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
