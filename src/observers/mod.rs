//! # Event observers for the engine.
//!
//! This module provides the [`Observe`] trait and built-in implementations for
//! handling events broadcast through the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Executor ── publish(Event) ──► Bus ──► observer listener ──► ObserverSet
//!                                                         ┌────────┼────────┐
//!                                                         ▼        ▼        ▼
//!                                                    BackoffLog LogWriter custom
//! ```
//!
//! ## Observer types
//! - **Passive** - observe and react (logging, metrics, alerts)
//! - **Stateful** - maintain state from events ([`BackoffLog`])

mod backoff_log;
mod observer;
mod set;

#[cfg(feature = "logging")]
mod log;

pub use backoff_log::{BackoffEntry, BackoffLog};
pub use observer::Observe;
pub use set::ObserverSet;

#[cfg(feature = "logging")]
pub use self::log::LogWriter;
