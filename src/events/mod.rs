//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to publish/subscribe
//! to runtime events emitted by the registry, the action router, the engine's transport
//! hooks and the callback/subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Registry`, `ActionRouter` and its callback workers, `Engine`
//!   hooks and transport task, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the engine's event listener, which fans out to `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub(crate) use event::panic_message;
pub use event::{Event, EventKind};
