//! # Inbound actions and application callbacks.
//!
//! Viewers send [`ActionEnvelope`]s (target path plus a typed [`Action`]); the engine's
//! action router validates them against the target widget and hands an [`ActionEvent`]
//! to the widget's [`ActionCallback`] on that widget's own worker task.
//!
//! - [`Action`] the four interactive payloads, matched exhaustively
//! - [`ActionEnvelope`] wire form, parseable from untrusted JSON
//! - [`ActionCallback`] / [`CallbackFn`] application-side handlers

mod action;
mod callback;

pub use action::{Action, ActionEnvelope, ActionEvent};
pub use callback::{ActionCallback, CallbackFn, CallbackRef};
