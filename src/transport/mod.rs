//! # Transport adapters.
//!
//! The network side of a dashboard (HTTP/WebSocket, framing, TLS) lives outside this crate.
//! An adapter implements [`Transport`] and drives the engine through its transport hooks:
//!
//! ```text
//! client connects      ──► engine.on_connect(viewer)
//! client subscribes    ──► engine.on_subscribe(viewer, path, filter)  → first Delta
//! client sends action  ──► engine.on_action_received(viewer, envelope)
//! own schedule         ──► engine.wait_pending(viewer).await; engine.drain_pending(viewer)
//! client goes away     ──► engine.on_disconnect(viewer)
//! ```
//!
//! The engine runs each registered transport on its own task, publishes
//! `TransportStarted` / `TransportStopped` / `TransportFailed`, and cancels the token on
//! shutdown. `serve` must return soon after the token is cancelled.
//!
//! [`LocalViewer`] is an in-process viewer that follows the same contract without any I/O
//! and keeps a [`WidgetReplica`] per subscribed path.

mod local;
mod replica;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::Engine;
use crate::error::TransportError;

pub use local::LocalViewer;
pub use replica::WidgetReplica;

/// A viewer-facing adapter run by the engine.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Name used in logs and events.
    fn name(&self) -> &str;

    /// Serves viewers until `token` is cancelled or a fatal error occurs.
    async fn serve(&self, engine: Arc<Engine>, token: CancellationToken) -> Result<(), TransportError>;
}
