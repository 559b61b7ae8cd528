//! # LogWriter: renders engine events through `tracing`
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO livedash: [widget-registered] path=app.jobs.done revision=0
//! INFO livedash: [viewer-connected] viewer=1
//! WARN livedash: [action-rejected] viewer=1 path=app.speed reason=unsupported_action: ...
//! WARN livedash: [callback-failed] viewer=Some(1) path=app.speed callback=speed reason=panic: boom
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let label = e.kind.as_label();
        let path = e.path.as_deref().unwrap_or("-");
        let name = e.name.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::WidgetRegistered
            | EventKind::WidgetReconfigured
            | EventKind::WidgetRemoved
            | EventKind::WidgetUpdated => {
                tracing::info!(seq = e.seq, "[{label}] path={path} revision={:?}", e.revision);
            }
            EventKind::ViewerConnected
            | EventKind::ViewerDisconnected
            | EventKind::ViewerSuspended
            | EventKind::ViewerResumed => {
                tracing::info!(seq = e.seq, "[{label}] viewer={:?} activity={:?}", e.viewer, e.activity);
            }
            EventKind::Subscribed | EventKind::Unsubscribed | EventKind::ResyncRequested => {
                tracing::debug!(seq = e.seq, "[{label}] viewer={:?} path={path}", e.viewer);
            }
            EventKind::ActionDispatched => {
                tracing::info!(seq = e.seq, "[{label}] viewer={:?} path={path} callback={name}", e.viewer);
            }
            EventKind::ActionRejected
            | EventKind::CallbackFailed
            | EventKind::CallbackOverflow => {
                tracing::warn!(seq = e.seq, "[{label}] viewer={:?} path={path} callback={name} reason={reason}", e.viewer);
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                tracing::warn!(seq = e.seq, "[{label}] subscriber={name} info={reason}");
            }
            EventKind::TransportStarted | EventKind::TransportStopped => {
                tracing::info!(seq = e.seq, "[{label}] transport={name}");
            }
            EventKind::TransportFailed => {
                tracing::error!(seq = e.seq, "[{label}] transport={name} err={reason}");
            }
            EventKind::EngineStopped => {
                tracing::info!(seq = e.seq, "[{label}]");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
