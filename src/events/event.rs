//! # Runtime events emitted by the engine.
//!
//! The [`EventKind`] enum classifies event types across five categories:
//! - **Widget lifecycle**: registered, reconfigured, updated, removed
//! - **Viewer activity**: connected, suspended, resumed, disconnected, (un)subscribed
//! - **Action routing**: dispatched, rejected, callback failures
//! - **Subscriber plumbing**: overflow and panics of event subscribers
//! - **Engine/transport lifecycle**
//!
//! The [`Event`] struct carries additional metadata such as the widget path, the viewer,
//! the revision and a human-readable reason.
//!
//! ## Ordering guarantees
//! Each event gets a sequence number (`seq`) from the [`Bus`](crate::events::Bus) it is
//! published on; it increases monotonically per bus. Use `seq` to restore the exact order
//! when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use livedash::{Event, EventKind, ViewerId};
//!
//! let ev = Event::new(EventKind::ActionRejected)
//!     .with_path("ui.speed")
//!     .with_viewer(ViewerId(3))
//!     .with_reason("no callback bound");
//!
//! assert_eq!(ev.kind, EventKind::ActionRejected);
//! assert_eq!(ev.path.as_deref(), Some("ui.speed"));
//! assert_eq!(ev.reason.as_deref(), Some("no callback bound"));
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use crate::core::{ActivityState, ViewerId};

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `name` (subscriber), `reason` (panic message)
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `name` (subscriber), `reason` ("full" or "closed")
    SubscriberOverflow,

    // === Widget lifecycle ===
    /// A new widget was registered.
    ///
    /// Sets: `path`, `revision` (0)
    WidgetRegistered,

    /// An existing widget was re-registered with a new config.
    ///
    /// Sets: `path`, `revision` (unchanged), `reason` (config epoch)
    WidgetReconfigured,

    /// A mutation was accepted. Only published with `EngineConfig::publish_updates`.
    ///
    /// Sets: `path`, `revision`, `reason` (mutation name)
    WidgetUpdated,

    /// A widget was removed.
    ///
    /// Sets: `path`, `revision` (last revision)
    WidgetRemoved,

    // === Viewer activity ===
    /// Sets: `viewer`, `activity` (new state)
    ViewerConnected,

    /// Sets: `viewer`, `activity` (state before disconnect)
    ViewerDisconnected,

    /// Sets: `viewer`
    ViewerSuspended,

    /// Sets: `viewer`, `reason` (notifications deferred while suspended)
    ViewerResumed,

    /// Sets: `viewer`, `path`
    Subscribed,

    /// Sets: `viewer`, `path`
    Unsubscribed,

    /// The viewer asked for a fresh snapshot.
    ///
    /// Sets: `viewer`, `path`
    ResyncRequested,

    // === Action routing ===
    /// An action was queued for the widget's callback.
    ///
    /// Sets: `viewer`, `path`, `name` (callback)
    ActionDispatched,

    /// An action was refused before reaching the callback.
    ///
    /// Sets: `viewer`, `path`, `reason` (error label and message)
    ActionRejected,

    /// A callback returned an error or panicked; its worker keeps running.
    ///
    /// Sets: `path`, `viewer` (for action deliveries), `name` (callback), `reason`
    CallbackFailed,

    /// A delivery was dropped because the callback queue was full.
    ///
    /// Sets: `path`, `name` (callback), `activity`
    CallbackOverflow,

    // === Engine and transport lifecycle ===
    /// Sets: `name` (transport)
    TransportStarted,

    /// Sets: `name` (transport)
    TransportStopped,

    /// Sets: `name` (transport), `reason`
    TransportFailed,

    /// The engine finished shutting down.
    EngineStopped,
}

impl EventKind {
    /// Stable kebab-case label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::SubscriberPanicked => "subscriber-panicked",
            EventKind::SubscriberOverflow => "subscriber-overflow",
            EventKind::WidgetRegistered => "widget-registered",
            EventKind::WidgetReconfigured => "widget-reconfigured",
            EventKind::WidgetUpdated => "widget-updated",
            EventKind::WidgetRemoved => "widget-removed",
            EventKind::ViewerConnected => "viewer-connected",
            EventKind::ViewerDisconnected => "viewer-disconnected",
            EventKind::ViewerSuspended => "viewer-suspended",
            EventKind::ViewerResumed => "viewer-resumed",
            EventKind::Subscribed => "subscribed",
            EventKind::Unsubscribed => "unsubscribed",
            EventKind::ResyncRequested => "resync-requested",
            EventKind::ActionDispatched => "action-dispatched",
            EventKind::ActionRejected => "action-rejected",
            EventKind::CallbackFailed => "callback-failed",
            EventKind::CallbackOverflow => "callback-overflow",
            EventKind::TransportStarted => "transport-started",
            EventKind::TransportStopped => "transport-stopped",
            EventKind::TransportFailed => "transport-failed",
            EventKind::EngineStopped => "engine-stopped",
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: per-bus monotonic sequence, assigned on publish
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Monotonically increasing sequence number (per bus, 0 until published).
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Widget path, if applicable.
    pub path: Option<Arc<str>>,
    /// Viewer, if applicable.
    pub viewer: Option<ViewerId>,
    /// Widget revision, if applicable.
    pub revision: Option<u64>,
    /// Activity state, if applicable.
    pub activity: Option<ActivityState>,
    /// Subscriber, callback or transport name.
    pub name: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: 0,
            at: SystemTime::now(),
            kind,
            path: None,
            viewer: None,
            revision: None,
            activity: None,
            name: None,
            reason: None,
        }
    }

    /// Attaches a widget path.
    #[inline]
    pub fn with_path(mut self, path: impl AsRef<str>) -> Self {
        self.path = Some(Arc::from(path.as_ref()));
        self
    }

    #[inline]
    pub fn with_viewer(mut self, viewer: ViewerId) -> Self {
        self.viewer = Some(viewer);
        self
    }

    #[inline]
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = Some(revision);
        self
    }

    #[inline]
    pub fn with_activity(mut self, activity: ActivityState) -> Self {
        self.activity = Some(activity);
        self
    }

    /// Attaches a subscriber, callback or transport name.
    #[inline]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_name(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_name(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
