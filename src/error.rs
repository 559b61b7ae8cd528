//! Error types used by the livedash engine, widget callbacks and transports.
//!
//! This module defines the error enums:
//!
//! - [`EngineError`]: errors returned synchronously by registry, subscription,
//!   routing and activity operations.
//! - [`CallbackError`]: errors returned by application action callbacks.
//! - [`PatchError`]: a patch could not be applied to a widget value (viewer-side replicas).
//! - [`ReplicaError`]: a viewer-side replica could not follow a delta.
//! - [`TransportError`]: errors raised by transport adapters.
//!
//! Engine and callback errors provide helper methods (`as_label`, `as_message`) for
//! logging/metrics.

use thiserror::Error;

use crate::core::{ActivityState, ViewerId};
use crate::widgets::{Col, Row, WidgetKind};

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// # Errors produced by the engine.
///
/// None of these is fatal: the worst outcome is one widget or one viewer becoming
/// unusable while the rest of the engine keeps serving.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The path is already registered with a different widget kind.
    #[error("path '{path}' already registered as {existing}, cannot register as {requested}")]
    DuplicatePath {
        path: String,
        existing: WidgetKind,
        requested: WidgetKind,
    },

    /// No widget is registered at the path.
    #[error("unknown widget path '{path}'")]
    UnknownPath { path: String },

    /// The mutation kind does not fit the widget kind.
    #[error("mutation '{mutation}' does not apply to {kind} widget '{path}'")]
    TypeMismatch {
        path: String,
        kind: WidgetKind,
        mutation: &'static str,
    },

    /// Configuration options were unrecognized or inconsistent.
    #[error("invalid {kind} config: {reason}")]
    InvalidConfig { kind: WidgetKind, reason: String },

    /// The widget path is malformed.
    #[error("invalid widget path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A mutation carried a value the widget cannot accept.
    #[error("invalid value for widget '{path}': {reason}")]
    InvalidValue { path: String, reason: String },

    /// The widget does not accept this action (no callback, wrong payload, bad value).
    #[error("unsupported action on widget '{path}': {reason}")]
    UnsupportedAction { path: String, reason: String },

    /// The widget was removed (or replaced) after the caller obtained its reference.
    #[error("widget '{path}' is gone")]
    WidgetGone { path: String },

    /// The action callback could not accept or failed to process an action.
    #[error("callback for widget '{path}' failed: {reason}")]
    CallbackFailure { path: String, reason: String },

    /// The viewer has no live connection.
    #[error("viewer {viewer} is not connected")]
    ViewerNotConnected { viewer: ViewerId },

    /// The requested activity transition is not allowed from the current state.
    #[error("viewer {viewer} cannot {signal} while {from:?}")]
    InvalidTransition {
        viewer: ViewerId,
        from: ActivityState,
        signal: &'static str,
    },

    /// The configured viewer limit is reached.
    #[error("viewer limit {limit} reached")]
    TooManyViewers { limit: usize },

    /// The engine was shut down.
    #[error("engine is shut down")]
    ShutDown,

    /// The engine was built outside a tokio runtime.
    #[error("no tokio runtime available to spawn engine tasks")]
    RuntimeUnavailable,
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use livedash::EngineError;
    ///
    /// let err = EngineError::UnknownPath { path: "jobs.done".into() };
    /// assert_eq!(err.as_label(), "unknown_path");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::DuplicatePath { .. } => "duplicate_path",
            EngineError::UnknownPath { .. } => "unknown_path",
            EngineError::TypeMismatch { .. } => "type_mismatch",
            EngineError::InvalidConfig { .. } => "invalid_config",
            EngineError::InvalidPath { .. } => "invalid_path",
            EngineError::InvalidValue { .. } => "invalid_value",
            EngineError::UnsupportedAction { .. } => "unsupported_action",
            EngineError::WidgetGone { .. } => "widget_gone",
            EngineError::CallbackFailure { .. } => "callback_failure",
            EngineError::ViewerNotConnected { .. } => "viewer_not_connected",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::TooManyViewers { .. } => "too_many_viewers",
            EngineError::ShutDown => "shut_down",
            EngineError::RuntimeUnavailable => "runtime_unavailable",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }

    /// Path of the widget the error refers to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            EngineError::DuplicatePath { path, .. }
            | EngineError::UnknownPath { path }
            | EngineError::TypeMismatch { path, .. }
            | EngineError::InvalidPath { path, .. }
            | EngineError::InvalidValue { path, .. }
            | EngineError::UnsupportedAction { path, .. }
            | EngineError::WidgetGone { path }
            | EngineError::CallbackFailure { path, .. } => Some(path),
            _ => None,
        }
    }

    pub(crate) fn invalid_config(kind: WidgetKind, reason: impl Into<String>) -> Self {
        EngineError::InvalidConfig {
            kind,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_value(path: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidValue {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(path: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::UnsupportedAction {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// # Errors returned by action callbacks.
///
/// Reported on the bus as `CallbackFailed`; they never affect routing to other widgets.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// The application refused the action (e.g. the requested value is not allowed right now).
    #[error("action rejected: {reason}")]
    Rejected { reason: String },

    /// Processing failed.
    #[error("callback failed: {error}")]
    Fail { error: String },
}

impl CallbackError {
    /// Shorthand for [`CallbackError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        CallbackError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for [`CallbackError::Rejected`].
    pub fn rejected(reason: impl Into<String>) -> Self {
        CallbackError::Rejected {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CallbackError::Rejected { .. } => "callback_rejected",
            CallbackError::Fail { .. } => "callback_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            CallbackError::Rejected { reason } => format!("rejected: {reason}"),
            CallbackError::Fail { error } => format!("error: {error}"),
        }
    }
}

/// A patch could not be applied to a widget value.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    #[error("patch '{patch}' does not apply to a {kind} value")]
    KindMismatch {
        kind: WidgetKind,
        patch: &'static str,
    },

    #[error("row {0} does not exist")]
    MissingRow(Row),

    #[error("row {0} already exists")]
    DuplicateRow(Row),

    #[error("column {0} does not exist")]
    MissingColumn(Col),

    #[error("entry '{0}' does not exist")]
    MissingEntry(String),

    #[error("bucket {index} out of range (buckets: {len})")]
    BucketOutOfRange { index: usize, len: usize },
}

/// A viewer-side replica could not follow a delta; the viewer should request a resync.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplicaError {
    /// The incremental delta does not start at the replica's revision.
    #[error("replica of '{path}' is at revision {have}, delta starts at {from}")]
    RevisionGap { path: String, have: u64, from: u64 },

    /// An incremental delta arrived before any snapshot.
    #[error("no baseline for '{path}'")]
    NoBaseline { path: String },

    /// A patch did not apply.
    #[error("patch failed on '{path}': {source}")]
    Patch {
        path: String,
        #[source]
        source: PatchError,
    },
}

/// # Errors raised by transport adapters.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TransportError {
    /// The listener could not be started (bind failure, bad address, ...).
    #[error("transport '{name}' failed to start: {reason}")]
    Start { name: String, reason: String },

    /// The transport stopped with an I/O or protocol error.
    #[error("transport '{name}' failed: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine rejected a transport hook call.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Start { .. } => "transport_start",
            TransportError::Io { .. } => "transport_io",
            TransportError::Engine(_) => "transport_engine",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        let err = EngineError::TypeMismatch {
            path: "a.b".into(),
            kind: WidgetKind::Gauge,
            mutation: "inc",
        };
        assert_eq!(err.as_label(), "type_mismatch");
        assert_eq!(err.path(), Some("a.b"));
        assert_eq!(EngineError::ShutDown.path(), None);
        assert_eq!(CallbackError::fail("boom").as_label(), "callback_failed");
    }

    #[test]
    fn test_messages_name_the_widget() {
        let err = EngineError::DuplicatePath {
            path: "jobs.done".into(),
            existing: WidgetKind::Counter,
            requested: WidgetKind::Gauge,
        };
        assert_eq!(
            err.as_message(),
            "path 'jobs.done' already registered as counter, cannot register as gauge"
        );
    }

    #[test]
    fn test_transport_wraps_engine_error() {
        let err: TransportError = EngineError::ShutDown.into();
        assert_eq!(err.as_label(), "transport_engine");
        assert_eq!(err.to_string(), "engine is shut down");
    }
}
