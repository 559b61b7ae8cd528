//! # Per-viewer connectivity state machine.
//!
//! ```text
//!                 on_connect                first subscribe / resume
//!  DISCONNECTED ─────────────► CONNECTED ─────────────────────────► AWAKE
//!       ▲                          │                                 │  ▲
//!       │ on_disconnect            │ suspend               suspend │  │ resume / subscribe
//!       │ (from any state)         ▼                                 ▼  │
//!       └──────────────────────  SUSPEND ◄───────────────────────────┘  │
//!                                                                        │
//!  inbound action: <state> ──► ACTION ──► <state>  ─────────────────────┘
//! ```
//!
//! ## Rules
//! - While SUSPEND or DISCONNECTED no deltas are computed; the viewer's pending set keeps
//!   growing and a deferred-notification counter records how much was held back.
//! - Unknown viewers are DISCONNECTED; a disconnect forgets the viewer entirely.
//! - Invalid application-level transitions fail with `InvalidTransition`.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::core::lock;
use crate::error::{EngineError, Result};

/// Engine-unique viewer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewerId(pub u64);

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Activity of a viewer (or of a widget, as reported to its callback).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityState {
    Suspend,
    Awake,
    Disconnected,
    Connected,
    Action,
}

impl ActivityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityState::Suspend => "SUSPEND",
            ActivityState::Awake => "AWAKE",
            ActivityState::Disconnected => "DISCONNECTED",
            ActivityState::Connected => "CONNECTED",
            ActivityState::Action => "ACTION",
        }
    }

    /// True when deltas must not be computed for a viewer in this state.
    #[inline]
    pub fn is_gated(&self) -> bool {
        matches!(self, ActivityState::Suspend | ActivityState::Disconnected)
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct ViewerActivity {
    state: ActivityState,
    deferred: u64,
}

/// Activity state of every connected viewer.
pub struct ActivityCoordinator {
    viewers: RwLock<HashMap<ViewerId, ViewerActivity>>,
    max_viewers: Option<usize>,
}

impl ActivityCoordinator {
    pub fn new(max_viewers: Option<usize>) -> Self {
        Self {
            viewers: RwLock::new(HashMap::new()),
            max_viewers,
        }
    }

    /// Current state; unknown viewers are `Disconnected`.
    pub fn state(&self, viewer: ViewerId) -> ActivityState {
        lock::read(&self.viewers)
            .get(&viewer)
            .map_or(ActivityState::Disconnected, |v| v.state)
    }

    /// Number of notifications held back while the viewer was gated.
    pub fn deferred(&self, viewer: ViewerId) -> u64 {
        lock::read(&self.viewers).get(&viewer).map_or(0, |v| v.deferred)
    }

    pub fn connected_count(&self) -> usize {
        lock::read(&self.viewers).len()
    }

    /// Connected viewers, sorted by id.
    pub fn viewers(&self) -> Vec<ViewerId> {
        let mut ids: Vec<_> = lock::read(&self.viewers).keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// DISCONNECTED → CONNECTED. Idempotent for viewers already connected.
    ///
    /// Returns the previous state.
    pub(crate) fn connect(&self, viewer: ViewerId) -> Result<ActivityState> {
        let mut viewers = lock::write(&self.viewers);
        if let Some(v) = viewers.get(&viewer) {
            return Ok(v.state);
        }
        if let Some(limit) = self.max_viewers {
            if viewers.len() >= limit {
                return Err(EngineError::TooManyViewers { limit });
            }
        }
        viewers.insert(
            viewer,
            ViewerActivity {
                state: ActivityState::Connected,
                deferred: 0,
            },
        );
        Ok(ActivityState::Disconnected)
    }

    /// Any state → DISCONNECTED. Returns the previous state.
    pub(crate) fn disconnect(&self, viewer: ViewerId) -> ActivityState {
        lock::write(&self.viewers)
            .remove(&viewer)
            .map_or(ActivityState::Disconnected, |v| v.state)
    }

    /// A subscription was accepted: CONNECTED / SUSPEND → AWAKE.
    ///
    /// Returns the previous state.
    pub(crate) fn subscribed(&self, viewer: ViewerId) -> Result<ActivityState> {
        self.transition(viewer, "subscribe", |from| match from {
            ActivityState::Connected | ActivityState::Suspend | ActivityState::Awake => {
                Some(ActivityState::Awake)
            }
            // mid-dispatch; the router restores the prior state
            ActivityState::Action => Some(ActivityState::Action),
            ActivityState::Disconnected => None,
        })
        .map_err(|err| match err {
            EngineError::InvalidTransition { viewer, .. } => EngineError::ViewerNotConnected { viewer },
            other => other,
        })
    }

    /// AWAKE / CONNECTED → SUSPEND. Idempotent while suspended.
    pub(crate) fn suspend(&self, viewer: ViewerId) -> Result<ActivityState> {
        self.transition(viewer, "suspend", |from| match from {
            ActivityState::Awake | ActivityState::Connected | ActivityState::Suspend => {
                Some(ActivityState::Suspend)
            }
            ActivityState::Disconnected | ActivityState::Action => None,
        })
    }

    /// SUSPEND / CONNECTED → AWAKE. Clears the deferred counter and returns it.
    pub(crate) fn resume(&self, viewer: ViewerId) -> Result<u64> {
        let mut viewers = lock::write(&self.viewers);
        let from = viewers.get(&viewer).map_or(ActivityState::Disconnected, |v| v.state);
        match (viewers.get_mut(&viewer), from) {
            (
                Some(v),
                ActivityState::Suspend | ActivityState::Connected | ActivityState::Awake,
            ) => {
                v.state = ActivityState::Awake;
                Ok(std::mem::take(&mut v.deferred))
            }
            _ => Err(EngineError::InvalidTransition {
                viewer,
                from,
                signal: "resume",
            }),
        }
    }

    /// Enters ACTION for an inbound action and returns the state to restore afterwards.
    pub(crate) fn begin_action(&self, viewer: ViewerId) -> Result<ActivityState> {
        let mut viewers = lock::write(&self.viewers);
        match viewers.get_mut(&viewer) {
            Some(v) => {
                let prior = v.state;
                v.state = ActivityState::Action;
                Ok(prior)
            }
            None => Err(EngineError::ViewerNotConnected { viewer }),
        }
    }

    /// Leaves ACTION, restoring `prior` unless the viewer moved on meanwhile.
    pub(crate) fn end_action(&self, viewer: ViewerId, prior: ActivityState) {
        if let Some(v) = lock::write(&self.viewers).get_mut(&viewer) {
            if v.state == ActivityState::Action {
                v.state = prior;
            }
        }
    }

    /// Counts `n` notifications held back for a gated viewer.
    pub(crate) fn defer(&self, viewer: ViewerId, n: u64) {
        if let Some(v) = lock::write(&self.viewers).get_mut(&viewer) {
            v.deferred = v.deferred.saturating_add(n);
        }
    }

    fn transition(
        &self,
        viewer: ViewerId,
        signal: &'static str,
        next: impl FnOnce(ActivityState) -> Option<ActivityState>,
    ) -> Result<ActivityState> {
        let mut viewers = lock::write(&self.viewers);
        let from = viewers.get(&viewer).map_or(ActivityState::Disconnected, |v| v.state);
        match (viewers.get_mut(&viewer), next(from)) {
            (Some(v), Some(to)) => {
                v.state = to;
                Ok(from)
            }
            _ => Err(EngineError::InvalidTransition {
                viewer,
                from,
                signal,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V: ViewerId = ViewerId(1);

    #[test]
    fn test_lifecycle() {
        let c = ActivityCoordinator::new(None);
        assert_eq!(c.state(V), ActivityState::Disconnected);

        assert_eq!(c.connect(V).unwrap(), ActivityState::Disconnected);
        assert_eq!(c.connect(V).unwrap(), ActivityState::Connected);
        c.subscribed(V).unwrap();
        assert_eq!(c.state(V), ActivityState::Awake);

        c.suspend(V).unwrap();
        c.defer(V, 3);
        assert_eq!(c.state(V), ActivityState::Suspend);
        assert_eq!(c.resume(V).unwrap(), 3);
        assert_eq!(c.deferred(V), 0);

        assert_eq!(c.disconnect(V), ActivityState::Awake);
        assert_eq!(c.state(V), ActivityState::Disconnected);
    }

    #[test]
    fn test_invalid_transitions() {
        let c = ActivityCoordinator::new(None);
        let err = c.suspend(V).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidTransition {
                viewer: V,
                from: ActivityState::Disconnected,
                signal: "suspend"
            }
        );
        assert!(c.resume(V).is_err());
        assert_eq!(c.subscribed(V).unwrap_err(), EngineError::ViewerNotConnected { viewer: V });
    }

    #[test]
    fn test_action_restores_prior_state() {
        let c = ActivityCoordinator::new(None);
        c.connect(V).unwrap();
        c.suspend(V).unwrap();

        let prior = c.begin_action(V).unwrap();
        assert_eq!(c.state(V), ActivityState::Action);
        c.end_action(V, prior);
        assert_eq!(c.state(V), ActivityState::Suspend);

        // disconnect during the action wins
        let prior = c.begin_action(V).unwrap();
        c.disconnect(V);
        c.end_action(V, prior);
        assert_eq!(c.state(V), ActivityState::Disconnected);
    }

    #[test]
    fn test_viewer_limit() {
        let c = ActivityCoordinator::new(Some(1));
        c.connect(V).unwrap();
        assert_eq!(
            c.connect(ViewerId(2)).unwrap_err(),
            EngineError::TooManyViewers { limit: 1 }
        );
        c.disconnect(V);
        c.connect(ViewerId(2)).unwrap();
    }
}
