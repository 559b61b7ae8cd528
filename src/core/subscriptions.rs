//! # Subscription manager: viewer interest, baselines and pending sets.
//!
//! ```text
//! ChangeQueue ──absorb──► watchers[path] ──► viewer.pending += path ──► Notify
//!                                              │
//! drain_pending(viewer) ◄──────────────────────┘
//!     for path in pending (registration order):
//!         DeltaComputer(registry cell, viewer baseline) → delta
//!         baseline = after(baseline, delta)
//! ```
//!
//! ## Rules
//! - `drain_pending` is the only exit for updates; the registry never talks to viewers.
//! - Per (viewer, path) the baseline only moves forward: a delta is computed against the
//!   baseline and the baseline is advanced under the same viewer lock.
//! - A gated viewer (SUSPEND) keeps collecting pending paths; every change absorbed while
//!   gated is counted in the coordinator's deferred counter.
//! - A subscription refers to its widget by path only. It survives removal: the viewer gets
//!   `Gone` once, then a snapshot when the path is registered again.
//!
//! Lock order: viewer table → viewer entry → registry cell. The watcher table is never held
//! together with a viewer entry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::core::activity::{ActivityCoordinator, ActivityState, ViewerId};
use crate::core::changes::{ChangeKind, ChangeQueue};
use crate::core::delta::{Baseline, Delta, DeltaComputer};
use crate::core::lock;
use crate::core::registry::Registry;
use crate::core::router::ActionRouter;
use crate::error::{EngineError, Result};
use crate::widgets::WidgetPath;

/// How deltas are produced for one subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaMode {
    /// Incremental deltas whenever the history window allows.
    #[default]
    Deltas,
    /// Always full snapshots.
    SnapshotsOnly,
}

/// Per-subscription interest filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterestFilter {
    pub mode: DeltaMode,
    /// The path is not drained more often than this; changes stay pending meanwhile.
    pub min_interval: Option<Duration>,
}

impl InterestFilter {
    pub fn snapshots_only() -> Self {
        Self {
            mode: DeltaMode::SnapshotsOnly,
            min_interval: None,
        }
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    fn computer(&self) -> DeltaComputer {
        DeltaComputer::new(self.mode == DeltaMode::SnapshotsOnly)
    }

    fn remaining(&self, last: Option<Instant>, now: Instant) -> Option<Duration> {
        let (min, last) = (self.min_interval?, last?);
        min.checked_sub(now.saturating_duration_since(last))
            .filter(|d| !d.is_zero())
    }
}

struct SubEntry {
    filter: InterestFilter,
    baseline: Option<Baseline>,
    last_drained: Option<Instant>,
    gone_sent: bool,
    resync: bool,
}

impl SubEntry {
    fn new(filter: InterestFilter) -> Self {
        Self {
            filter,
            baseline: None,
            last_drained: None,
            gone_sent: false,
            resync: false,
        }
    }
}

#[derive(Default)]
struct ViewerSubs {
    subs: HashMap<WidgetPath, SubEntry>,
    pending: HashSet<WidgetPath>,
}

#[derive(Default)]
struct ViewerSlot {
    subs: Mutex<ViewerSubs>,
    notify: Notify,
}

enum Readiness {
    Ready,
    Throttled(Duration),
    Idle,
}

/// Tracks what every viewer watches and what it has already seen.
pub struct SubscriptionManager {
    viewers: RwLock<HashMap<ViewerId, Arc<ViewerSlot>>>,
    watchers: Mutex<HashMap<WidgetPath, HashSet<ViewerId>>>,
    registry: Arc<Registry>,
    changes: Arc<ChangeQueue>,
    activity: Arc<ActivityCoordinator>,
    router: Arc<ActionRouter>,
}

impl SubscriptionManager {
    pub(crate) fn new(
        registry: Arc<Registry>,
        changes: Arc<ChangeQueue>,
        activity: Arc<ActivityCoordinator>,
        router: Arc<ActionRouter>,
    ) -> Self {
        Self {
            viewers: RwLock::new(HashMap::new()),
            watchers: Mutex::new(HashMap::new()),
            registry,
            changes,
            activity,
            router,
        }
    }

    /// Creates the (empty) subscription table of a freshly connected viewer.
    pub(crate) fn attach(&self, viewer: ViewerId) {
        lock::write(&self.viewers).entry(viewer).or_default();
    }

    /// Moves queued registry changes into the pending sets of interested viewers.
    pub(crate) fn absorb(&self) {
        let changes = self.changes.take();
        if changes.is_empty() {
            return;
        }

        let mut per_viewer: HashMap<ViewerId, Vec<WidgetPath>> = HashMap::new();
        let mut appeared = Vec::new();
        let mut removed = false;
        {
            let watchers = lock::lock(&self.watchers);
            for change in &changes {
                removed |= change.kind == ChangeKind::Removed;
                let Some(set) = watchers.get(&change.path) else {
                    continue;
                };
                if change.kind == ChangeKind::Registered && !set.is_empty() {
                    appeared.push(change.path.clone());
                }
                for viewer in set {
                    per_viewer.entry(*viewer).or_default().push(change.path.clone());
                }
            }
        }

        {
            let viewers = lock::read(&self.viewers);
            for (viewer, paths) in per_viewer {
                let Some(slot) = viewers.get(&viewer) else {
                    continue;
                };
                let count = paths.len() as u64;
                {
                    let mut subs = lock::lock(&slot.subs);
                    for path in paths {
                        if subs.subs.contains_key(&path) {
                            subs.pending.insert(path);
                        }
                    }
                }
                if self.activity.state(viewer).is_gated() {
                    self.activity.defer(viewer, count);
                }
                slot.notify.notify_one();
            }
        }

        if removed {
            self.router.prune();
        }
        for path in appeared {
            self.router.notify_activity(&path, ActivityState::Awake);
        }
    }

    /// Creates or updates a subscription and returns the delta that brings the viewer up to
    /// date: a snapshot on first contact, `NoChange`/incremental when re-subscribing, `Gone`
    /// for a path that is not registered (yet).
    ///
    /// ### Errors
    /// - `InvalidPath` for a malformed path
    /// - `ViewerNotConnected` if the viewer is not connected
    pub fn subscribe(&self, viewer: ViewerId, path: &str, filter: InterestFilter) -> Result<Delta> {
        let path = WidgetPath::new(path)?;
        self.activity.subscribed(viewer)?;
        let slot = self
            .slot(viewer)
            .ok_or(EngineError::ViewerNotConnected { viewer })?;

        // Watch first: a change absorbed after this point finds the viewer and marks the
        // path pending, a change absorbed before it is already part of the delta below.
        let first = {
            let mut watchers = lock::lock(&self.watchers);
            let set = watchers.entry(path.clone()).or_default();
            set.insert(viewer) && set.len() == 1
        };

        let delta = {
            let mut subs = lock::lock(&slot.subs);
            let entry = subs
                .subs
                .entry(path.clone())
                .or_insert_with(|| SubEntry::new(filter));
            entry.filter = filter;
            let (_, delta) = self.next_delta(&path, entry);
            entry.last_drained = Some(Instant::now());
            subs.pending.remove(&path);
            delta
        };

        // lost a race with disconnect
        if self.slot(viewer).is_none() {
            self.drop_watch(viewer, &path);
            return Err(EngineError::ViewerNotConnected { viewer });
        }

        if first && delta != Delta::Gone {
            self.router.notify_activity(&path, ActivityState::Awake);
        }
        tracing::debug!(%viewer, %path, delta = delta.name(), "subscribed");
        Ok(delta)
    }

    /// Removes one subscription. Returns `false` if there was none.
    pub fn unsubscribe(&self, viewer: ViewerId, path: &str) -> Result<bool> {
        let path = WidgetPath::new(path)?;
        let Some(slot) = self.slot(viewer) else {
            return Ok(false);
        };
        let existed = {
            let mut subs = lock::lock(&slot.subs);
            subs.pending.remove(&path);
            subs.subs.remove(&path).is_some()
        };
        if existed {
            self.drop_watch(viewer, &path);
        }
        Ok(existed)
    }

    /// Forgets every subscription of the viewer and moves it to DISCONNECTED.
    ///
    /// Returns the activity state the viewer was in.
    pub fn disconnect(&self, viewer: ViewerId) -> ActivityState {
        let prior = self.activity.disconnect(viewer);
        let Some(slot) = lock::write(&self.viewers).remove(&viewer) else {
            return prior;
        };
        let paths: Vec<WidgetPath> = {
            let mut subs = lock::lock(&slot.subs);
            subs.pending.clear();
            subs.subs.drain().map(|(path, _)| path).collect()
        };
        for path in &paths {
            self.drop_watch(viewer, path);
        }
        slot.notify.notify_waiters();
        slot.notify.notify_one();
        prior
    }

    /// Computes and returns every pending delta for the viewer, in path-registration order.
    ///
    /// Suspended viewers get nothing; their pending set is kept. Paths throttled by
    /// `min_interval` stay pending. A removed widget yields `Gone` once, after all live paths.
    pub fn drain_pending(&self, viewer: ViewerId) -> Result<Vec<(WidgetPath, Delta)>> {
        self.absorb();
        let slot = self
            .slot(viewer)
            .ok_or(EngineError::ViewerNotConnected { viewer })?;
        if self.activity.state(viewer).is_gated() {
            return Ok(Vec::new());
        }

        let now = Instant::now();
        let mut out = Vec::new();
        {
            let mut guard = lock::lock(&slot.subs);
            let ViewerSubs { subs, pending } = &mut *guard;
            let mut held = Vec::new();
            for path in pending.drain() {
                let Some(entry) = subs.get_mut(&path) else {
                    continue;
                };
                if entry.filter.remaining(entry.last_drained, now).is_some() {
                    held.push(path);
                    continue;
                }
                let was_gone = entry.gone_sent;
                let (ordinal, delta) = self.next_delta(&path, entry);
                match delta {
                    Delta::NoChange { .. } => continue,
                    Delta::Gone if was_gone => continue,
                    _ => {}
                }
                entry.last_drained = Some(now);
                out.push((ordinal.unwrap_or(u64::MAX), path, delta));
            }
            pending.extend(held);
        }

        out.sort_by_key(|(ordinal, _, _)| *ordinal);
        Ok(out.into_iter().map(|(_, path, delta)| (path, delta)).collect())
    }

    /// Forgets the viewer's baseline for `path`; the next drain yields a full snapshot.
    ///
    /// Returns `false` if the viewer is not subscribed to the path.
    pub fn request_resync(&self, viewer: ViewerId, path: &str) -> Result<bool> {
        let path = WidgetPath::new(path)?;
        let slot = self
            .slot(viewer)
            .ok_or(EngineError::ViewerNotConnected { viewer })?;
        {
            let mut subs = lock::lock(&slot.subs);
            let Some(entry) = subs.subs.get_mut(&path) else {
                return Ok(false);
            };
            entry.resync = true;
            entry.gone_sent = false;
            entry.last_drained = None;
            subs.pending.insert(path);
        }
        slot.notify.notify_one();
        Ok(true)
    }

    /// Resolves once the viewer has something to drain.
    ///
    /// ### Errors
    /// `ViewerNotConnected` if the viewer is (or becomes) disconnected.
    pub async fn wait_pending(&self, viewer: ViewerId) -> Result<()> {
        loop {
            self.absorb();
            let slot = self
                .slot(viewer)
                .ok_or(EngineError::ViewerNotConnected { viewer })?;
            let wake = async {
                tokio::select! {
                    _ = slot.notify.notified() => {}
                    _ = self.changes.notified() => {}
                }
            };
            match self.readiness(viewer, &slot) {
                Readiness::Ready => return Ok(()),
                Readiness::Throttled(d) => {
                    let _ = tokio::time::timeout(d, wake).await;
                }
                Readiness::Idle => wake.await,
            }
        }
    }

    /// Wakes a viewer's waiter (after resume).
    pub(crate) fn wake(&self, viewer: ViewerId) {
        if let Some(slot) = self.slot(viewer) {
            slot.notify.notify_one();
        }
    }

    /// Number of viewers subscribed to `path`.
    pub fn watcher_count(&self, path: &str) -> usize {
        lock::lock(&self.watchers).get(path).map_or(0, HashSet::len)
    }

    /// Paths the viewer is subscribed to, sorted.
    pub fn subscriptions(&self, viewer: ViewerId) -> Vec<WidgetPath> {
        let Some(slot) = self.slot(viewer) else {
            return Vec::new();
        };
        let mut paths: Vec<_> = lock::lock(&slot.subs).subs.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of paths waiting to be drained for the viewer.
    pub fn pending_count(&self, viewer: ViewerId) -> usize {
        self.absorb();
        self.slot(viewer)
            .map_or(0, |slot| lock::lock(&slot.subs).pending.len())
    }

    fn slot(&self, viewer: ViewerId) -> Option<Arc<ViewerSlot>> {
        lock::read(&self.viewers).get(&viewer).cloned()
    }

    fn next_delta(&self, path: &WidgetPath, entry: &mut SubEntry) -> (Option<u64>, Delta) {
        let base = if entry.resync { None } else { entry.baseline };
        let (ordinal, mut delta) = self
            .registry
            .compute_delta(path.as_str(), base, entry.filter.computer());
        if std::mem::take(&mut entry.resync) {
            if let Delta::FullSnapshot(snapshot) = &mut delta {
                snapshot.resend = entry.baseline.is_some();
            }
        }
        entry.gone_sent = delta == Delta::Gone;
        entry.baseline = Baseline::after(entry.baseline, &delta);
        (ordinal, delta)
    }

    fn readiness(&self, viewer: ViewerId, slot: &ViewerSlot) -> Readiness {
        if self.activity.state(viewer).is_gated() {
            return Readiness::Idle;
        }
        let now = Instant::now();
        let subs = lock::lock(&slot.subs);
        let mut soonest: Option<Duration> = None;
        for path in &subs.pending {
            let Some(entry) = subs.subs.get(path) else {
                continue;
            };
            match entry.filter.remaining(entry.last_drained, now) {
                None => return Readiness::Ready,
                Some(d) => soonest = Some(soonest.map_or(d, |s| s.min(d))),
            }
        }
        soonest.map_or(Readiness::Idle, Readiness::Throttled)
    }

    fn drop_watch(&self, viewer: ViewerId, path: &WidgetPath) {
        let last = {
            let mut watchers = lock::lock(&self.watchers);
            match watchers.get_mut(path) {
                Some(set) => {
                    let had = set.remove(&viewer);
                    if set.is_empty() {
                        watchers.remove(path);
                    }
                    had && !watchers.contains_key(path)
                }
                None => false,
            }
        };
        if last {
            self.router.notify_activity(path, ActivityState::Suspend);
        }
    }
}
