//! # Widget registry: path-indexed, versioned widget store.
//!
//! The registry exclusively owns every widget's descriptor and state. Application threads
//! call it synchronously; it never awaits and never blocks on viewers.
//!
//! ## Architecture
//! ```text
//! register / update / remove
//!        │
//!        ▼
//! widgets: RwLock<HashMap<path, Slot>>      (held only to look up or insert a slot)
//!        │
//!        ▼
//! Slot = Arc<Mutex<WidgetCell>>             (per-widget: config, value, revision, history)
//!        │  plan → apply → revision += 1 → history.push
//!        ▼
//! ChangeQueue.push(path, revision)          (while the cell lock is still held)
//! ```
//!
//! ## Rules
//! - Mutations of one widget are serialized by its cell lock; different widgets never
//!   block each other.
//! - Revision starts at 0 and grows by exactly 1 per accepted mutation.
//! - A rejected mutation changes nothing (planning precedes any write).
//! - Reads copy the state under the cell lock.
//! - Re-registering with the same kind is a config update: revision unchanged,
//!   `config_epoch` bumped, history cleared.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use crate::actions::{Action, CallbackRef};
use crate::core::changes::{Change, ChangeKind, ChangeQueue};
use crate::core::delta::{Baseline, Current, Delta, DeltaComputer, History};
use crate::core::lock;
use crate::error::{EngineError, Result};
use crate::events::{Bus, Event, EventKind};
use crate::widgets::{
    Mutation, ObservationLog, Patch, Row, WidgetConfig, WidgetDescriptor, WidgetKind, WidgetPath,
    WidgetValue, now_ms,
};

/// A callback together with the id of this particular binding.
#[derive(Clone)]
pub(crate) struct CallbackBinding {
    pub id: u64,
    pub callback: CallbackRef,
}

impl fmt::Debug for CallbackBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackBinding")
            .field("id", &self.id)
            .field("callback", &self.callback.name())
            .finish()
    }
}

/// Point-in-time copy of a widget's state.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetState {
    pub revision: u64,
    pub value: WidgetValue,
    pub last_mutated_at: SystemTime,
}

struct WidgetCell {
    path: WidgetPath,
    incarnation: u64,
    ordinal: u64,
    config_epoch: u64,
    config: WidgetConfig,
    callback: Option<CallbackBinding>,
    revision: u64,
    value: WidgetValue,
    last_mutated_at: SystemTime,
    history: History,
    observations: ObservationLog,
    removed: bool,
}

type Slot = Arc<Mutex<WidgetCell>>;

/// Path-indexed store of widget descriptors and states.
pub struct Registry {
    widgets: RwLock<HashMap<WidgetPath, Slot>>,
    changes: Arc<ChangeQueue>,
    bus: Bus,
    history_window: usize,
    publish_updates: bool,
    next_incarnation: AtomicU64,
    next_ordinal: AtomicU64,
    next_binding: AtomicU64,
}

impl Registry {
    pub(crate) fn new(
        changes: Arc<ChangeQueue>,
        bus: Bus,
        history_window: usize,
        publish_updates: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            widgets: RwLock::new(HashMap::new()),
            changes,
            bus,
            history_window,
            publish_updates,
            next_incarnation: AtomicU64::new(1),
            next_ordinal: AtomicU64::new(0),
            next_binding: AtomicU64::new(1),
        })
    }

    /// Registers a widget, or updates the config of an existing one of the same kind.
    ///
    /// ### Errors
    /// - `InvalidPath` for a malformed path
    /// - `InvalidConfig` for an inconsistent config, or a callback on a display widget
    /// - `DuplicatePath` if the path holds a widget of another kind
    pub fn register(self: &Arc<Self>, path: &str, descriptor: WidgetDescriptor) -> Result<WidgetHandle> {
        let path = WidgetPath::new(path)?;
        descriptor.validate()?;
        let kind = descriptor.kind();
        let WidgetDescriptor { config, callback } = descriptor;

        let mut widgets = lock::write(&self.widgets);
        if let Some(slot) = widgets.get(&path).cloned() {
            drop(widgets);
            return self.reconfigure(&slot, path, config, callback);
        }

        let incarnation = self.next_incarnation.fetch_add(1, Ordering::Relaxed);
        let cell = WidgetCell {
            path: path.clone(),
            incarnation,
            ordinal: self.next_ordinal.fetch_add(1, Ordering::Relaxed),
            config_epoch: 0,
            value: WidgetValue::initial(&config),
            config,
            callback: callback.map(|cb| self.bind(cb)),
            revision: 0,
            last_mutated_at: SystemTime::now(),
            history: History::new(self.history_window),
            observations: ObservationLog::default(),
            removed: false,
        };
        widgets.insert(path.clone(), Arc::new(Mutex::new(cell)));
        self.changes.push(Change {
            path: path.clone(),
            kind: ChangeKind::Registered,
            revision: 0,
        });
        drop(widgets);

        tracing::debug!(%path, %kind, incarnation, "widget registered");
        self.bus.publish(
            Event::new(EventKind::WidgetRegistered)
                .with_path(&path)
                .with_revision(0),
        );
        Ok(WidgetHandle {
            registry: Arc::clone(self),
            path,
            kind,
            incarnation,
        })
    }

    fn reconfigure(
        self: &Arc<Self>,
        slot: &Slot,
        path: WidgetPath,
        config: WidgetConfig,
        callback: Option<CallbackRef>,
    ) -> Result<WidgetHandle> {
        let mut guard = lock::lock(slot);
        let cell = &mut *guard;
        let existing = cell.config.kind();
        let requested = config.kind();
        if cell.removed {
            // Lost a race with remove(); the caller can simply retry.
            return Err(EngineError::WidgetGone {
                path: path.to_string(),
            });
        }
        if existing != requested {
            return Err(EngineError::DuplicatePath {
                path: path.to_string(),
                existing,
                requested,
            });
        }

        if let Some(cb) = callback {
            cell.callback = Some(self.bind(cb));
        }
        let changed = cell.config != config;
        if changed {
            cell.config = config;
            cell.config_epoch += 1;
            if !cell.value.reconfigure(&cell.config) {
                cell.observations.clear();
            }
            cell.history.clear();
            self.changes.push(Change {
                path: path.clone(),
                kind: ChangeKind::Reconfigured,
                revision: cell.revision,
            });
        }
        let (incarnation, revision, epoch) = (cell.incarnation, cell.revision, cell.config_epoch);
        drop(guard);

        if changed {
            tracing::debug!(%path, epoch, "widget reconfigured");
            self.bus.publish(
                Event::new(EventKind::WidgetReconfigured)
                    .with_path(&path)
                    .with_revision(revision)
                    .with_reason(format!("config_epoch={epoch}")),
            );
        }
        Ok(WidgetHandle {
            registry: Arc::clone(self),
            path,
            kind: requested,
            incarnation,
        })
    }

    /// Applies a mutation and returns the new revision.
    ///
    /// ### Errors
    /// - `UnknownPath` if nothing is registered at `path`
    /// - `TypeMismatch` if the mutation does not fit the widget kind
    /// - `InvalidValue` for out-of-range or non-finite values (no revision bump)
    pub fn update(&self, path: &str, mutation: Mutation) -> Result<u64> {
        self.mutate(path, None, &mutation, |_| ()).map(|(revision, ())| revision)
    }

    /// Commits `mutation` and lets `inspect` look at the applied patches while the widget
    /// lock is still held.
    fn mutate<T>(
        &self,
        path: &str,
        expected: Option<u64>,
        mutation: &Mutation,
        inspect: impl FnOnce(&[Patch]) -> T,
    ) -> Result<(u64, T)> {
        let missing = || match expected {
            Some(_) => EngineError::WidgetGone { path: path.into() },
            None => EngineError::UnknownPath { path: path.into() },
        };
        let slot = self.slot(path).ok_or_else(missing)?;
        let mut guard = lock::lock(&slot);
        let cell = &mut *guard;
        if cell.removed {
            return Err(missing());
        }
        if expected.is_some_and(|i| i != cell.incarnation) {
            return Err(EngineError::WidgetGone { path: path.into() });
        }

        let now = now_ms();
        let patches = mutation.plan(&cell.path, &cell.config, &cell.value, &cell.observations, now)?;
        if let Err(err) = cell.value.apply_all(&patches) {
            tracing::error!(path, %err, mutation = mutation.name(), "planned patches did not apply");
            return Err(EngineError::invalid_value(path, err.to_string()));
        }
        if let (Mutation::Observe(x), WidgetConfig::Histogram(c), WidgetValue::Histogram(h)) =
            (mutation, &cell.config, &cell.value)
        {
            cell.observations.record(c, h, *x, now);
        }
        cell.revision += 1;
        cell.last_mutated_at = SystemTime::now();
        let revision = cell.revision;
        let seen = inspect(&patches);
        cell.history.push(revision, patches);
        self.changes.push(Change {
            path: cell.path.clone(),
            kind: ChangeKind::Updated,
            revision,
        });
        drop(guard);

        if self.publish_updates {
            self.bus.publish(
                Event::new(EventKind::WidgetUpdated)
                    .with_path(path)
                    .with_revision(revision)
                    .with_reason(mutation.name()),
            );
        }
        Ok((revision, seen))
    }

    /// Removes a widget. Subscriptions to it see `Gone` on their next drain.
    pub fn remove(&self, path: &str) -> Result<()> {
        self.remove_checked(path, None)
    }

    fn remove_checked(&self, path: &str, expected: Option<u64>) -> Result<()> {
        let mut widgets = lock::write(&self.widgets);
        let Some(slot) = widgets.get(path).cloned() else {
            return Err(match expected {
                Some(_) => EngineError::WidgetGone { path: path.into() },
                None => EngineError::UnknownPath { path: path.into() },
            });
        };
        let mut cell = lock::lock(&slot);
        if expected.is_some_and(|i| i != cell.incarnation) {
            return Err(EngineError::WidgetGone { path: path.into() });
        }
        widgets.remove(path);
        cell.removed = true;
        let revision = cell.revision;
        self.changes.push(Change {
            path: cell.path.clone(),
            kind: ChangeKind::Removed,
            revision,
        });
        drop(cell);
        drop(widgets);

        tracing::debug!(path, revision, "widget removed");
        self.bus.publish(
            Event::new(EventKind::WidgetRemoved)
                .with_path(path)
                .with_revision(revision),
        );
        Ok(())
    }

    /// Consistent point-in-time copy of descriptor and state.
    pub fn read(&self, path: &str) -> Result<(WidgetDescriptor, WidgetState)> {
        self.read_checked(path, None)
    }

    fn read_checked(&self, path: &str, expected: Option<u64>) -> Result<(WidgetDescriptor, WidgetState)> {
        let gone = || match expected {
            Some(_) => EngineError::WidgetGone { path: path.into() },
            None => EngineError::UnknownPath { path: path.into() },
        };
        let slot = self.slot(path).ok_or_else(gone)?;
        let cell = lock::lock(&slot);
        if cell.removed || expected.is_some_and(|i| i != cell.incarnation) {
            return Err(gone());
        }
        Ok((
            WidgetDescriptor {
                config: cell.config.clone(),
                callback: cell.callback.as_ref().map(|b| Arc::clone(&b.callback)),
            },
            WidgetState {
                revision: cell.revision,
                value: cell.value.clone(),
                last_mutated_at: cell.last_mutated_at,
            },
        ))
    }

    /// Replaces the action callback of an interactive widget.
    pub fn rebind_callback(&self, path: &str, callback: CallbackRef) -> Result<()> {
        self.set_callback(path, None, Some(callback))
    }

    /// Removes the action callback; later actions fail with `UnsupportedAction`.
    pub fn unbind_callback(&self, path: &str) -> Result<()> {
        self.set_callback(path, None, None)
    }

    fn set_callback(
        &self,
        path: &str,
        expected: Option<u64>,
        callback: Option<CallbackRef>,
    ) -> Result<()> {
        let missing = || match expected {
            Some(_) => EngineError::WidgetGone { path: path.into() },
            None => EngineError::UnknownPath { path: path.into() },
        };
        let slot = self.slot(path).ok_or_else(missing)?;
        let mut cell = lock::lock(&slot);
        if cell.removed {
            return Err(missing());
        }
        if expected.is_some_and(|i| i != cell.incarnation) {
            return Err(EngineError::WidgetGone { path: path.into() });
        }
        let kind = cell.config.kind();
        if !kind.is_interactive() {
            return Err(EngineError::unsupported(
                path,
                format!("{kind} widgets do not take callbacks"),
            ));
        }
        cell.callback = callback.map(|cb| self.bind(cb));
        Ok(())
    }

    /// Registered paths in registration order.
    pub fn paths(&self) -> Vec<WidgetPath> {
        let widgets = lock::read(&self.widgets);
        let mut entries: Vec<(u64, WidgetPath)> = widgets
            .iter()
            .map(|(path, slot)| (lock::lock(slot).ordinal, path.clone()))
            .collect();
        drop(widgets);
        entries.sort_unstable_by_key(|(ordinal, _)| *ordinal);
        entries.into_iter().map(|(_, p)| p).collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        lock::read(&self.widgets).contains_key(path)
    }

    pub fn len(&self) -> usize {
        lock::read(&self.widgets).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delta for a viewer at `baseline`, plus the widget's registration ordinal.
    pub(crate) fn compute_delta(
        &self,
        path: &str,
        baseline: Option<Baseline>,
        computer: DeltaComputer,
    ) -> (Option<u64>, Delta) {
        let Some(slot) = self.slot(path) else {
            return (None, Delta::Gone);
        };
        let cell = lock::lock(&slot);
        if cell.removed {
            return (None, Delta::Gone);
        }
        let current = Current {
            path: &cell.path,
            incarnation: cell.incarnation,
            config_epoch: cell.config_epoch,
            revision: cell.revision,
            config: &cell.config,
            value: &cell.value,
            history: &cell.history,
        };
        (Some(cell.ordinal), computer.compute(Some(current), baseline))
    }

    /// Validates an inbound action and returns the widget's incarnation and callback.
    pub(crate) fn action_target(&self, path: &str, action: &Action) -> Result<(u64, CallbackBinding)> {
        let slot = self
            .slot(path)
            .ok_or_else(|| EngineError::UnknownPath { path: path.into() })?;
        let cell = lock::lock(&slot);
        if cell.removed {
            return Err(EngineError::UnknownPath { path: path.into() });
        }
        action.validate(&cell.path, &cell.config)?;
        let binding = cell
            .callback
            .clone()
            .ok_or_else(|| EngineError::unsupported(path, "no callback bound"))?;
        Ok((cell.incarnation, binding))
    }

    /// Incarnation and callback binding of an interactive widget, if any.
    pub(crate) fn callback_of(&self, path: &str) -> Option<(u64, CallbackBinding)> {
        let slot = self.slot(path)?;
        let cell = lock::lock(&slot);
        if cell.removed {
            return None;
        }
        cell.callback.clone().map(|b| (cell.incarnation, b))
    }

    fn slot(&self, path: &str) -> Option<Slot> {
        lock::read(&self.widgets).get(path).cloned()
    }

    fn bind(&self, callback: CallbackRef) -> CallbackBinding {
        CallbackBinding {
            id: self.next_binding.fetch_add(1, Ordering::Relaxed),
            callback,
        }
    }
}

/// Reference to one registration of a widget.
///
/// Remembers the incarnation it was created for: once the widget is removed (or removed
/// and registered again) every call fails with `WidgetGone`.
#[derive(Clone)]
pub struct WidgetHandle {
    registry: Arc<Registry>,
    path: WidgetPath,
    kind: WidgetKind,
    incarnation: u64,
}

impl WidgetHandle {
    pub fn path(&self) -> &WidgetPath {
        &self.path
    }

    pub fn kind(&self) -> WidgetKind {
        self.kind
    }

    pub fn incarnation(&self) -> u64 {
        self.incarnation
    }

    /// Applies a mutation to this registration; returns the new revision.
    pub fn update(&self, mutation: Mutation) -> Result<u64> {
        self.registry
            .mutate(self.path.as_str(), Some(self.incarnation), &mutation, |_| ())
            .map(|(revision, ())| revision)
    }

    /// Appends a table row; returns the new revision and the id the commit gave the row.
    pub(crate) fn append_row(&self, cells: Vec<String>) -> Result<(u64, Row)> {
        let mutation = Mutation::AppendRow(cells);
        let (revision, row) =
            self.registry
                .mutate(self.path.as_str(), Some(self.incarnation), &mutation, |patches| {
                    patches.iter().find_map(|p| match p {
                        Patch::RowAdded { row } => Some(*row),
                        _ => None,
                    })
                })?;
        let row = row.ok_or_else(|| EngineError::TypeMismatch {
            path: self.path.to_string(),
            kind: self.kind,
            mutation: mutation.name(),
        })?;
        Ok((revision, row))
    }

    pub fn read(&self) -> Result<(WidgetDescriptor, WidgetState)> {
        self.registry.read_checked(self.path.as_str(), Some(self.incarnation))
    }

    /// Current value (copy).
    pub fn value(&self) -> Result<WidgetValue> {
        self.read().map(|(_, state)| state.value)
    }

    /// True while this registration is still the live one.
    pub fn is_alive(&self) -> bool {
        self.read().is_ok()
    }

    /// Removes this registration (not a later one at the same path).
    pub fn remove(&self) -> Result<()> {
        self.registry.remove_checked(self.path.as_str(), Some(self.incarnation))
    }

    /// Replaces the action callback of this registration.
    pub fn rebind_callback(&self, callback: CallbackRef) -> Result<()> {
        self.registry
            .set_callback(self.path.as_str(), Some(self.incarnation), Some(callback))
    }

    pub fn unbind_callback(&self) -> Result<()> {
        self.registry
            .set_callback(self.path.as_str(), Some(self.incarnation), None)
    }
}

impl fmt::Debug for WidgetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetHandle")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("incarnation", &self.incarnation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionEvent, CallbackFn};
    use crate::error::CallbackError;
    use crate::widgets::{Row, SliderConfig, TableConfig};
    use pretty_assertions::assert_eq;

    fn registry() -> (Arc<Registry>, Arc<ChangeQueue>) {
        let changes = Arc::new(ChangeQueue::new());
        (Registry::new(Arc::clone(&changes), Bus::new(64), 8, true), changes)
    }

    fn noop() -> CallbackRef {
        CallbackFn::arc("noop", |_ev: ActionEvent| async { Ok::<_, CallbackError>(()) })
    }

    #[test]
    fn test_concurrent_increments() {
        let (reg, _) = registry();
        reg.register("jobs.done", WidgetDescriptor::of(WidgetKind::Counter))
            .unwrap();

        let threads: Vec<_> = (0..3)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || reg.update("jobs.done", Mutation::Inc(1)).unwrap())
            })
            .collect();
        let mut revisions: Vec<u64> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        revisions.sort_unstable();

        assert_eq!(revisions, [1, 2, 3]);
        let (_, state) = reg.read("jobs.done").unwrap();
        assert_eq!(state.revision, 3);
        assert_eq!(state.value, WidgetValue::Counter(3));
    }

    #[test]
    fn test_errors_leave_state_untouched() {
        let (reg, _) = registry();
        reg.register("g", WidgetDescriptor::of(WidgetKind::Gauge)).unwrap();

        assert_eq!(reg.update("g", Mutation::Inc(1)).unwrap_err().as_label(), "type_mismatch");
        assert_eq!(reg.update("g", Mutation::Set(f64::NAN)).unwrap_err().as_label(), "invalid_value");
        assert_eq!(reg.update("nope", Mutation::Set(1.0)).unwrap_err().as_label(), "unknown_path");
        assert_eq!(reg.read("g").unwrap().1.revision, 0);
    }

    #[test]
    fn test_duplicate_path_with_other_kind() {
        let (reg, _) = registry();
        reg.register("x", WidgetDescriptor::of(WidgetKind::Counter)).unwrap();
        let err = reg
            .register("x", WidgetDescriptor::of(WidgetKind::Gauge))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::DuplicatePath {
                path: "x".into(),
                existing: WidgetKind::Counter,
                requested: WidgetKind::Gauge
            }
        );
    }

    #[test]
    fn test_config_update_keeps_revision() {
        let (reg, changes) = registry();
        let h = reg
            .register("t", WidgetDescriptor::new(WidgetConfig::Table(TableConfig::with_titles(["a"]))))
            .unwrap();
        h.update(Mutation::AppendRow(vec!["1".into()])).unwrap();
        changes.take();

        let h2 = reg
            .register("t", WidgetDescriptor::new(WidgetConfig::Table(TableConfig::with_titles(["a", "b"]))))
            .unwrap();
        assert_eq!(h2.incarnation(), h.incarnation());
        let (desc, state) = reg.read("t").unwrap();
        assert_eq!(state.revision, 1);
        assert_eq!(desc.config, WidgetConfig::Table(TableConfig::with_titles(["a", "b"])));
        let taken = changes.take();
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].kind, ChangeKind::Reconfigured);

        // identical config: nothing to announce
        reg.register("t", WidgetDescriptor::new(WidgetConfig::Table(TableConfig::with_titles(["a", "b"]))))
            .unwrap();
        assert!(changes.take().is_empty());
    }

    #[test]
    fn test_handle_is_bound_to_incarnation() {
        let (reg, _) = registry();
        let old = reg.register("w", WidgetDescriptor::of(WidgetKind::Counter)).unwrap();
        old.update(Mutation::Inc(5)).unwrap();
        reg.remove("w").unwrap();
        assert_eq!(old.update(Mutation::Inc(1)).unwrap_err().as_label(), "widget_gone");

        let fresh = reg.register("w", WidgetDescriptor::of(WidgetKind::Table)).unwrap();
        assert_ne!(fresh.incarnation(), old.incarnation());
        assert!(!old.is_alive());
        assert_eq!(old.remove().unwrap_err().as_label(), "widget_gone");

        let (_, state) = reg.read("w").unwrap();
        assert_eq!(state.revision, 0);
        fresh.update(Mutation::AddRow(Row(0))).unwrap();
        assert_eq!(reg.read("w").unwrap().0.kind(), WidgetKind::Table);
    }

    #[test]
    fn test_paths_in_registration_order() {
        let (reg, _) = registry();
        for p in ["z", "a", "m"] {
            reg.register(p, WidgetDescriptor::of(WidgetKind::Gauge)).unwrap();
        }
        reg.remove("a").unwrap();
        reg.register("a", WidgetDescriptor::of(WidgetKind::Gauge)).unwrap();
        let paths: Vec<String> = reg.paths().into_iter().map(String::from).collect();
        assert_eq!(paths, ["z", "m", "a"]);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_callbacks_only_on_interactive_widgets() {
        let (reg, _) = registry();
        let err = reg
            .register("c", WidgetDescriptor::of(WidgetKind::Counter).with_callback(noop()))
            .unwrap_err();
        assert_eq!(err.as_label(), "invalid_config");

        reg.register("c", WidgetDescriptor::of(WidgetKind::Counter)).unwrap();
        assert_eq!(reg.rebind_callback("c", noop()).unwrap_err().as_label(), "unsupported_action");

        reg.register("s", WidgetDescriptor::new(WidgetConfig::Slider(SliderConfig::default())))
            .unwrap();
        let action = Action::Slider { new_value: 1.0 };
        assert_eq!(
            reg.action_target("s", &action).unwrap_err().as_label(),
            "unsupported_action"
        );
        reg.rebind_callback("s", noop()).unwrap();
        let (_, first) = reg.action_target("s", &action).unwrap();
        reg.rebind_callback("s", noop()).unwrap();
        let (_, second) = reg.action_target("s", &action).unwrap();
        assert_ne!(first.id, second.id);
        reg.unbind_callback("s").unwrap();
        assert!(reg.callback_of("s").is_none());
    }

    #[test]
    fn test_register_publishes_events() {
        let changes = Arc::new(ChangeQueue::new());
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let reg = Registry::new(changes, bus, 8, true);
        reg.register("e", WidgetDescriptor::of(WidgetKind::Counter)).unwrap();
        reg.update("e", Mutation::Step).unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.kind, EventKind::WidgetRegistered);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.kind, EventKind::WidgetUpdated);
        assert_eq!(second.revision, Some(1));
        assert_eq!(second.reason.as_deref(), Some("step"));
    }
}
