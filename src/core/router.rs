//! # Action router: inbound actions → per-widget callback workers.
//!
//! ```text
//! dispatch(viewer, envelope)
//!     │ viewer connected?            else ViewerNotConnected
//!     │ widget registered?           else UnknownPath
//!     │ payload fits kind & config?  else UnsupportedAction
//!     │ callback bound?              else UnsupportedAction
//!     ▼
//! viewer → ACTION ── try_send ──► [queue w1] ──► worker w1 ──► callback.on_action()
//! viewer → prior                  [queue w2] ──► worker w2 ──► ...
//! ```
//!
//! ## Rules
//! - One bounded queue and worker task per (widget incarnation, callback binding); a slow or
//!   panicking callback stalls only its own widget.
//! - A full queue fails the dispatch with `CallbackFailure`; nothing is retried.
//! - Callback errors and panics are caught and published as `CallbackFailed`.
//! - Dispatch never mutates widget state.
//! - Rebinding a callback replaces the worker lazily on the next delivery; removing a
//!   widget drops its worker on the next [`ActionRouter::prune`].

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::actions::{ActionEnvelope, ActionEvent};
use crate::core::activity::{ActivityCoordinator, ActivityState, ViewerId};
use crate::core::lock;
use crate::core::registry::{CallbackBinding, Registry};
use crate::error::{EngineError, Result};
use crate::events::{Bus, Event, EventKind, panic_message};
use crate::widgets::WidgetPath;

struct Worker {
    incarnation: u64,
    binding: u64,
    name: Arc<str>,
    tx: mpsc::Sender<ActionEvent>,
    join: JoinHandle<()>,
}

/// Delivers actions and activity notices to widget callbacks.
pub struct ActionRouter {
    registry: Arc<Registry>,
    activity: Arc<ActivityCoordinator>,
    bus: Bus,
    rt: Handle,
    default_capacity: usize,
    workers: Mutex<HashMap<WidgetPath, Worker>>,
}

impl ActionRouter {
    pub(crate) fn new(
        registry: Arc<Registry>,
        activity: Arc<ActivityCoordinator>,
        bus: Bus,
        rt: Handle,
        default_capacity: usize,
    ) -> Self {
        Self {
            registry,
            activity,
            bus,
            rt,
            default_capacity: default_capacity.max(1),
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Validates an action and queues it for the widget's callback.
    ///
    /// The viewer is in ACTION while the delivery is queued and returns to its prior state
    /// afterwards. Every outcome is published: `ActionDispatched` or `ActionRejected`.
    pub fn dispatch(&self, viewer: ViewerId, envelope: ActionEnvelope) -> Result<()> {
        let ActionEnvelope {
            target_path: path,
            action,
        } = envelope;

        let outcome = (|| {
            if self.activity.state(viewer) == ActivityState::Disconnected {
                return Err(EngineError::ViewerNotConnected { viewer });
            }
            let (incarnation, binding) = self.registry.action_target(path.as_str(), &action)?;
            let prior = self.activity.begin_action(viewer)?;
            let name = Arc::<str>::from(binding.callback.name());
            let queued = self.enqueue(
                &path,
                incarnation,
                &binding,
                ActionEvent::action(path.clone(), viewer, action),
            );
            self.activity.end_action(viewer, prior);
            queued.map(|()| name)
        })();

        match outcome {
            Ok(name) => {
                self.bus.publish(
                    Event::new(EventKind::ActionDispatched)
                        .with_viewer(viewer)
                        .with_path(&path)
                        .with_name(name),
                );
                Ok(())
            }
            Err(err) => {
                tracing::debug!(%viewer, %path, label = err.as_label(), "action rejected");
                self.bus.publish(
                    Event::new(EventKind::ActionRejected)
                        .with_viewer(viewer)
                        .with_path(&path)
                        .with_reason(format!("{}: {}", err.as_label(), err.as_message())),
                );
                Err(err)
            }
        }
    }

    /// Tells the widget's callback (if any) that its audience changed.
    pub(crate) fn notify_activity(&self, path: &WidgetPath, activity: ActivityState) {
        let Some((incarnation, binding)) = self.registry.callback_of(path.as_str()) else {
            return;
        };
        let ev = ActionEvent::activity(path.clone(), activity);
        if let Err(err) = self.enqueue(path, incarnation, &binding, ev) {
            tracing::debug!(%path, %activity, %err, "activity notice dropped");
        }
    }

    /// Drops workers whose widget was removed or whose callback was replaced.
    pub(crate) fn prune(&self) {
        let mut workers = lock::lock(&self.workers);
        workers.retain(|path, w| {
            self.registry
                .callback_of(path.as_str())
                .is_some_and(|(inc, b)| inc == w.incarnation && b.id == w.binding)
        });
    }

    /// Number of live callback workers.
    pub fn worker_count(&self) -> usize {
        lock::lock(&self.workers).len()
    }

    /// Closes every queue and waits for the workers to finish what they hold.
    pub(crate) async fn shutdown(&self) {
        let workers: Vec<Worker> = lock::lock(&self.workers).drain().map(|(_, w)| w).collect();
        let joins: Vec<JoinHandle<()>> = workers.into_iter().map(|w| w.join).collect();
        for join in joins {
            let _ = join.await;
        }
    }

    fn enqueue(
        &self,
        path: &WidgetPath,
        incarnation: u64,
        binding: &CallbackBinding,
        ev: ActionEvent,
    ) -> Result<()> {
        let mut workers = lock::lock(&self.workers);
        let stale = workers
            .get(path)
            .is_none_or(|w| w.incarnation != incarnation || w.binding != binding.id);
        if stale {
            // Replacing drops the old sender; the old worker finishes its queue and exits.
            workers.insert(path.clone(), self.spawn_worker(path, incarnation, binding));
        }
        let Some(worker) = workers.get(path) else {
            return Err(EngineError::CallbackFailure {
                path: path.to_string(),
                reason: "callback worker missing".into(),
            });
        };

        let activity = ev.activity;
        match worker.tx.try_send(ev) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.bus.publish(
                    Event::new(EventKind::CallbackOverflow)
                        .with_path(path)
                        .with_name(Arc::clone(&worker.name))
                        .with_activity(activity),
                );
                Err(EngineError::CallbackFailure {
                    path: path.to_string(),
                    reason: "callback queue full".into(),
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EngineError::CallbackFailure {
                path: path.to_string(),
                reason: "callback worker stopped".into(),
            }),
        }
    }

    fn spawn_worker(&self, path: &WidgetPath, incarnation: u64, binding: &CallbackBinding) -> Worker {
        let callback = Arc::clone(&binding.callback);
        let cap = callback
            .queue_capacity()
            .unwrap_or(self.default_capacity)
            .max(1);
        let name: Arc<str> = Arc::from(callback.name());
        let (tx, mut rx) = mpsc::channel::<ActionEvent>(cap);
        let bus = self.bus.clone();
        let worker_name = Arc::clone(&name);
        let worker_path = path.clone();

        let join = self.rt.spawn(async move {
            while let Some(ev) = rx.recv().await {
                let viewer = ev.viewer;
                let reason = match AssertUnwindSafe(callback.on_action(ev)).catch_unwind().await {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => format!("{}: {}", err.as_label(), err.as_message()),
                    Err(panic) => format!("panic: {}", panic_message(&*panic)),
                };
                tracing::warn!(path = %worker_path, callback = %worker_name, %reason, "callback failed");
                let mut event = Event::new(EventKind::CallbackFailed)
                    .with_path(&worker_path)
                    .with_name(Arc::clone(&worker_name))
                    .with_reason(reason);
                event.viewer = viewer;
                bus.publish(event);
            }
        });

        tracing::debug!(%path, callback = %name, cap, "callback worker started");
        Worker {
            incarnation,
            binding: binding.id,
            name,
            tx,
            join,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, CallbackFn, CallbackRef};
    use crate::core::changes::ChangeQueue;
    use crate::error::CallbackError;
    use crate::widgets::{SliderConfig, WidgetConfig, WidgetDescriptor, WidgetKind, WidgetValue};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedSender;

    struct Fixture {
        registry: Arc<Registry>,
        activity: Arc<ActivityCoordinator>,
        router: ActionRouter,
        bus: Bus,
    }

    fn fixture(capacity: usize) -> Fixture {
        let bus = Bus::new(64);
        let registry = Registry::new(Arc::new(ChangeQueue::new()), bus.clone(), 8, false);
        let activity = Arc::new(ActivityCoordinator::new(None));
        let router = ActionRouter::new(
            Arc::clone(&registry),
            Arc::clone(&activity),
            bus.clone(),
            Handle::current(),
            capacity,
        );
        Fixture {
            registry,
            activity,
            router,
            bus,
        }
    }

    fn forwarding(tx: UnboundedSender<ActionEvent>) -> CallbackRef {
        CallbackFn::arc("fwd", move |ev: ActionEvent| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(ev);
                Ok::<_, CallbackError>(())
            }
        })
    }

    fn slide(path: &str, v: f64) -> ActionEnvelope {
        ActionEnvelope::new(WidgetPath::new(path).unwrap(), Action::Slider { new_value: v })
    }

    #[tokio::test]
    async fn test_slider_without_callback_is_unsupported() {
        let f = fixture(4);
        let v = ViewerId(1);
        f.activity.connect(v).unwrap();
        let h = f
            .registry
            .register("ui.speed", WidgetDescriptor::new(WidgetConfig::Slider(SliderConfig::default())))
            .unwrap();

        let err = f.router.dispatch(v, slide("ui.speed", 5.0)).unwrap_err();
        assert_eq!(err.as_label(), "unsupported_action");
        assert_eq!(h.value().unwrap(), WidgetValue::Slider(0.0));
        assert_eq!(h.read().unwrap().1.revision, 0);
        assert_eq!(f.activity.state(v), ActivityState::Connected);
    }

    #[tokio::test]
    async fn test_delivers_typed_payload_and_restores_state() {
        let f = fixture(4);
        let v = ViewerId(1);
        f.activity.connect(v).unwrap();
        f.activity.subscribed(v).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        f.registry
            .register(
                "ui.speed",
                WidgetDescriptor::new(WidgetConfig::Slider(SliderConfig::default()))
                    .with_callback(forwarding(tx)),
            )
            .unwrap();

        f.router.dispatch(v, slide("ui.speed", 7.0)).unwrap();
        let ev = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(ev.activity, ActivityState::Action);
        assert_eq!(ev.viewer, Some(v));
        assert_eq!(ev.action, Some(Action::Slider { new_value: 7.0 }));
        assert_eq!(f.activity.state(v), ActivityState::Awake);
        // dispatch does not touch the widget
        assert_eq!(f.registry.read("ui.speed").unwrap().1.revision, 0);
    }

    #[tokio::test]
    async fn test_rejections() {
        let f = fixture(4);
        let v = ViewerId(1);
        let mut events = f.bus.subscribe();
        f.registry.register("c", WidgetDescriptor::of(WidgetKind::Counter)).unwrap();

        assert_eq!(
            f.router.dispatch(v, slide("c", 1.0)).unwrap_err(),
            EngineError::ViewerNotConnected { viewer: v }
        );
        f.activity.connect(v).unwrap();
        assert_eq!(f.router.dispatch(v, slide("missing", 1.0)).unwrap_err().as_label(), "unknown_path");
        assert_eq!(f.router.dispatch(v, slide("c", 1.0)).unwrap_err().as_label(), "unsupported_action");

        let mut rejected = 0;
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::ActionRejected {
                rejected += 1;
            }
        }
        assert_eq!(rejected, 3);
    }

    #[tokio::test]
    async fn test_full_queue_fails_dispatch() {
        let f = fixture(1);
        let v = ViewerId(1);
        f.activity.connect(v).unwrap();
        let gate = Arc::new(tokio::sync::Notify::new());
        let g = Arc::clone(&gate);
        let slow = CallbackFn::arc("slow", move |_ev: ActionEvent| {
            let g = Arc::clone(&g);
            async move {
                g.notified().await;
                Ok::<_, CallbackError>(())
            }
        });
        f.registry
            .register("sw", WidgetDescriptor::of(WidgetKind::Switch).with_callback(slow))
            .unwrap();
        let flip = || {
            ActionEnvelope::new(WidgetPath::new("sw").unwrap(), Action::Switch { new_state: true })
        };

        f.router.dispatch(v, flip()).unwrap();
        // let the worker pick up the first delivery and block on the gate
        tokio::time::sleep(Duration::from_millis(20)).await;
        f.router.dispatch(v, flip()).unwrap();
        let err = f.router.dispatch(v, flip()).unwrap_err();
        assert_eq!(err.as_label(), "callback_failure");
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn test_callback_panic_is_reported_and_worker_survives() {
        let f = fixture(4);
        let v = ViewerId(1);
        f.activity.connect(v).unwrap();
        let mut events = f.bus.subscribe();
        let cb = CallbackFn::arc("flaky", |ev: ActionEvent| async move {
            match ev.action {
                Some(Action::Switch { new_state: true }) => panic!("boom"),
                _ => Err::<(), _>(CallbackError::fail("nope")),
            }
        });
        f.registry
            .register("sw", WidgetDescriptor::of(WidgetKind::Switch).with_callback(cb))
            .unwrap();
        let flip = |on: bool| {
            ActionEnvelope::new(WidgetPath::new("sw").unwrap(), Action::Switch { new_state: on })
        };

        f.router.dispatch(v, flip(true)).unwrap();
        f.router.dispatch(v, flip(false)).unwrap();

        let mut reasons = Vec::new();
        while reasons.len() < 2 {
            let ev = tokio::time::timeout(Duration::from_secs(1), events.recv())
                .await
                .unwrap()
                .unwrap();
            if ev.kind == EventKind::CallbackFailed {
                assert_eq!(ev.name.as_deref(), Some("flaky"));
                assert_eq!(ev.viewer, Some(v));
                reasons.push(ev.reason.as_deref().unwrap_or_default().to_string());
            }
        }
        assert_eq!(reasons, ["panic: boom", "callback_failed: error: nope"]);
        assert_eq!(f.router.worker_count(), 1);
    }

    #[tokio::test]
    async fn test_prune_drops_removed_widgets() {
        let f = fixture(4);
        let v = ViewerId(1);
        f.activity.connect(v).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        f.registry
            .register("sw", WidgetDescriptor::of(WidgetKind::Switch).with_callback(forwarding(tx)))
            .unwrap();
        f.router
            .dispatch(v, ActionEnvelope::new(WidgetPath::new("sw").unwrap(), Action::Switch { new_state: false }))
            .unwrap();
        assert_eq!(f.router.worker_count(), 1);

        f.registry.remove("sw").unwrap();
        f.router.prune();
        assert_eq!(f.router.worker_count(), 0);
    }
}
