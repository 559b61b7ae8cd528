//! # Engine: wiring, transport hooks and deterministic teardown.
//!
//! The [`Engine`] owns one instance of every component and the tasks that connect them.
//!
//! ## Architecture
//! ```text
//! application threads                          transport adapter (Transport::serve)
//!   register / update / remove                   on_connect / on_subscribe / drain_pending
//!        │                                       on_action_received / on_disconnect
//!        ▼                                                  │
//!   Registry ──push──► ChangeQueue ──► change pump ──► SubscriptionManager ◄──┘
//!        ▲                                   (absorb)       │ DeltaComputer
//!        │                                                  ▼
//!        │                                       ActivityCoordinator (gates viewers)
//!        │
//!   ActionRouter ──► per-widget queue ──► worker ──► ActionCallback
//!
//! every component ── publish(Event) ──► Bus ──► listener ──► SubscriberSet ──► Subscribe
//! ```
//!
//! ## Shutdown
//! ```text
//! shutdown()
//!   ├─► token.cancel()            → change pump and transports stop
//!   ├─► join pump + transports
//!   ├─► disconnect all viewers
//!   ├─► router.shutdown()         → callback queues close, workers finish
//!   ├─► publish(EngineStopped)    → listener forwards it and exits
//!   └─► subscribers.shutdown()    → subscriber queues drain
//! ```
//! After shutdown every mutating call fails with `ShutDown`. Dropping the last handle
//! cancels the token but does not wait for anything.
//!
//! ## Example
//! ```rust
//! use livedash::{Delta, EngineBuilder, EngineConfig, InterestFilter, Mutation, WidgetDescriptor, WidgetKind};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), livedash::EngineError> {
//!     let engine = EngineBuilder::new(EngineConfig::default()).build()?;
//!     engine.register("jobs.done", WidgetDescriptor::of(WidgetKind::Counter))?;
//!
//!     let viewer = engine.new_viewer_id();
//!     engine.on_connect(viewer)?;
//!     let first = engine.on_subscribe(viewer, "jobs.done", InterestFilter::default())?;
//!     assert!(first.is_snapshot());
//!
//!     engine.update("jobs.done", Mutation::Inc(1))?;
//!     let drained = engine.drain_pending(viewer)?;
//!     assert!(matches!(drained[0].1, Delta::Incremental { from: 0, to: 1, .. }));
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionEnvelope, CallbackRef};
use crate::core::activity::{ActivityCoordinator, ActivityState, ViewerId};
use crate::core::changes::ChangeQueue;
use crate::core::config::EngineConfig;
use crate::core::delta::Delta;
use crate::core::lock;
use crate::core::registry::{Registry, WidgetHandle, WidgetState};
use crate::core::router::ActionRouter;
use crate::core::subscriptions::{InterestFilter, SubscriptionManager};
use crate::error::{EngineError, Result};
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::SubscriberSet;
use crate::transport::Transport;
use crate::widgets::{Mutation, WidgetDescriptor, WidgetPath};

/// One live synchronization engine.
pub struct Engine {
    cfg: EngineConfig,
    bus: Bus,
    registry: Arc<Registry>,
    activity: Arc<ActivityCoordinator>,
    subs: Arc<SubscriptionManager>,
    router: Arc<ActionRouter>,
    subscribers: Arc<SubscriberSet>,
    token: CancellationToken,
    next_viewer: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

pub(crate) struct EngineParts {
    pub cfg: EngineConfig,
    pub bus: Bus,
    pub registry: Arc<Registry>,
    pub activity: Arc<ActivityCoordinator>,
    pub subs: Arc<SubscriptionManager>,
    pub router: Arc<ActionRouter>,
    pub subscribers: Arc<SubscriberSet>,
}

impl Engine {
    pub(crate) fn new_internal(parts: EngineParts) -> Self {
        let EngineParts {
            cfg,
            bus,
            registry,
            activity,
            subs,
            router,
            subscribers,
        } = parts;
        Self {
            cfg,
            bus,
            registry,
            activity,
            subs,
            router,
            subscribers,
            token: CancellationToken::new(),
            next_viewer: AtomicU64::new(1),
            tasks: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Spawns the subscriber listener, the change pump and every transport.
    pub(crate) fn start(
        self: &Arc<Self>,
        rt: &Handle,
        changes: Arc<ChangeQueue>,
        transports: Vec<Arc<dyn Transport>>,
    ) {
        *lock::lock(&self.listener) = Some(self.subscriber_listener(rt));

        let mut tasks = lock::lock(&self.tasks);
        tasks.push(self.change_pump(rt, changes));
        for transport in transports {
            tasks.push(self.run_transport(rt, transport));
        }
    }

    // === Registry ===

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// See [`Registry::register`].
    pub fn register(&self, path: &str, descriptor: WidgetDescriptor) -> Result<WidgetHandle> {
        self.ensure_running()?;
        self.registry.register(path, descriptor)
    }

    /// See [`Registry::update`].
    pub fn update(&self, path: &str, mutation: Mutation) -> Result<u64> {
        self.ensure_running()?;
        self.registry.update(path, mutation)
    }

    /// See [`Registry::remove`].
    pub fn remove(&self, path: &str) -> Result<()> {
        self.ensure_running()?;
        self.registry.remove(path)
    }

    /// See [`Registry::read`].
    pub fn read(&self, path: &str) -> Result<(WidgetDescriptor, WidgetState)> {
        self.registry.read(path)
    }

    pub fn rebind_callback(&self, path: &str, callback: CallbackRef) -> Result<()> {
        self.ensure_running()?;
        self.registry.rebind_callback(path, callback)?;
        self.router.prune();
        Ok(())
    }

    pub fn unbind_callback(&self, path: &str) -> Result<()> {
        self.ensure_running()?;
        self.registry.unbind_callback(path)?;
        self.router.prune();
        Ok(())
    }

    // === Transport hooks ===

    /// Allocates an engine-unique viewer id.
    pub fn new_viewer_id(&self) -> ViewerId {
        ViewerId(self.next_viewer.fetch_add(1, Ordering::Relaxed))
    }

    /// DISCONNECTED → CONNECTED. Connecting an already connected viewer is a no-op.
    pub fn on_connect(&self, viewer: ViewerId) -> Result<()> {
        self.ensure_running()?;
        let prior = self.activity.connect(viewer)?;
        self.subs.attach(viewer);
        if prior == ActivityState::Disconnected {
            tracing::debug!(%viewer, "viewer connected");
            self.bus.publish(
                Event::new(EventKind::ViewerConnected)
                    .with_viewer(viewer)
                    .with_activity(ActivityState::Connected),
            );
        }
        Ok(())
    }

    /// Any state → DISCONNECTED; forgets every subscription of the viewer.
    pub fn on_disconnect(&self, viewer: ViewerId) {
        let prior = self.subs.disconnect(viewer);
        if prior != ActivityState::Disconnected {
            tracing::debug!(%viewer, %prior, "viewer disconnected");
            self.bus.publish(
                Event::new(EventKind::ViewerDisconnected)
                    .with_viewer(viewer)
                    .with_activity(prior),
            );
        }
    }

    /// See [`SubscriptionManager::subscribe`].
    pub fn on_subscribe(&self, viewer: ViewerId, path: &str, filter: InterestFilter) -> Result<Delta> {
        self.ensure_running()?;
        let delta = self.subs.subscribe(viewer, path, filter)?;
        let mut ev = Event::new(EventKind::Subscribed)
            .with_viewer(viewer)
            .with_path(path)
            .with_reason(delta.name());
        if let Some(revision) = delta.revision() {
            ev = ev.with_revision(revision);
        }
        self.bus.publish(ev);
        Ok(delta)
    }

    /// See [`SubscriptionManager::unsubscribe`].
    pub fn on_unsubscribe(&self, viewer: ViewerId, path: &str) -> Result<bool> {
        let removed = self.subs.unsubscribe(viewer, path)?;
        if removed {
            self.bus.publish(
                Event::new(EventKind::Unsubscribed)
                    .with_viewer(viewer)
                    .with_path(path),
            );
        }
        Ok(removed)
    }

    /// See [`ActionRouter::dispatch`].
    pub fn on_action_received(&self, viewer: ViewerId, envelope: ActionEnvelope) -> Result<()> {
        self.ensure_running()?;
        self.router.dispatch(viewer, envelope)
    }

    // === Viewer side ===

    /// See [`SubscriptionManager::drain_pending`].
    pub fn drain_pending(&self, viewer: ViewerId) -> Result<Vec<(WidgetPath, Delta)>> {
        self.subs.drain_pending(viewer)
    }

    /// Resolves once the viewer has something to drain, or fails when it disconnects or
    /// the engine shuts down.
    pub async fn wait_pending(&self, viewer: ViewerId) -> Result<()> {
        self.ensure_running()?;
        tokio::select! {
            res = self.subs.wait_pending(viewer) => res,
            _ = self.token.cancelled() => Err(EngineError::ShutDown),
        }
    }

    /// AWAKE / CONNECTED → SUSPEND: no deltas are computed until [`Engine::resume`].
    pub fn suspend(&self, viewer: ViewerId) -> Result<()> {
        let prior = self.activity.suspend(viewer)?;
        if prior != ActivityState::Suspend {
            self.bus
                .publish(Event::new(EventKind::ViewerSuspended).with_viewer(viewer));
        }
        Ok(())
    }

    /// SUSPEND → AWAKE. Returns how many notifications were deferred meanwhile.
    pub fn resume(&self, viewer: ViewerId) -> Result<u64> {
        let deferred = self.activity.resume(viewer)?;
        self.subs.wake(viewer);
        self.bus.publish(
            Event::new(EventKind::ViewerResumed)
                .with_viewer(viewer)
                .with_reason(format!("deferred={deferred}")),
        );
        Ok(deferred)
    }

    /// See [`SubscriptionManager::request_resync`].
    pub fn request_resync(&self, viewer: ViewerId, path: &str) -> Result<bool> {
        let marked = self.subs.request_resync(viewer, path)?;
        if marked {
            self.bus.publish(
                Event::new(EventKind::ResyncRequested)
                    .with_viewer(viewer)
                    .with_path(path),
            );
        }
        Ok(marked)
    }

    /// Current activity state of a viewer.
    pub fn activity(&self, viewer: ViewerId) -> ActivityState {
        self.activity.state(viewer)
    }

    pub fn coordinator(&self) -> &ActivityCoordinator {
        &self.activity
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subs
    }

    pub fn router(&self) -> &ActionRouter {
        &self.router
    }

    // === Lifecycle ===

    /// Receives every event published from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stops every task the engine started and waits for them. Idempotent.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("engine shutting down");
        self.token.cancel();

        let tasks = std::mem::take(&mut *lock::lock(&self.tasks));
        for task in tasks {
            let _ = task.await;
        }
        for viewer in self.activity.viewers() {
            self.on_disconnect(viewer);
        }
        self.router.shutdown().await;

        self.bus.publish(Event::new(EventKind::EngineStopped));
        let listener = lock::lock(&self.listener).take();
        if let Some(listener) = listener {
            let _ = listener.await;
        }
        self.subscribers.shutdown().await;
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(EngineError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Forwards bus events to the subscriber set until `EngineStopped`.
    fn subscriber_listener(&self, rt: &Handle) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subscribers);
        rt.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => {
                        let last = ev.kind == EventKind::EngineStopped;
                        set.emit(&ev);
                        if last {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Moves registry changes into viewers' pending sets as they happen.
    fn change_pump(&self, rt: &Handle, changes: Arc<ChangeQueue>) -> JoinHandle<()> {
        let subs = Arc::clone(&self.subs);
        let token = self.token.clone();
        rt.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = changes.notified() => subs.absorb(),
                }
            }
        })
    }

    fn run_transport(self: &Arc<Self>, rt: &Handle, transport: Arc<dyn Transport>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let bus = self.bus.clone();
        let token = self.token.child_token();
        rt.spawn(async move {
            let name: Arc<str> = Arc::from(transport.name());
            bus.publish(Event::new(EventKind::TransportStarted).with_name(Arc::clone(&name)));
            match transport.serve(engine, token).await {
                Ok(()) => {
                    bus.publish(Event::new(EventKind::TransportStopped).with_name(name));
                }
                Err(err) => {
                    tracing::error!(transport = %name, label = err.as_label(), %err, "transport failed");
                    bus.publish(
                        Event::new(EventKind::TransportFailed)
                            .with_name(name)
                            .with_reason(err.to_string()),
                    );
                }
            }
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, ActionEvent, CallbackFn};
    use crate::core::builder::EngineBuilder;
    use crate::error::{CallbackError, TransportError};
    use crate::widgets::{
        Row, SliderConfig, TableConfig, WidgetConfig, WidgetKind, WidgetValue,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn engine() -> Arc<Engine> {
        EngineBuilder::new(EngineConfig::default()).build().unwrap()
    }

    fn connect(engine: &Engine) -> ViewerId {
        let viewer = engine.new_viewer_id();
        engine.on_connect(viewer).unwrap();
        viewer
    }

    #[tokio::test]
    async fn test_table_rows_reconstructed_in_order() {
        let engine = engine();
        let cfg = WidgetConfig::Table(TableConfig::with_titles(["job", "state"]));
        engine.register("jobs", WidgetDescriptor::new(cfg)).unwrap();
        let viewer = connect(&engine);
        let Delta::FullSnapshot(first) = engine
            .on_subscribe(viewer, "jobs", InterestFilter::default())
            .unwrap()
        else {
            panic!("expected snapshot");
        };
        let mut replica = first.value;

        engine
            .update("jobs", Mutation::AppendRow(vec!["build".into(), "ok".into()]))
            .unwrap();
        engine
            .update("jobs", Mutation::AppendRow(vec!["test".into(), "running".into()]))
            .unwrap();
        for (_, delta) in engine.drain_pending(viewer).unwrap() {
            let Delta::Incremental { patches, .. } = delta else {
                panic!("expected incremental");
            };
            replica.apply_all(&patches).unwrap();
        }

        let live = engine.read("jobs").unwrap().1.value;
        assert_eq!(replica, live);
        let WidgetValue::Table(table) = &replica else {
            panic!("expected table");
        };
        let ids: Vec<Row> = table.rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, [Row(0), Row(1)]);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_after_disconnect_gets_live_snapshot() {
        let engine = engine();
        engine.register("c", WidgetDescriptor::of(WidgetKind::Counter)).unwrap();
        let viewer = connect(&engine);
        engine.on_subscribe(viewer, "c", InterestFilter::default()).unwrap();

        for _ in 0..10 {
            engine.update("c", Mutation::Inc(1)).unwrap();
        }
        engine.on_disconnect(viewer);
        for _ in 0..10 {
            engine.update("c", Mutation::Inc(1)).unwrap();
        }
        assert_eq!(engine.activity(viewer), ActivityState::Disconnected);

        engine.on_connect(viewer).unwrap();
        let Delta::FullSnapshot(snapshot) = engine
            .on_subscribe(viewer, "c", InterestFilter::default())
            .unwrap()
        else {
            panic!("expected snapshot");
        };
        let (_, live) = engine.read("c").unwrap();
        assert_eq!((snapshot.revision, snapshot.value), (live.revision, live.value));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_then_register_other_kind_is_fresh() {
        let engine = engine();
        let viewer = connect(&engine);
        engine.register("x", WidgetDescriptor::of(WidgetKind::Counter)).unwrap();
        engine.on_subscribe(viewer, "x", InterestFilter::default()).unwrap();
        engine.update("x", Mutation::Inc(7)).unwrap();
        engine.drain_pending(viewer).unwrap();

        engine.remove("x").unwrap();
        engine.register("x", WidgetDescriptor::of(WidgetKind::Gauge)).unwrap();
        let drained = engine.drain_pending(viewer).unwrap();
        assert_eq!(drained.len(), 1);
        let Delta::FullSnapshot(snapshot) = &drained[0].1 else {
            panic!("expected snapshot, got {:?}", drained[0].1);
        };
        assert_eq!(snapshot.kind(), WidgetKind::Gauge);
        assert_eq!((snapshot.revision, &snapshot.value), (0, &WidgetValue::Gauge(0.0)));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_action_round_trip_through_engine() {
        let engine = engine();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let cb = CallbackFn::arc("speed", move |ev: ActionEvent| {
            let tx = tx.clone();
            async move {
                if let Some(Action::Slider { new_value }) = ev.action {
                    let _ = tx.send(new_value);
                }
                Ok::<_, CallbackError>(())
            }
        });
        let slider = WidgetConfig::Slider(SliderConfig::default());
        engine
            .register("speed", WidgetDescriptor::new(slider).with_callback(cb))
            .unwrap();
        let viewer = connect(&engine);

        let raw = r#"{"target_path":"speed","action":{"type":"slider","new_value":40.0}}"#;
        let envelope = ActionEnvelope::from_json(raw).unwrap();
        engine.on_action_received(viewer, envelope).unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(got, Some(40.0));
        assert_eq!(engine.activity(viewer), ActivityState::Connected);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_suspend_resume_reports_deferred() {
        let engine = engine();
        engine.register("g", WidgetDescriptor::of(WidgetKind::Gauge)).unwrap();
        let viewer = connect(&engine);
        engine.on_subscribe(viewer, "g", InterestFilter::default()).unwrap();

        engine.suspend(viewer).unwrap();
        engine.update("g", Mutation::Set(1.5)).unwrap();
        assert!(engine.drain_pending(viewer).unwrap().is_empty());
        assert_eq!(engine.resume(viewer).unwrap(), 1);
        assert_eq!(engine.drain_pending(viewer).unwrap().len(), 1);

        engine.on_disconnect(viewer);
        assert_eq!(
            engine.suspend(viewer).unwrap_err().as_label(),
            "invalid_transition"
        );
        engine.shutdown().await;
    }

    struct Recording(Arc<Mutex<Vec<EventKind>>>);

    #[async_trait]
    impl crate::subscribers::Subscribe for Recording {
        async fn on_event(&self, ev: &Event) {
            lock::lock(&self.0).push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "recording"
        }
    }

    struct Idle;

    #[async_trait]
    impl Transport for Idle {
        fn name(&self) -> &str {
            "idle"
        }
        async fn serve(&self, _engine: Arc<Engine>, token: CancellationToken) -> std::result::Result<(), TransportError> {
            token.cancelled().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_is_ordered_and_final() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let engine = EngineBuilder::new(EngineConfig::default())
            .with_subscribers(vec![Arc::new(Recording(Arc::clone(&seen)))])
            .with_transport(Arc::new(Idle))
            .build()
            .unwrap();
        let viewer = connect(&engine);

        engine.shutdown().await;
        engine.shutdown().await;

        let seen = lock::lock(&seen).clone();
        assert_eq!(seen.last(), Some(&EventKind::EngineStopped));
        assert!(seen.contains(&EventKind::TransportStarted));
        assert!(seen.contains(&EventKind::TransportStopped));
        assert!(seen.contains(&EventKind::ViewerDisconnected));
        assert_eq!(engine.activity(viewer), ActivityState::Disconnected);
        assert_eq!(
            engine.register("late", WidgetDescriptor::of(WidgetKind::Counter)).unwrap_err(),
            EngineError::ShutDown
        );
        assert_eq!(engine.wait_pending(viewer).await.unwrap_err(), EngineError::ShutDown);
    }
}
