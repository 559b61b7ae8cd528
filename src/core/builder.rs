use std::sync::Arc;

use tokio::runtime::Handle;

use crate::core::activity::ActivityCoordinator;
use crate::core::changes::ChangeQueue;
use crate::core::config::EngineConfig;
use crate::core::engine::{Engine, EngineParts};
use crate::core::registry::Registry;
use crate::core::router::ActionRouter;
use crate::core::subscriptions::SubscriptionManager;
use crate::error::{EngineError, Result};
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::transport::Transport;

/// Builder for constructing an [`Engine`] with optional subscribers and transports.
pub struct EngineBuilder {
    cfg: EngineConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    transports: Vec<Arc<dyn Transport>>,
}

impl EngineBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: EngineConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            transports: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive engine events (widget lifecycle, viewer activity, action
    /// routing) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds a transport; the engine runs it until shutdown.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Builds the engine and spawns its tasks on the current tokio runtime.
    ///
    /// ### Errors
    /// `RuntimeUnavailable` when called outside a tokio runtime.
    pub fn build(self) -> Result<Arc<Engine>> {
        let rt = Handle::try_current().map_err(|_| EngineError::RuntimeUnavailable)?;
        let cfg = self.cfg;

        let bus = Bus::new(cfg.bus_capacity_clamped());
        let changes = Arc::new(ChangeQueue::new());
        let registry = Registry::new(
            Arc::clone(&changes),
            bus.clone(),
            cfg.history_window,
            cfg.publish_updates,
        );
        let activity = Arc::new(ActivityCoordinator::new(cfg.viewer_limit()));
        let router = Arc::new(ActionRouter::new(
            Arc::clone(&registry),
            Arc::clone(&activity),
            bus.clone(),
            rt.clone(),
            cfg.action_queue_capacity_clamped(),
        ));
        let subs = Arc::new(SubscriptionManager::new(
            Arc::clone(&registry),
            Arc::clone(&changes),
            Arc::clone(&activity),
            Arc::clone(&router),
        ));
        let subscribers = Arc::new(SubscriberSet::new(self.subscribers, bus.clone(), &rt));

        let engine = Arc::new(Engine::new_internal(EngineParts {
            cfg,
            bus,
            registry,
            activity,
            subs,
            router,
            subscribers,
        }));
        engine.start(&rt, changes, self.transports);
        Ok(engine)
    }
}
