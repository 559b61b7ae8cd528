//! # In-process viewer.
//!
//! [`LocalViewer`] drives the transport hooks directly and keeps a [`WidgetReplica`] per
//! subscribed path. It is what a remote dashboard does, minus the network:
//!
//! ```text
//! LocalViewer::connect ──► on_connect
//! subscribe(path)      ──► on_subscribe ──► replica = snapshot
//! sync()               ──► drain_pending ──► replica.apply(delta)
//!                                   └─ gap or bad patch ──► request_resync
//! act(path, action)    ──► on_action_received
//! drop                 ──► on_disconnect
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::actions::{Action, ActionEnvelope};
use crate::core::{ActivityState, Delta, Engine, InterestFilter, ViewerId, lock};
use crate::error::Result;
use crate::transport::WidgetReplica;
use crate::widgets::{WidgetPath, WidgetValue};

/// A viewer living in the same process as the engine.
pub struct LocalViewer {
    engine: Arc<Engine>,
    id: ViewerId,
    replicas: Mutex<BTreeMap<WidgetPath, WidgetReplica>>,
    connected: AtomicBool,
}

impl LocalViewer {
    /// Connects a new viewer.
    ///
    /// ### Errors
    /// `TooManyViewers` when the engine's viewer limit is reached, `ShutDown` after shutdown.
    pub fn connect(engine: &Arc<Engine>) -> Result<Self> {
        let id = engine.new_viewer_id();
        engine.on_connect(id)?;
        Ok(Self {
            engine: Arc::clone(engine),
            id,
            replicas: Mutex::new(BTreeMap::new()),
            connected: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> ViewerId {
        self.id
    }

    pub fn state(&self) -> ActivityState {
        self.engine.activity(self.id)
    }

    pub fn subscribe(&self, path: &str) -> Result<Delta> {
        self.subscribe_with(path, InterestFilter::default())
    }

    pub fn subscribe_with(&self, path: &str, filter: InterestFilter) -> Result<Delta> {
        let key = WidgetPath::new(path)?;
        let delta = self.engine.on_subscribe(self.id, path, filter)?;
        self.follow(&key, &delta);
        Ok(delta)
    }

    pub fn unsubscribe(&self, path: &str) -> Result<bool> {
        let removed = self.engine.on_unsubscribe(self.id, path)?;
        lock::lock(&self.replicas).remove(path);
        Ok(removed)
    }

    /// Drains pending deltas into the replicas. Returns how many deltas were applied.
    pub fn sync(&self) -> Result<usize> {
        let drained = self.engine.drain_pending(self.id)?;
        for (path, delta) in &drained {
            self.follow(path, delta);
        }
        Ok(drained.len())
    }

    /// Waits for pending work, then syncs.
    pub async fn wait_and_sync(&self) -> Result<usize> {
        self.engine.wait_pending(self.id).await?;
        self.sync()
    }

    pub fn replica(&self, path: &str) -> Option<WidgetReplica> {
        lock::lock(&self.replicas).get(path).cloned()
    }

    pub fn value(&self, path: &str) -> Option<WidgetValue> {
        lock::lock(&self.replicas).get(path).map(|r| r.value.clone())
    }

    /// Paths with a live replica, sorted.
    pub fn paths(&self) -> Vec<WidgetPath> {
        lock::lock(&self.replicas).keys().cloned().collect()
    }

    /// Sends an action to the widget at `path`.
    pub fn act(&self, path: &str, action: Action) -> Result<()> {
        let envelope = ActionEnvelope::new(WidgetPath::new(path)?, action);
        self.engine.on_action_received(self.id, envelope)
    }

    pub fn suspend(&self) -> Result<()> {
        self.engine.suspend(self.id)
    }

    pub fn resume(&self) -> Result<u64> {
        self.engine.resume(self.id)
    }

    pub fn resync(&self, path: &str) -> Result<bool> {
        self.engine.request_resync(self.id, path)
    }

    /// Disconnects and drops every replica. Also done on drop.
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.engine.on_disconnect(self.id);
            lock::lock(&self.replicas).clear();
        }
    }

    fn follow(&self, path: &WidgetPath, delta: &Delta) {
        let mut replicas = lock::lock(&self.replicas);
        let failed = match delta {
            Delta::NoChange { .. } => return,
            Delta::Gone => {
                replicas.remove(path);
                return;
            }
            Delta::FullSnapshot(snapshot) => {
                replicas.insert(path.clone(), WidgetReplica::from_snapshot(snapshot.clone()));
                return;
            }
            Delta::Incremental { .. } => match replicas.get_mut(path) {
                Some(replica) => replica.apply(delta).err().map(|e| e.to_string()),
                None => Some("no replica".to_string()),
            },
        };
        drop(replicas);

        if let Some(reason) = failed {
            tracing::warn!(viewer = %self.id, %path, %reason, "replica out of step, resyncing");
            if let Err(err) = self.engine.request_resync(self.id, path.as_str()) {
                tracing::debug!(viewer = %self.id, %path, %err, "resync not possible");
            }
        }
    }
}

impl Drop for LocalViewer {
    fn drop(&mut self) {
        self.disconnect();
    }
}
