//! # Engine configuration.
//!
//! Provides [`EngineConfig`], the settings an [`Engine`](crate::Engine) is built from.
//!
//! ## Sentinel values
//! - `history_window = 0` → no incremental deltas (every change is a full snapshot)
//! - `max_viewers = 0` → unlimited viewers
//! - `bus_capacity` and `action_queue_capacity` are clamped to at least 1

/// Engine-wide settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Revisions of patches retained per widget for incremental deltas.
    pub history_window: usize,

    /// Capacity of the observability event bus.
    pub bus_capacity: usize,

    /// Maximum number of concurrently connected viewers (`0` = unlimited).
    pub max_viewers: usize,

    /// Default queue capacity of each widget's callback worker.
    pub action_queue_capacity: usize,

    /// Publish a `WidgetUpdated` event for every accepted mutation.
    ///
    /// Off by default: hot counters would flood the bus.
    pub publish_updates: bool,
}

impl EngineConfig {
    #[inline]
    pub fn viewer_limit(&self) -> Option<usize> {
        if self.max_viewers == 0 {
            None
        } else {
            Some(self.max_viewers)
        }
    }

    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    #[inline]
    pub fn action_queue_capacity_clamped(&self) -> usize {
        self.action_queue_capacity.max(1)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_window: 64,
            bus_capacity: 1024,
            max_viewers: 0,
            action_queue_capacity: 32,
            publish_updates: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        let mut cfg = EngineConfig::default();
        assert_eq!(cfg.viewer_limit(), None);
        cfg.max_viewers = 3;
        cfg.bus_capacity = 0;
        cfg.action_queue_capacity = 0;
        assert_eq!(cfg.viewer_limit(), Some(3));
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(cfg.action_queue_capacity_clamped(), 1);
    }
}
