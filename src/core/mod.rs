//! Engine core: registry, deltas, subscriptions, routing and lifecycle.
//!
//! The public entry point is [`Engine`], built by [`EngineBuilder`]. The remaining
//! components are reachable through it and exported for their types and docs.
//!
//! Internal modules:
//! - [`registry`]: path-indexed, versioned widget store;
//! - [`delta`]: revision history and delta computation;
//! - [`subscriptions`]: viewer interest, baselines and pending sets;
//! - [`router`]: action validation and per-widget callback workers;
//! - [`activity`]: per-viewer activity state machine;
//! - [`changes`]: coalescing change queue between registry and subscriptions;
//! - [`engine`] / [`builder`]: wiring and shutdown.

mod activity;
mod builder;
mod changes;
mod config;
mod delta;
mod engine;
pub(crate) mod lock;
mod registry;
mod router;
mod subscriptions;

pub use activity::{ActivityCoordinator, ActivityState, ViewerId};
pub use builder::EngineBuilder;
pub use config::EngineConfig;
pub use delta::{Delta, Snapshot};
pub use engine::Engine;
pub use registry::{Registry, WidgetHandle, WidgetState};
pub use router::ActionRouter;
pub use subscriptions::{DeltaMode, InterestFilter, SubscriptionManager};
