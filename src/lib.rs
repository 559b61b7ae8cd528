//! # livedash
//!
//! **livedash** is a live widget synchronization engine.
//!
//! An instrumented process registers named, live-updating widgets (counters, gauges,
//! histograms, pulses, tables, boards and the interactive click, selector, slider and
//! switch). The engine mirrors them to dashboard viewers as revisioned deltas and routes
//! viewer actions back into application callbacks. Application threads never block on
//! viewers, and updates of one widget are seen by every viewer in revision order.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   application threads                                   dashboard viewers
//!   (register / update / remove)                          (through a Transport)
//!          │                                                   ▲        │
//!          ▼                                                   │        │ actions
//! ┌──────────────────────────────┐                 drain_pending│        ▼
//! │ Registry                     │                ┌─────────────┴────────────────┐
//! │ path → cell { config, value, │   ChangeQueue  │ SubscriptionManager          │
//! │   revision, history }        ├───────────────►│ viewer → { path → baseline } │
//! └──────────────┬───────────────┘   (coalesced)  │ DeltaComputer per drain      │
//!                │                                └─────────────┬────────────────┘
//!                │                                              │ gated by
//!                │                                              ▼
//!                │                                ┌──────────────────────────────┐
//!                │                                │ ActivityCoordinator          │
//!                │                                │ DISCONNECTED/CONNECTED/AWAKE │
//!                │                                │ SUSPEND/ACTION per viewer    │
//!                │                                └──────────────▲───────────────┘
//!                │                                               │
//!                │                                ┌──────────────┴───────────────┐
//!                └── callback, incarnation ──────►│ ActionRouter                 │
//!                                                 │ per-widget queue + worker    │
//!                                                 └──────────────┬───────────────┘
//!                                                                ▼
//!                                                         ActionCallback
//!
//!  all components ── Event ──► Bus ──► listener ──► SubscriberSet ──► Subscribe impls
//! ```
//!
//! ### Update path
//! ```text
//! update(path, Mutation)
//!   ├─► plan: validate against config + value → Vec<Patch>   (nothing written yet)
//!   ├─► value.apply_all(patches); revision += 1; history.push(revision, patches)
//!   └─► ChangeQueue.push(path, revision)
//!
//! drain_pending(viewer)
//!   └─► for each pending path (registration order):
//!         baseline == revision         → skipped (NoChange)
//!         history covers the gap       → Incremental { from, to, patches }
//!         otherwise                    → FullSnapshot { resend: true }
//!         widget removed               → Gone (once)
//! ```
//!
//! ## Features
//! | Area              | Description                                                       | Key types / traits                          |
//! |-------------------|-------------------------------------------------------------------|---------------------------------------------|
//! | **Widgets**       | Typed configs, values, patches and mutations.                     | [`WidgetConfig`], [`WidgetValue`], [`Mutation`] |
//! | **Handles**       | Per-kind API over the registry.                                   | [`Counter`], [`Table`], [`Slider`], ...     |
//! | **Deltas**        | What viewers receive.                                             | [`Delta`], [`Snapshot`], [`Patch`]          |
//! | **Actions**       | Inbound payloads and application callbacks.                       | [`Action`], [`ActionCallback`], [`CallbackFn`] |
//! | **Transports**    | Adapter contract and an in-process viewer.                        | [`Transport`], [`LocalViewer`]              |
//! | **Subscriber API**| Hook into engine events (logging, metrics, custom subscribers).   | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors with stable labels.                                  | [`EngineError`], [`CallbackError`]          |
//! | **Configuration** | Engine-wide settings.                                             | [`EngineConfig`]                            |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in `LogWriter` subscriber.
//!
//! ## Example
//! ```rust
//! use livedash::{Action, CallbackError, CallbackFn, EngineBuilder, EngineConfig, LocalViewer};
//! use livedash::{Slider, SliderConfig, WidgetValue};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = EngineBuilder::new(EngineConfig::default()).build()?;
//!
//!     // The application owns the slider and decides what an action means.
//!     let speed = Slider::register(&engine, "ui.speed", SliderConfig::default())?;
//!     let applied = speed.clone();
//!     speed.bind(CallbackFn::arc("speed", move |ev: livedash::ActionEvent| {
//!         let applied = applied.clone();
//!         async move {
//!             if let Some(Action::Slider { new_value }) = ev.action {
//!                 applied.set(new_value).map_err(|e| CallbackError::fail(e.as_message()))?;
//!             }
//!             Ok(())
//!         }
//!     }))?;
//!
//!     let viewer = LocalViewer::connect(&engine)?;
//!     viewer.subscribe("ui.speed")?;
//!     viewer.act("ui.speed", Action::Slider { new_value: 30.0 })?;
//!
//!     viewer.wait_and_sync().await?;
//!     assert_eq!(viewer.value("ui.speed"), Some(WidgetValue::Slider(30.0)));
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```
mod actions;
mod core;
mod error;
mod events;
mod handles;
mod install;
mod subscribers;
mod transport;
mod widgets;

// ---- Public re-exports ----

pub use actions::{Action, ActionCallback, ActionEnvelope, ActionEvent, CallbackFn, CallbackRef};
pub use crate::core::{
    ActionRouter, ActivityCoordinator, ActivityState, Delta, DeltaMode, Engine, EngineBuilder,
    EngineConfig, InterestFilter, Registry, Snapshot, SubscriptionManager, ViewerId, WidgetHandle,
    WidgetState,
};
pub use error::{CallbackError, EngineError, PatchError, ReplicaError, Result, TransportError};
pub use events::{Bus, Event, EventKind};
pub use handles::{Board, Click, Counter, Gauge, Histogram, Pulse, Selector, Slider, Switch, Table};
pub use install::{install, installed, uninstall};
pub use subscribers::{Subscribe, SubscriberSet};
pub use transport::{LocalViewer, Transport, WidgetReplica};
pub use widgets::{
    BoardConfig, BoardValue, ClickConfig, Col, Column, CounterConfig, GaugeConfig,
    HistogramConfig, HistogramValue, MAX_PATH_LEN, Mutation, OptionValue, Options, Patch,
    PulseConfig, PulseValue, Row, Sample, SelectorConfig, SliderConfig, SwitchConfig,
    TableConfig, TableRow, TableValue, WidgetConfig, WidgetDescriptor, WidgetKind, WidgetPath,
    WidgetValue,
};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
