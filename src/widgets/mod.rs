//! # Widget model: names, kinds, configs, values and mutations.
//!
//! Everything here is plain data plus pure functions; no locks, no tasks. The registry
//! (`core::registry`) combines these pieces into live, versioned widgets, and the typed
//! handles (`crate::handles`) give application code a per-kind API over it.
//!
//! - [`WidgetPath`] validated hierarchical name (primary key)
//! - [`WidgetKind`] / [`WidgetConfig`] what a widget is and how it is configured
//! - [`WidgetValue`] / [`Patch`] current value and the unit of change replicas replay
//! - [`Mutation`] application-level change request, planned into patches

mod config;
mod descriptor;
mod kind;
mod mutation;
mod path;
mod value;

pub use config::{
    BoardConfig, ClickConfig, Column, CounterConfig, GaugeConfig, HistogramConfig, OptionValue,
    Options, PulseConfig, SelectorConfig, SliderConfig, SwitchConfig, TableConfig, WidgetConfig,
};
pub use descriptor::WidgetDescriptor;
pub use kind::WidgetKind;
pub use mutation::Mutation;
pub(crate) use mutation::ObservationLog;
pub use path::{MAX_PATH_LEN, WidgetPath};
pub use value::{
    BoardValue, Col, HistogramValue, Patch, PulseValue, Row, Sample, TableRow, TableValue,
    WidgetValue,
};

/// Milliseconds since the Unix epoch (0 if the clock is before it).
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}
