use std::fmt;

use serde::{Deserialize, Serialize};

/// Type of a registered widget.
///
/// The kind is fixed for the lifetime of a registration: re-registering the same path
/// with another kind fails with `DuplicatePath`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    /// Composite key/value board.
    Board,
    /// Monotonic-ish integer counter.
    Counter,
    /// Current floating point level.
    Gauge,
    /// Bucketed distribution of observations.
    Histogram,
    /// Rolling window of timestamped samples.
    Pulse,
    /// Rows of string cells under a column schema.
    Table,
    /// Push button.
    Click,
    /// Choice among a fixed list of strings.
    Selector,
    /// Bounded numeric control.
    Slider,
    /// On/off control.
    Switch,
}

impl WidgetKind {
    /// Every kind, in declaration order.
    pub const ALL: [WidgetKind; 10] = [
        WidgetKind::Board,
        WidgetKind::Counter,
        WidgetKind::Gauge,
        WidgetKind::Histogram,
        WidgetKind::Pulse,
        WidgetKind::Table,
        WidgetKind::Click,
        WidgetKind::Selector,
        WidgetKind::Slider,
        WidgetKind::Switch,
    ];

    /// Returns the stable snake_case name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetKind::Board => "board",
            WidgetKind::Counter => "counter",
            WidgetKind::Gauge => "gauge",
            WidgetKind::Histogram => "histogram",
            WidgetKind::Pulse => "pulse",
            WidgetKind::Table => "table",
            WidgetKind::Click => "click",
            WidgetKind::Selector => "selector",
            WidgetKind::Slider => "slider",
            WidgetKind::Switch => "switch",
        }
    }

    /// True for controls that accept actions from viewers.
    #[inline]
    pub fn is_interactive(&self) -> bool {
        matches!(
            self,
            WidgetKind::Click | WidgetKind::Selector | WidgetKind::Slider | WidgetKind::Switch
        )
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
