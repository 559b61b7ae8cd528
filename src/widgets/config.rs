//! # Per-kind widget configuration.
//!
//! Each widget kind has a typed config record. [`WidgetConfig`] is the tagged union the
//! registry stores; [`Options`] is a loose key/value map (the shape host-language bindings
//! receive as keyword arguments) that [`WidgetConfig::from_options`] parses strictly.
//!
//! ## Recognized options
//! ```text
//! counter   : step
//! gauge     : min, max
//! histogram : bucket_bounds, retention
//! pulse     : retain
//! table     : columns, max_rows
//! board     : layout
//! click     : label
//! selector  : choices
//! slider    : min, max, step
//! switch    : initial_state
//! ```
//! Any other key fails with `InvalidConfig`.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::widgets::{Col, WidgetKind};

/// Counter options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterConfig {
    /// Amount added by `Mutation::Step` (non-zero).
    pub step: i64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self { step: 1 }
    }
}

/// Gauge options. Bounds are display hints; values outside them are still accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GaugeConfig {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Histogram options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramConfig {
    /// Upper bounds (inclusive) of the buckets, strictly increasing.
    /// One extra overflow bucket always follows the last bound.
    pub bucket_bounds: Vec<f64>,
    /// Observations older than this are evicted (`None` = keep forever).
    pub retention: Option<Duration>,
}

/// Pulse options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Number of most recent samples kept.
    pub retain: usize,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self { retain: 100 }
    }
}

/// Table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: Col,
    pub title: String,
}

impl Column {
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id: Col(id),
            title: title.into(),
        }
    }
}

/// Table options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub columns: Vec<Column>,
    /// Maximum number of rows; the oldest row is evicted past it (`0` = unlimited).
    pub max_rows: usize,
}

impl TableConfig {
    /// Builds a table schema from column titles, numbering columns from 0.
    pub fn with_titles<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = titles
            .into_iter()
            .enumerate()
            .map(|(i, t)| Column::new(i as u64, t))
            .collect();
        Self {
            columns,
            max_rows: 0,
        }
    }

    #[inline]
    pub fn row_limit(&self) -> Option<usize> {
        if self.max_rows == 0 {
            None
        } else {
            Some(self.max_rows)
        }
    }
}

/// Board options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Allowed keys in display order (empty = any key).
    pub layout: Vec<String>,
}

/// Click options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickConfig {
    pub label: String,
}

/// Selector options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub choices: Vec<String>,
}

/// Slider options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliderConfig {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for SliderConfig {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 100.0,
            step: 1.0,
        }
    }
}

impl SliderConfig {
    /// Snaps `value` to the step grid starting at `min`, clamped to `max`.
    pub fn snap(&self, value: f64) -> f64 {
        let steps = ((value - self.min) / self.step).round();
        (self.min + steps * self.step).clamp(self.min, self.max)
    }
}

/// Switch options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchConfig {
    pub initial_state: bool,
}

/// Typed configuration of a widget; the variant determines the widget kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "config", rename_all = "snake_case")]
pub enum WidgetConfig {
    Board(BoardConfig),
    Counter(CounterConfig),
    Gauge(GaugeConfig),
    Histogram(HistogramConfig),
    Pulse(PulseConfig),
    Table(TableConfig),
    Click(ClickConfig),
    Selector(SelectorConfig),
    Slider(SliderConfig),
    Switch(SwitchConfig),
}

impl WidgetConfig {
    /// Returns the kind described by this config.
    pub fn kind(&self) -> WidgetKind {
        match self {
            WidgetConfig::Board(_) => WidgetKind::Board,
            WidgetConfig::Counter(_) => WidgetKind::Counter,
            WidgetConfig::Gauge(_) => WidgetKind::Gauge,
            WidgetConfig::Histogram(_) => WidgetKind::Histogram,
            WidgetConfig::Pulse(_) => WidgetKind::Pulse,
            WidgetConfig::Table(_) => WidgetKind::Table,
            WidgetConfig::Click(_) => WidgetKind::Click,
            WidgetConfig::Selector(_) => WidgetKind::Selector,
            WidgetConfig::Slider(_) => WidgetKind::Slider,
            WidgetConfig::Switch(_) => WidgetKind::Switch,
        }
    }

    /// Default configuration for a kind.
    pub fn default_for(kind: WidgetKind) -> Self {
        match kind {
            WidgetKind::Board => WidgetConfig::Board(BoardConfig::default()),
            WidgetKind::Counter => WidgetConfig::Counter(CounterConfig::default()),
            WidgetKind::Gauge => WidgetConfig::Gauge(GaugeConfig::default()),
            WidgetKind::Histogram => WidgetConfig::Histogram(HistogramConfig::default()),
            WidgetKind::Pulse => WidgetConfig::Pulse(PulseConfig::default()),
            WidgetKind::Table => WidgetConfig::Table(TableConfig::default()),
            WidgetKind::Click => WidgetConfig::Click(ClickConfig::default()),
            WidgetKind::Selector => WidgetConfig::Selector(SelectorConfig::default()),
            WidgetKind::Slider => WidgetConfig::Slider(SliderConfig::default()),
            WidgetKind::Switch => WidgetConfig::Switch(SwitchConfig::default()),
        }
    }

    /// Option keys accepted by [`WidgetConfig::from_options`] for `kind`.
    pub fn recognized_options(kind: WidgetKind) -> &'static [&'static str] {
        match kind {
            WidgetKind::Counter => &["step"],
            WidgetKind::Gauge => &["min", "max"],
            WidgetKind::Histogram => &["bucket_bounds", "retention"],
            WidgetKind::Pulse => &["retain"],
            WidgetKind::Table => &["columns", "max_rows"],
            WidgetKind::Board => &["layout"],
            WidgetKind::Click => &["label"],
            WidgetKind::Selector => &["choices"],
            WidgetKind::Slider => &["min", "max", "step"],
            WidgetKind::Switch => &["initial_state"],
        }
    }

    /// Parses loose options into a validated typed config.
    ///
    /// Missing options take their defaults; unknown keys and ill-typed values fail with
    /// `InvalidConfig`.
    ///
    /// # Example
    /// ```
    /// use livedash::{Options, WidgetConfig, WidgetKind};
    ///
    /// let opts = Options::new().with("min", 0.0).with("max", 10).with("step", 0.5);
    /// let cfg = WidgetConfig::from_options(WidgetKind::Slider, &opts).unwrap();
    /// assert_eq!(cfg.kind(), WidgetKind::Slider);
    ///
    /// let bad = Options::new().with("colour", "red");
    /// assert!(WidgetConfig::from_options(WidgetKind::Gauge, &bad).is_err());
    /// ```
    pub fn from_options(kind: WidgetKind, opts: &Options) -> Result<Self, EngineError> {
        let recognized = Self::recognized_options(kind);
        if let Some(key) = opts.keys().find(|k| !recognized.contains(k)) {
            return Err(EngineError::invalid_config(
                kind,
                format!("unrecognized option '{key}' (recognized: {})", recognized.join(", ")),
            ));
        }

        let r = Reader { kind, opts };
        let config = match kind {
            WidgetKind::Counter => WidgetConfig::Counter(CounterConfig {
                step: r.int("step")?.unwrap_or(1),
            }),
            WidgetKind::Gauge => WidgetConfig::Gauge(GaugeConfig {
                min: r.float("min")?,
                max: r.float("max")?,
            }),
            WidgetKind::Histogram => WidgetConfig::Histogram(HistogramConfig {
                bucket_bounds: r.floats("bucket_bounds")?.unwrap_or_default(),
                retention: r.duration("retention")?,
            }),
            WidgetKind::Pulse => WidgetConfig::Pulse(PulseConfig {
                retain: r.count("retain")?.unwrap_or(PulseConfig::default().retain),
            }),
            WidgetKind::Table => {
                let mut table = TableConfig::with_titles(r.texts("columns")?.unwrap_or_default());
                table.max_rows = r.count("max_rows")?.unwrap_or(0);
                WidgetConfig::Table(table)
            }
            WidgetKind::Board => WidgetConfig::Board(BoardConfig {
                layout: r.texts("layout")?.unwrap_or_default(),
            }),
            WidgetKind::Click => WidgetConfig::Click(ClickConfig {
                label: r.text("label")?.unwrap_or_default(),
            }),
            WidgetKind::Selector => WidgetConfig::Selector(SelectorConfig {
                choices: r.texts("choices")?.unwrap_or_default(),
            }),
            WidgetKind::Slider => {
                let d = SliderConfig::default();
                WidgetConfig::Slider(SliderConfig {
                    min: r.float("min")?.unwrap_or(d.min),
                    max: r.float("max")?.unwrap_or(d.max),
                    step: r.float("step")?.unwrap_or(d.step),
                })
            }
            WidgetKind::Switch => WidgetConfig::Switch(SwitchConfig {
                initial_state: r.boolean("initial_state")?.unwrap_or(false),
            }),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks internal consistency (ordering of bounds, non-empty choices, ...).
    pub fn validate(&self) -> Result<(), EngineError> {
        let kind = self.kind();
        let fail = |reason: &str| Err(EngineError::invalid_config(kind, reason));

        match self {
            WidgetConfig::Counter(c) => {
                if c.step == 0 {
                    return fail("step must be non-zero");
                }
            }
            WidgetConfig::Gauge(g) => {
                if g.min.is_some_and(|v| !v.is_finite()) || g.max.is_some_and(|v| !v.is_finite()) {
                    return fail("bounds must be finite");
                }
                if let (Some(min), Some(max)) = (g.min, g.max) {
                    if min >= max {
                        return fail("min must be below max");
                    }
                }
            }
            WidgetConfig::Histogram(h) => {
                if h.bucket_bounds.iter().any(|b| !b.is_finite()) {
                    return fail("bucket bounds must be finite");
                }
                if h.bucket_bounds.windows(2).any(|w| w[0] >= w[1]) {
                    return fail("bucket bounds must be strictly increasing");
                }
                if h.retention.is_some_and(|r| r.is_zero()) {
                    return fail("retention must be positive");
                }
            }
            WidgetConfig::Pulse(p) => {
                if p.retain == 0 {
                    return fail("retain must be at least 1");
                }
            }
            WidgetConfig::Table(t) => {
                let mut seen = HashSet::new();
                if !t.columns.iter().all(|c| seen.insert(c.id)) {
                    return fail("column ids must be unique");
                }
            }
            WidgetConfig::Board(b) => {
                if !unique_non_empty(&b.layout) {
                    return fail("layout keys must be unique and non-empty");
                }
            }
            WidgetConfig::Click(_) | WidgetConfig::Switch(_) => {}
            WidgetConfig::Selector(s) => {
                if s.choices.is_empty() {
                    return fail("choices must not be empty");
                }
                if !unique_non_empty(&s.choices) {
                    return fail("choices must be unique and non-empty");
                }
            }
            WidgetConfig::Slider(s) => {
                if !(s.min.is_finite() && s.max.is_finite() && s.step.is_finite()) {
                    return fail("min, max and step must be finite");
                }
                if s.min >= s.max {
                    return fail("min must be below max");
                }
                if s.step <= 0.0 {
                    return fail("step must be positive");
                }
            }
        }
        Ok(())
    }
}

fn unique_non_empty(items: &[String]) -> bool {
    let mut seen = HashSet::new();
    items.iter().all(|s| !s.is_empty() && seen.insert(s.as_str()))
}

/// Loosely typed option value, as received from bindings.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Duration(Duration),
    List(Vec<OptionValue>),
}

impl OptionValue {
    fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Int(_) => "int",
            OptionValue::Float(_) => "float",
            OptionValue::Text(_) => "text",
            OptionValue::Duration(_) => "duration",
            OptionValue::List(_) => "list",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Float(v) => Some(*v),
            OptionValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(i64::from(v))
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Text(v)
    }
}

impl From<Duration> for OptionValue {
    fn from(v: Duration) -> Self {
        OptionValue::Duration(v)
    }
}

impl<T: Into<OptionValue>> From<Vec<T>> for OptionValue {
    fn from(v: Vec<T>) -> Self {
        OptionValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Loose option map used by [`WidgetConfig::from_options`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options(BTreeMap<String, OptionValue>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<OptionValue>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Typed accessors over [`Options`] that produce `InvalidConfig` on type errors.
struct Reader<'a> {
    kind: WidgetKind,
    opts: &'a Options,
}

impl Reader<'_> {
    fn wrong(&self, key: &str, expected: &str, got: &OptionValue) -> EngineError {
        EngineError::invalid_config(
            self.kind,
            format!("option '{key}' expects {expected}, got {}", got.type_name()),
        )
    }

    fn float(&self, key: &str) -> Result<Option<f64>, EngineError> {
        match self.opts.get(key) {
            None => Ok(None),
            Some(v) => v.as_f64().map(Some).ok_or_else(|| self.wrong(key, "a number", v)),
        }
    }

    fn int(&self, key: &str) -> Result<Option<i64>, EngineError> {
        match self.opts.get(key) {
            None => Ok(None),
            Some(OptionValue::Int(v)) => Ok(Some(*v)),
            Some(v) => Err(self.wrong(key, "an integer", v)),
        }
    }

    fn count(&self, key: &str) -> Result<Option<usize>, EngineError> {
        match self.int(key)? {
            None => Ok(None),
            Some(v) => usize::try_from(v).map(Some).map_err(|_| {
                EngineError::invalid_config(self.kind, format!("option '{key}' must not be negative"))
            }),
        }
    }

    fn boolean(&self, key: &str) -> Result<Option<bool>, EngineError> {
        match self.opts.get(key) {
            None => Ok(None),
            Some(OptionValue::Bool(v)) => Ok(Some(*v)),
            Some(v) => Err(self.wrong(key, "a bool", v)),
        }
    }

    fn text(&self, key: &str) -> Result<Option<String>, EngineError> {
        match self.opts.get(key) {
            None => Ok(None),
            Some(OptionValue::Text(v)) => Ok(Some(v.clone())),
            Some(v) => Err(self.wrong(key, "text", v)),
        }
    }

    fn duration(&self, key: &str) -> Result<Option<Duration>, EngineError> {
        match self.opts.get(key) {
            None => Ok(None),
            Some(OptionValue::Duration(d)) => Ok(Some(*d)),
            Some(v) => match v.as_f64().map(Duration::try_from_secs_f64) {
                Some(Ok(d)) => Ok(Some(d)),
                _ => Err(self.wrong(key, "a duration or non-negative seconds", v)),
            },
        }
    }

    fn list(&self, key: &str) -> Result<Option<&'_ [OptionValue]>, EngineError> {
        match self.opts.get(key) {
            None => Ok(None),
            Some(OptionValue::List(items)) => Ok(Some(items.as_slice())),
            Some(v) => Err(self.wrong(key, "a list", v)),
        }
    }

    fn floats(&self, key: &str) -> Result<Option<Vec<f64>>, EngineError> {
        let Some(items) = self.list(key)? else {
            return Ok(None);
        };
        items
            .iter()
            .map(|v| v.as_f64().ok_or_else(|| self.wrong(key, "a list of numbers", v)))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn texts(&self, key: &str) -> Result<Option<Vec<String>>, EngineError> {
        let Some(items) = self.list(key)? else {
            return Ok(None);
        };
        items
            .iter()
            .map(|v| match v {
                OptionValue::Text(s) => Ok(s.clone()),
                other => Err(self.wrong(key, "a list of text", other)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}
