//! # Widget values and the patches that move them forward.
//!
//! Every accepted mutation is planned into a short list of [`Patch`]es. The registry
//! applies them to its own [`WidgetValue`] with [`WidgetValue::apply`], and viewer-side
//! replicas apply the very same patches from incremental deltas, so replaying a snapshot
//! plus its deltas reproduces the live value exactly.
//!
//! ```text
//! Mutation ──plan──► Vec<Patch> ──apply──► WidgetValue (registry)
//!                        │
//!                        └── history ──► Delta::Incremental ──apply──► WidgetValue (replica)
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PatchError;
use crate::widgets::{WidgetConfig, WidgetKind};

/// Row id of a table widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(pub u64);

/// Column id of a table widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Col(pub u64);

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Col {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One timestamped pulse sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub value: f64,
    /// Milliseconds since the Unix epoch.
    pub at_ms: u64,
}

/// Rolling window of the most recent samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseValue {
    retain: usize,
    samples: VecDeque<Sample>,
}

impl PulseValue {
    fn new(retain: usize) -> Self {
        Self {
            retain: retain.max(1),
            samples: VecDeque::new(),
        }
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn push(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        self.trim();
    }

    fn trim(&mut self) {
        while self.samples.len() > self.retain {
            self.samples.pop_front();
        }
    }
}

/// Bucketed distribution.
///
/// `counts[i]` holds observations `<= bounds[i]` not counted by an earlier bucket; the
/// last count is the overflow bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramValue {
    bounds: Vec<f64>,
    counts: Vec<u64>,
    total: u64,
    sum: f64,
}

impl HistogramValue {
    fn new(bounds: &[f64]) -> Self {
        Self {
            bounds: bounds.to_vec(),
            counts: vec![0; bounds.len() + 1],
            total: 0,
            sum: 0.0,
        }
    }

    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Index of the bucket `value` falls into.
    pub fn bucket_of(&self, value: f64) -> usize {
        self.bounds
            .iter()
            .position(|b| value <= *b)
            .unwrap_or(self.bounds.len())
    }
}

/// One table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub id: Row,
    pub cells: BTreeMap<Col, String>,
}

/// Rows in insertion order under a column schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableValue {
    columns: Vec<Col>,
    rows: Vec<TableRow>,
    next_row: u64,
}

impl TableValue {
    fn new(columns: Vec<Col>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            next_row: 0,
        }
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn columns(&self) -> &[Col] {
        &self.columns
    }

    pub fn row(&self, id: Row) -> Option<&TableRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn cell(&self, row: Row, col: Col) -> Option<&str> {
        self.row(row)
            .and_then(|r| r.cells.get(&col))
            .map(String::as_str)
    }

    pub fn contains_row(&self, id: Row) -> bool {
        self.row(id).is_some()
    }

    pub fn has_column(&self, col: Col) -> bool {
        self.columns.contains(&col)
    }

    /// Row id the next appended row receives.
    pub fn next_row(&self) -> Row {
        Row(self.next_row)
    }

    /// Oldest row still present.
    pub fn oldest(&self) -> Option<Row> {
        self.rows.first().map(|r| r.id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Key/value entries of a board, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardValue {
    entries: BTreeMap<String, String>,
}

impl BoardValue {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Current value of a widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum WidgetValue {
    Board(BoardValue),
    Counter(i64),
    Gauge(f64),
    Histogram(HistogramValue),
    Pulse(PulseValue),
    Table(TableValue),
    /// Number of clicks acknowledged by the application.
    Click(i64),
    Selector(Option<String>),
    Slider(f64),
    Switch(bool),
}

/// Type-specific change to a [`WidgetValue`].
///
/// Scalar patches carry the new absolute value, so the last one of a run wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "arg", rename_all = "snake_case")]
pub enum Patch {
    /// New counter or click count.
    Int(i64),
    /// New gauge or slider level.
    Float(f64),
    /// Pulse sample appended.
    Sample(Sample),
    /// Absolute counts of the touched buckets plus new totals.
    Buckets {
        changed: Vec<(usize, u64)>,
        total: u64,
        sum: f64,
    },
    RowAdded {
        row: Row,
    },
    RowRemoved {
        row: Row,
    },
    CellSet {
        row: Row,
        col: Col,
        value: String,
    },
    EntrySet {
        key: String,
        value: String,
    },
    EntryRemoved {
        key: String,
    },
    Selected(Option<String>),
    Switched(bool),
}

impl Patch {
    /// Stable snake_case name of the patch.
    pub fn name(&self) -> &'static str {
        match self {
            Patch::Int(_) => "int",
            Patch::Float(_) => "float",
            Patch::Sample(_) => "sample",
            Patch::Buckets { .. } => "buckets",
            Patch::RowAdded { .. } => "row_added",
            Patch::RowRemoved { .. } => "row_removed",
            Patch::CellSet { .. } => "cell_set",
            Patch::EntrySet { .. } => "entry_set",
            Patch::EntryRemoved { .. } => "entry_removed",
            Patch::Selected(_) => "selected",
            Patch::Switched(_) => "switched",
        }
    }

    /// True for patches that fully replace the previous value.
    pub(crate) fn is_scalar(&self) -> bool {
        matches!(
            self,
            Patch::Int(_) | Patch::Float(_) | Patch::Selected(_) | Patch::Switched(_)
        )
    }
}

impl WidgetValue {
    /// Initial value of a freshly registered widget.
    pub fn initial(config: &WidgetConfig) -> Self {
        match config {
            WidgetConfig::Board(_) => WidgetValue::Board(BoardValue::default()),
            WidgetConfig::Counter(_) => WidgetValue::Counter(0),
            WidgetConfig::Gauge(_) => WidgetValue::Gauge(0.0),
            WidgetConfig::Histogram(h) => WidgetValue::Histogram(HistogramValue::new(&h.bucket_bounds)),
            WidgetConfig::Pulse(p) => WidgetValue::Pulse(PulseValue::new(p.retain)),
            WidgetConfig::Table(t) => {
                WidgetValue::Table(TableValue::new(t.columns.iter().map(|c| c.id).collect()))
            }
            WidgetConfig::Click(_) => WidgetValue::Click(0),
            WidgetConfig::Selector(_) => WidgetValue::Selector(None),
            WidgetConfig::Slider(s) => WidgetValue::Slider(s.min),
            WidgetConfig::Switch(s) => WidgetValue::Switch(s.initial_state),
        }
    }

    pub fn kind(&self) -> WidgetKind {
        match self {
            WidgetValue::Board(_) => WidgetKind::Board,
            WidgetValue::Counter(_) => WidgetKind::Counter,
            WidgetValue::Gauge(_) => WidgetKind::Gauge,
            WidgetValue::Histogram(_) => WidgetKind::Histogram,
            WidgetValue::Pulse(_) => WidgetKind::Pulse,
            WidgetValue::Table(_) => WidgetKind::Table,
            WidgetValue::Click(_) => WidgetKind::Click,
            WidgetValue::Selector(_) => WidgetKind::Selector,
            WidgetValue::Slider(_) => WidgetKind::Slider,
            WidgetValue::Switch(_) => WidgetKind::Switch,
        }
    }

    /// Applies one patch.
    ///
    /// Each patch is checked before anything is written, so a failed patch leaves the
    /// value untouched.
    pub fn apply(&mut self, patch: &Patch) -> Result<(), PatchError> {
        match (self, patch) {
            (WidgetValue::Counter(v) | WidgetValue::Click(v), Patch::Int(n)) => *v = *n,
            (WidgetValue::Gauge(v) | WidgetValue::Slider(v), Patch::Float(n)) => *v = *n,
            (WidgetValue::Pulse(p), Patch::Sample(s)) => p.push(*s),
            (
                WidgetValue::Histogram(h),
                Patch::Buckets {
                    changed,
                    total,
                    sum,
                },
            ) => {
                let len = h.counts.len();
                if let Some((index, _)) = changed.iter().find(|(i, _)| *i >= len) {
                    return Err(PatchError::BucketOutOfRange { index: *index, len });
                }
                for (i, c) in changed {
                    h.counts[*i] = *c;
                }
                h.total = *total;
                h.sum = *sum;
            }
            (WidgetValue::Table(t), Patch::RowAdded { row }) => {
                if t.contains_row(*row) {
                    return Err(PatchError::DuplicateRow(*row));
                }
                t.rows.push(TableRow {
                    id: *row,
                    cells: BTreeMap::new(),
                });
                t.next_row = t.next_row.max(row.0.saturating_add(1));
            }
            (WidgetValue::Table(t), Patch::RowRemoved { row }) => {
                let idx = t
                    .rows
                    .iter()
                    .position(|r| r.id == *row)
                    .ok_or(PatchError::MissingRow(*row))?;
                t.rows.remove(idx);
            }
            (WidgetValue::Table(t), Patch::CellSet { row, col, value }) => {
                if !t.has_column(*col) {
                    return Err(PatchError::MissingColumn(*col));
                }
                let r = t
                    .rows
                    .iter_mut()
                    .find(|r| r.id == *row)
                    .ok_or(PatchError::MissingRow(*row))?;
                r.cells.insert(*col, value.clone());
            }
            (WidgetValue::Board(b), Patch::EntrySet { key, value }) => {
                b.entries.insert(key.clone(), value.clone());
            }
            (WidgetValue::Board(b), Patch::EntryRemoved { key }) => {
                if b.entries.remove(key).is_none() {
                    return Err(PatchError::MissingEntry(key.clone()));
                }
            }
            (WidgetValue::Selector(v), Patch::Selected(s)) => v.clone_from(s),
            (WidgetValue::Switch(v), Patch::Switched(s)) => *v = *s,
            (value, patch) => {
                return Err(PatchError::KindMismatch {
                    kind: value.kind(),
                    patch: patch.name(),
                });
            }
        }
        Ok(())
    }

    /// Applies a sequence of patches atomically: on error the value is left unchanged.
    pub fn apply_all(&mut self, patches: &[Patch]) -> Result<(), PatchError> {
        match patches {
            [] => Ok(()),
            [single] => self.apply(single),
            many => {
                let mut next = self.clone();
                for p in many {
                    next.apply(p)?;
                }
                *self = next;
                Ok(())
            }
        }
    }

    /// Adapts the value to a new config of the same kind.
    ///
    /// Keeps everything the new config still admits: histogram counts survive when the
    /// bounds are unchanged, table cells of removed columns are dropped, a selector choice
    /// that no longer exists is cleared, a slider level is snapped into the new range.
    /// Returns `false` when the value had to be reset.
    ///
    /// The revision is not bumped for these adjustments. The registry bumps the widget's
    /// `config_epoch` instead, and every watcher gets a `FullSnapshot { resend: true }` with the
    /// adjusted value on its next drain.
    pub(crate) fn reconfigure(&mut self, config: &WidgetConfig) -> bool {
        match (self, config) {
            (WidgetValue::Histogram(h), WidgetConfig::Histogram(c)) => {
                if h.bounds != c.bucket_bounds {
                    *h = HistogramValue::new(&c.bucket_bounds);
                    return false;
                }
            }
            (WidgetValue::Pulse(p), WidgetConfig::Pulse(c)) => {
                p.retain = c.retain.max(1);
                p.trim();
            }
            (WidgetValue::Table(t), WidgetConfig::Table(c)) => {
                t.columns = c.columns.iter().map(|col| col.id).collect();
                let columns = t.columns.clone();
                for row in &mut t.rows {
                    row.cells.retain(|col, _| columns.contains(col));
                }
                if let Some(limit) = c.row_limit() {
                    let excess = t.rows.len().saturating_sub(limit);
                    t.rows.drain(..excess);
                }
            }
            (WidgetValue::Board(b), WidgetConfig::Board(c)) => {
                if !c.layout.is_empty() {
                    b.entries.retain(|k, _| c.layout.contains(k));
                }
            }
            (WidgetValue::Selector(v), WidgetConfig::Selector(c)) => {
                if v.as_ref().is_some_and(|s| !c.choices.contains(s)) {
                    *v = None;
                }
            }
            (WidgetValue::Slider(v), WidgetConfig::Slider(c)) => *v = c.snap(*v),
            (value, config) if value.kind() == config.kind() => {}
            (value, config) => {
                *value = WidgetValue::initial(config);
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::{HistogramConfig, SelectorConfig, SliderConfig, TableConfig};
    use pretty_assertions::assert_eq;

    fn table() -> WidgetValue {
        WidgetValue::initial(&WidgetConfig::Table(TableConfig::with_titles(["a", "b"])))
    }

    #[test]
    fn test_table_patches_keep_insertion_order() {
        let mut v = table();
        v.apply_all(&[
            Patch::RowAdded { row: Row(7) },
            Patch::CellSet {
                row: Row(7),
                col: Col(0),
                value: "x".into(),
            },
            Patch::RowAdded { row: Row(2) },
        ])
        .unwrap();

        let WidgetValue::Table(t) = &v else {
            panic!("expected table");
        };
        assert_eq!(t.rows().iter().map(|r| r.id).collect::<Vec<_>>(), [Row(7), Row(2)]);
        assert_eq!(t.cell(Row(7), Col(0)), Some("x"));
        assert_eq!(t.next_row(), Row(8));
    }

    #[test]
    fn test_apply_all_is_atomic() {
        let mut v = table();
        let before = v.clone();
        let err = v
            .apply_all(&[
                Patch::RowAdded { row: Row(0) },
                Patch::CellSet {
                    row: Row(0),
                    col: Col(9),
                    value: "x".into(),
                },
            ])
            .unwrap_err();
        assert_eq!(err, PatchError::MissingColumn(Col(9)));
        assert_eq!(v, before);
    }

    #[test]
    fn test_kind_mismatch() {
        let mut v = WidgetValue::Counter(1);
        let err = v.apply(&Patch::Float(1.0)).unwrap_err();
        assert_eq!(
            err,
            PatchError::KindMismatch {
                kind: WidgetKind::Counter,
                patch: "float"
            }
        );
        assert_eq!(v, WidgetValue::Counter(1));
    }

    #[test]
    fn test_histogram_bucket_range_checked() {
        let mut v = WidgetValue::initial(&WidgetConfig::Histogram(HistogramConfig {
            bucket_bounds: vec![1.0, 2.0],
            retention: None,
        }));
        let err = v
            .apply(&Patch::Buckets {
                changed: vec![(3, 1)],
                total: 1,
                sum: 9.0,
            })
            .unwrap_err();
        assert_eq!(err, PatchError::BucketOutOfRange { index: 3, len: 3 });
    }

    #[test]
    fn test_reconfigure_keeps_compatible_values() {
        let mut sel = WidgetValue::Selector(Some("b".into()));
        assert!(sel.reconfigure(&WidgetConfig::Selector(SelectorConfig {
            choices: vec!["a".into()],
        })));
        assert_eq!(sel, WidgetValue::Selector(None));

        let mut slider = WidgetValue::Slider(42.0);
        slider.reconfigure(&WidgetConfig::Slider(SliderConfig {
            min: 0.0,
            max: 10.0,
            step: 1.0,
        }));
        assert_eq!(slider, WidgetValue::Slider(10.0));

        let mut hist = WidgetValue::initial(&WidgetConfig::Histogram(HistogramConfig::default()));
        assert!(!hist.reconfigure(&WidgetConfig::Histogram(HistogramConfig {
            bucket_bounds: vec![1.0],
            retention: None,
        })));
    }

    #[test]
    fn test_value_serializes_tagged() {
        let json = serde_json::to_value(WidgetValue::Counter(3)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "counter", "value": 3}));
        let json = serde_json::to_value(Patch::RowAdded { row: Row(1) }).unwrap();
        assert_eq!(json, serde_json::json!({"op": "row_added", "arg": {"row": 1}}));
    }
}
