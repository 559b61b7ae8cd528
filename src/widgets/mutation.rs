//! # Type-specific widget mutations.
//!
//! A [`Mutation`] is what application code asks for ("increment by 2", "add a row").
//! [`Mutation::plan`] validates it against the widget's config and current value and turns
//! it into the [`Patch`]es the registry commits under the new revision. Planning never
//! touches the value, so a rejected mutation leaves no trace.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::EngineError;
use crate::widgets::{
    Col, HistogramConfig, HistogramValue, Patch, Row, Sample, WidgetConfig, WidgetKind,
    WidgetPath, WidgetValue,
};

/// Change requested by application code.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Counter: add a signed amount.
    Inc(i64),
    /// Counter: add the configured step.
    Step,
    /// Gauge or Slider: set the level.
    Set(f64),
    /// Pulse: append a sample taken now.
    Push(f64),
    /// Histogram: record one observation.
    Observe(f64),
    /// Table: add an empty row with an explicit id.
    AddRow(Row),
    /// Table: add a row with the next free id, cells filled in column order.
    AppendRow(Vec<String>),
    /// Table: delete a row.
    DelRow(Row),
    /// Table: set one cell.
    SetCell { row: Row, col: Col, value: String },
    /// Board: set an entry.
    BoardSet { key: String, value: String },
    /// Board: remove an entry.
    BoardRemove { key: String },
    /// Selector: set (or clear) the selected choice.
    Select(Option<String>),
    /// Switch: set the state.
    Toggle(bool),
    /// Click: acknowledge one click.
    Clicked,
}

impl Mutation {
    /// Stable snake_case name used in errors and events.
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Inc(_) => "inc",
            Mutation::Step => "step",
            Mutation::Set(_) => "set",
            Mutation::Push(_) => "push",
            Mutation::Observe(_) => "observe",
            Mutation::AddRow(_) => "add_row",
            Mutation::AppendRow(_) => "append_row",
            Mutation::DelRow(_) => "del_row",
            Mutation::SetCell { .. } => "set_cell",
            Mutation::BoardSet { .. } => "board_set",
            Mutation::BoardRemove { .. } => "board_remove",
            Mutation::Select(_) => "select",
            Mutation::Toggle(_) => "toggle",
            Mutation::Clicked => "clicked",
        }
    }

    /// True if the mutation fits widgets of `kind`.
    pub fn accepts(&self, kind: WidgetKind) -> bool {
        match self {
            Mutation::Inc(_) | Mutation::Step => kind == WidgetKind::Counter,
            Mutation::Set(_) => matches!(kind, WidgetKind::Gauge | WidgetKind::Slider),
            Mutation::Push(_) => kind == WidgetKind::Pulse,
            Mutation::Observe(_) => kind == WidgetKind::Histogram,
            Mutation::AddRow(_)
            | Mutation::AppendRow(_)
            | Mutation::DelRow(_)
            | Mutation::SetCell { .. } => kind == WidgetKind::Table,
            Mutation::BoardSet { .. } | Mutation::BoardRemove { .. } => kind == WidgetKind::Board,
            Mutation::Select(_) => kind == WidgetKind::Selector,
            Mutation::Toggle(_) => kind == WidgetKind::Switch,
            Mutation::Clicked => kind == WidgetKind::Click,
        }
    }

    /// Validates the mutation and plans the patches that implement it.
    pub(crate) fn plan(
        &self,
        path: &WidgetPath,
        config: &WidgetConfig,
        value: &WidgetValue,
        log: &ObservationLog,
        now_ms: u64,
    ) -> Result<Vec<Patch>, EngineError> {
        let kind = value.kind();
        if !self.accepts(kind) {
            return Err(EngineError::TypeMismatch {
                path: path.to_string(),
                kind,
                mutation: self.name(),
            });
        }
        let invalid = |reason: String| EngineError::invalid_value(path.as_str(), reason);

        let patches = match (self, config, value) {
            (Mutation::Inc(n), _, WidgetValue::Counter(v)) => {
                vec![Patch::Int(v.checked_add(*n).ok_or_else(|| invalid("counter overflow".into()))?)]
            }
            (Mutation::Step, WidgetConfig::Counter(c), WidgetValue::Counter(v)) => {
                vec![Patch::Int(v.checked_add(c.step).ok_or_else(|| invalid("counter overflow".into()))?)]
            }
            (Mutation::Set(x), WidgetConfig::Gauge(_), _) => {
                vec![Patch::Float(finite(*x).map_err(invalid)?)]
            }
            (Mutation::Set(x), WidgetConfig::Slider(s), _) => {
                let x = finite(*x).map_err(invalid)?;
                if x < s.min || x > s.max {
                    return Err(invalid(format!("{x} outside [{}, {}]", s.min, s.max)));
                }
                vec![Patch::Float(s.snap(x))]
            }
            (Mutation::Push(x), _, _) => vec![Patch::Sample(Sample {
                value: finite(*x).map_err(invalid)?,
                at_ms: now_ms,
            })],
            (Mutation::Observe(x), WidgetConfig::Histogram(c), WidgetValue::Histogram(h)) => {
                let x = finite(*x).map_err(invalid)?;
                vec![observe(c, h, log, x, now_ms)]
            }
            (Mutation::AddRow(row), WidgetConfig::Table(c), WidgetValue::Table(t)) => {
                if t.contains_row(*row) {
                    return Err(invalid(format!("row {row} already exists")));
                }
                let mut out = evict_for_insert(c.row_limit(), t.len(), t.oldest());
                out.push(Patch::RowAdded { row: *row });
                out
            }
            (Mutation::AppendRow(cells), WidgetConfig::Table(c), WidgetValue::Table(t)) => {
                if cells.len() > c.columns.len() {
                    return Err(invalid(format!(
                        "{} cells given, table has {} columns",
                        cells.len(),
                        c.columns.len()
                    )));
                }
                let row = t.next_row();
                let mut out = evict_for_insert(c.row_limit(), t.len(), t.oldest());
                out.push(Patch::RowAdded { row });
                out.extend(c.columns.iter().zip(cells).map(|(col, value)| Patch::CellSet {
                    row,
                    col: col.id,
                    value: value.clone(),
                }));
                out
            }
            (Mutation::DelRow(row), _, WidgetValue::Table(t)) => {
                if !t.contains_row(*row) {
                    return Err(invalid(format!("row {row} does not exist")));
                }
                vec![Patch::RowRemoved { row: *row }]
            }
            (Mutation::SetCell { row, col, value: cell }, _, WidgetValue::Table(t)) => {
                if !t.contains_row(*row) {
                    return Err(invalid(format!("row {row} does not exist")));
                }
                if !t.has_column(*col) {
                    return Err(invalid(format!("column {col} does not exist")));
                }
                vec![Patch::CellSet {
                    row: *row,
                    col: *col,
                    value: cell.clone(),
                }]
            }
            (Mutation::BoardSet { key, value: entry }, WidgetConfig::Board(c), _) => {
                if key.is_empty() {
                    return Err(invalid("board key is empty".into()));
                }
                if !c.layout.is_empty() && !c.layout.contains(key) {
                    return Err(invalid(format!("key '{key}' is not part of the board layout")));
                }
                vec![Patch::EntrySet {
                    key: key.clone(),
                    value: entry.clone(),
                }]
            }
            (Mutation::BoardRemove { key }, _, WidgetValue::Board(b)) => {
                if b.get(key).is_none() {
                    return Err(invalid(format!("entry '{key}' does not exist")));
                }
                vec![Patch::EntryRemoved { key: key.clone() }]
            }
            (Mutation::Select(choice), WidgetConfig::Selector(c), _) => {
                if let Some(s) = choice {
                    if !c.choices.contains(s) {
                        return Err(invalid(format!("'{s}' is not one of the choices")));
                    }
                }
                vec![Patch::Selected(choice.clone())]
            }
            (Mutation::Toggle(on), _, _) => vec![Patch::Switched(*on)],
            (Mutation::Clicked, _, WidgetValue::Click(n)) => {
                vec![Patch::Int(n.checked_add(1).ok_or_else(|| invalid("click count overflow".into()))?)]
            }
            // accepts() passed, so config and value disagree with each other.
            _ => {
                return Err(EngineError::TypeMismatch {
                    path: path.to_string(),
                    kind: config.kind(),
                    mutation: self.name(),
                });
            }
        };
        Ok(patches)
    }
}

fn finite(x: f64) -> Result<f64, String> {
    if x.is_finite() {
        Ok(x)
    } else {
        Err(format!("{x} is not a finite number"))
    }
}

fn evict_for_insert(limit: Option<usize>, len: usize, oldest: Option<Row>) -> Vec<Patch> {
    match (limit, oldest) {
        (Some(limit), Some(row)) if len >= limit => vec![Patch::RowRemoved { row }],
        _ => Vec::new(),
    }
}

fn observe(
    config: &HistogramConfig,
    hist: &HistogramValue,
    log: &ObservationLog,
    x: f64,
    now_ms: u64,
) -> Patch {
    let mut counts = hist.counts().to_vec();
    let mut touched = vec![false; counts.len()];
    let mut total = hist.total();
    let mut sum = hist.sum();

    if let Some(cutoff) = ObservationLog::cutoff(config.retention, now_ms) {
        for o in log.expired(cutoff) {
            if let Some(c) = counts.get_mut(o.bucket) {
                *c = c.saturating_sub(1);
                touched[o.bucket] = true;
                total = total.saturating_sub(1);
                sum -= o.value;
            }
        }
    }
    let bucket = hist.bucket_of(x);
    counts[bucket] += 1;
    touched[bucket] = true;
    total += 1;
    sum += x;
    if total == 1 {
        // Drop accumulated float error once the window has emptied.
        sum = x;
    }

    let changed = touched
        .iter()
        .enumerate()
        .filter(|(_, t)| **t)
        .map(|(i, _)| (i, counts[i]))
        .collect();
    Patch::Buckets {
        changed,
        total,
        sum,
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Observation {
    at_ms: u64,
    bucket: usize,
    value: f64,
}

/// Observations a histogram with `retention` still counts, oldest first.
///
/// Lives next to the widget state in the registry; replicas only ever see bucket totals.
#[derive(Debug, Default, Clone)]
pub(crate) struct ObservationLog {
    entries: VecDeque<Observation>,
}

impl ObservationLog {
    fn cutoff(retention: Option<Duration>, now_ms: u64) -> Option<u64> {
        retention.map(|r| now_ms.saturating_sub(r.as_millis().min(u128::from(u64::MAX)) as u64))
    }

    fn expired(&self, cutoff: u64) -> impl Iterator<Item = &Observation> {
        self.entries.iter().take_while(move |o| o.at_ms < cutoff)
    }

    /// Commits an observation after its patch was applied.
    pub(crate) fn record(&mut self, config: &HistogramConfig, hist: &HistogramValue, x: f64, now_ms: u64) {
        let Some(cutoff) = Self::cutoff(config.retention, now_ms) else {
            return;
        };
        while self.entries.front().is_some_and(|o| o.at_ms < cutoff) {
            self.entries.pop_front();
        }
        self.entries.push_back(Observation {
            at_ms: now_ms,
            bucket: hist.bucket_of(x),
            value: x,
        });
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::{BoardConfig, CounterConfig, SliderConfig, TableConfig};
    use pretty_assertions::assert_eq;

    fn path() -> WidgetPath {
        WidgetPath::new("w").unwrap()
    }

    fn plan(m: Mutation, cfg: &WidgetConfig, v: &WidgetValue) -> Result<Vec<Patch>, EngineError> {
        m.plan(&path(), cfg, v, &ObservationLog::default(), 1_000)
    }

    #[test]
    fn test_type_mismatch() {
        let cfg = WidgetConfig::Gauge(Default::default());
        let err = plan(Mutation::Inc(1), &cfg, &WidgetValue::initial(&cfg)).unwrap_err();
        assert_eq!(
            err,
            EngineError::TypeMismatch {
                path: "w".into(),
                kind: WidgetKind::Gauge,
                mutation: "inc"
            }
        );
    }

    #[test]
    fn test_counter_step_and_overflow() {
        let cfg = WidgetConfig::Counter(CounterConfig { step: 5 });
        assert_eq!(
            plan(Mutation::Step, &cfg, &WidgetValue::Counter(1)).unwrap(),
            vec![Patch::Int(6)]
        );
        let err = plan(Mutation::Inc(1), &cfg, &WidgetValue::Counter(i64::MAX)).unwrap_err();
        assert_eq!(err.as_label(), "invalid_value");
    }

    #[test]
    fn test_slider_range_and_snap() {
        let cfg = WidgetConfig::Slider(SliderConfig {
            min: 0.0,
            max: 1.0,
            step: 0.25,
        });
        let v = WidgetValue::initial(&cfg);
        assert_eq!(plan(Mutation::Set(0.3), &cfg, &v).unwrap(), vec![Patch::Float(0.25)]);
        assert!(plan(Mutation::Set(1.5), &cfg, &v).is_err());
        assert!(plan(Mutation::Set(f64::NAN), &cfg, &v).is_err());
    }

    #[test]
    fn test_append_row_evicts_oldest_in_same_plan() {
        let mut tc = TableConfig::with_titles(["name", "state"]);
        tc.max_rows = 1;
        let cfg = WidgetConfig::Table(tc);
        let mut v = WidgetValue::initial(&cfg);
        let first = plan(Mutation::AppendRow(vec!["a".into()]), &cfg, &v).unwrap();
        v.apply_all(&first).unwrap();

        let second = plan(
            Mutation::AppendRow(vec!["b".into(), "up".into()]),
            &cfg,
            &v,
        )
        .unwrap();
        assert_eq!(
            second,
            vec![
                Patch::RowRemoved { row: Row(0) },
                Patch::RowAdded { row: Row(1) },
                Patch::CellSet {
                    row: Row(1),
                    col: Col(0),
                    value: "b".into()
                },
                Patch::CellSet {
                    row: Row(1),
                    col: Col(1),
                    value: "up".into()
                },
            ]
        );

        let too_many = Mutation::AppendRow(vec!["1".into(), "2".into(), "3".into()]);
        assert!(plan(too_many, &cfg, &v).is_err());
    }

    #[test]
    fn test_board_layout_restricts_keys() {
        let cfg = WidgetConfig::Board(BoardConfig {
            layout: vec!["cpu".into()],
        });
        let v = WidgetValue::initial(&cfg);
        let set = |k: &str| Mutation::BoardSet {
            key: k.into(),
            value: "1".into(),
        };
        assert!(plan(set("cpu"), &cfg, &v).is_ok());
        assert!(plan(set("mem"), &cfg, &v).is_err());
        assert!(plan(Mutation::BoardRemove { key: "cpu".into() }, &cfg, &v).is_err());
    }

    #[test]
    fn test_histogram_retention_evicts_old_observations() {
        let hc = HistogramConfig {
            bucket_bounds: vec![1.0, 10.0],
            retention: Some(Duration::from_secs(1)),
        };
        let cfg = WidgetConfig::Histogram(hc.clone());
        let mut v = WidgetValue::initial(&cfg);
        let mut log = ObservationLog::default();

        for (x, at) in [(0.5, 0), (5.0, 500)] {
            let p = Mutation::Observe(x).plan(&path(), &cfg, &v, &log, at).unwrap();
            v.apply_all(&p).unwrap();
            let WidgetValue::Histogram(h) = &v else { panic!() };
            log.record(&hc, h, x, at);
        }

        // at 1_200 the observation from t=0 falls out of the 1s window
        let p = Mutation::Observe(50.0).plan(&path(), &cfg, &v, &log, 1_200).unwrap();
        assert_eq!(
            p,
            vec![Patch::Buckets {
                changed: vec![(0, 0), (2, 1)],
                total: 2,
                sum: 55.0
            }]
        );
        v.apply_all(&p).unwrap();
        let WidgetValue::Histogram(h) = &v else { panic!() };
        log.record(&hc, h, 50.0, 1_200);
        assert_eq!(log.len(), 2);
        assert_eq!(h.counts(), &[0, 1, 1]);
    }
}
