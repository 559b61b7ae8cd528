//! # Revision log and delta computation.
//!
//! Each widget keeps a bounded [`History`] of `(revision, patches)`. Given what a viewer
//! last acknowledged (its [`Baseline`]), [`DeltaComputer::compute`] returns the smallest
//! update that brings the viewer to the current revision:
//!
//! ```text
//! baseline   current state          result
//! ─────────  ─────────────────────  ───────────────────────────────────────
//! none       any                    FullSnapshot { resend: false }
//! other      new incarnation/epoch  FullSnapshot { resend: true }
//! rev == N   revision N             NoChange
//! rev == M   revision N, in window  Incremental { from: M, to: N, patches }
//! rev == M   revision N, too old    FullSnapshot { resend: true }
//! any        widget absent          Gone
//! ```

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::widgets::{Patch, WidgetConfig, WidgetKind, WidgetPath, WidgetValue};

/// Complete state of a widget, sufficient to rebuild it from nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub path: WidgetPath,
    /// Engine-unique id of the registration this snapshot belongs to.
    pub incarnation: u64,
    pub config_epoch: u64,
    pub revision: u64,
    pub config: WidgetConfig,
    pub value: WidgetValue,
    /// The viewer had a baseline that could not be continued incrementally.
    pub resend: bool,
}

impl Snapshot {
    pub fn kind(&self) -> WidgetKind {
        self.config.kind()
    }
}

/// Update for one (viewer, path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    /// Viewer is up to date.
    NoChange { revision: u64 },
    /// Replace everything the viewer holds for the path.
    FullSnapshot(Snapshot),
    /// Apply `patches` to revision `from` to obtain revision `to`.
    Incremental {
        from: u64,
        to: u64,
        patches: Vec<Patch>,
    },
    /// The widget no longer exists; drop it.
    Gone,
}

impl Delta {
    /// Revision the viewer holds after applying this delta.
    pub fn revision(&self) -> Option<u64> {
        match self {
            Delta::NoChange { revision } => Some(*revision),
            Delta::FullSnapshot(s) => Some(s.revision),
            Delta::Incremental { to, .. } => Some(*to),
            Delta::Gone => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Delta::NoChange { .. } => "no_change",
            Delta::FullSnapshot(_) => "full_snapshot",
            Delta::Incremental { .. } => "incremental",
            Delta::Gone => "gone",
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, Delta::FullSnapshot(_))
    }

    pub fn is_resend(&self) -> bool {
        matches!(self, Delta::FullSnapshot(s) if s.resend)
    }
}

/// What a viewer last acknowledged for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Baseline {
    pub incarnation: u64,
    pub config_epoch: u64,
    pub revision: u64,
}

impl Baseline {
    /// Baseline reached after the viewer applied `delta`, starting from `prev`.
    pub(crate) fn after(prev: Option<Baseline>, delta: &Delta) -> Option<Baseline> {
        match delta {
            Delta::FullSnapshot(s) => Some(Baseline {
                incarnation: s.incarnation,
                config_epoch: s.config_epoch,
                revision: s.revision,
            }),
            Delta::Incremental { to, .. } => prev.map(|b| Baseline { revision: *to, ..b }),
            Delta::NoChange { .. } => prev,
            Delta::Gone => None,
        }
    }
}

/// Bounded log of the patches that produced recent revisions.
#[derive(Debug, Clone)]
pub(crate) struct History {
    window: usize,
    entries: VecDeque<(u64, Vec<Patch>)>,
}

impl History {
    pub(crate) fn new(window: usize) -> Self {
        Self {
            window,
            entries: VecDeque::with_capacity(window.min(64)),
        }
    }

    pub(crate) fn push(&mut self, revision: u64, patches: Vec<Patch>) {
        if self.window == 0 {
            return;
        }
        if self.entries.len() == self.window {
            self.entries.pop_front();
        }
        self.entries.push_back((revision, patches));
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Patches leading from `from` to `to`, or `None` if part of the range fell out.
    pub(crate) fn between(&self, from: u64, to: u64) -> Option<Vec<Patch>> {
        let (first, _) = self.entries.front()?;
        let (last, _) = self.entries.back()?;
        if from >= to || *first > from + 1 || *last != to {
            return None;
        }
        Some(
            self.entries
                .iter()
                .filter(|(rev, _)| *rev > from)
                .flat_map(|(_, patches)| patches.iter().cloned())
                .collect(),
        )
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Borrowed view of the current state of one widget.
pub(crate) struct Current<'a> {
    pub path: &'a WidgetPath,
    pub incarnation: u64,
    pub config_epoch: u64,
    pub revision: u64,
    pub config: &'a WidgetConfig,
    pub value: &'a WidgetValue,
    pub history: &'a History,
}

impl Current<'_> {
    fn snapshot(&self, resend: bool) -> Delta {
        Delta::FullSnapshot(Snapshot {
            path: self.path.clone(),
            incarnation: self.incarnation,
            config_epoch: self.config_epoch,
            revision: self.revision,
            config: self.config.clone(),
            value: self.value.clone(),
            resend,
        })
    }
}

/// Chooses between no-op, incremental and full updates.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DeltaComputer {
    snapshots_only: bool,
}

impl DeltaComputer {
    pub(crate) fn new(snapshots_only: bool) -> Self {
        Self { snapshots_only }
    }

    pub(crate) fn compute(&self, current: Option<Current<'_>>, baseline: Option<Baseline>) -> Delta {
        let Some(cur) = current else {
            return Delta::Gone;
        };
        let Some(base) = baseline else {
            return cur.snapshot(false);
        };
        if base.incarnation != cur.incarnation || base.config_epoch != cur.config_epoch {
            return cur.snapshot(true);
        }
        if base.revision == cur.revision {
            return Delta::NoChange {
                revision: cur.revision,
            };
        }
        if self.snapshots_only || base.revision > cur.revision {
            return cur.snapshot(true);
        }
        match cur.history.between(base.revision, cur.revision) {
            Some(patches) => Delta::Incremental {
                from: base.revision,
                to: cur.revision,
                patches: compact(patches),
            },
            None => cur.snapshot(true),
        }
    }
}

/// Shrinks a run of patches without changing what it produces.
///
/// Scalar patches carry absolute values, so only the last survives. Histogram bucket
/// patches carry absolute counts and merge per bucket. Everything else keeps its order.
pub(crate) fn compact(patches: Vec<Patch>) -> Vec<Patch> {
    if patches.len() < 2 {
        return patches;
    }
    if patches.iter().all(Patch::is_scalar) {
        return patches.into_iter().last().into_iter().collect();
    }
    if patches.iter().all(|p| matches!(p, Patch::Buckets { .. })) {
        let mut merged = BTreeMap::new();
        let (mut total, mut sum) = (0, 0.0);
        for p in patches {
            if let Patch::Buckets {
                changed,
                total: t,
                sum: s,
            } = p
            {
                merged.extend(changed);
                total = t;
                sum = s;
            }
        }
        return vec![Patch::Buckets {
            changed: merged.into_iter().collect(),
            total,
            sum,
        }];
    }
    patches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::{Mutation, ObservationLog, Row, TableConfig};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn path() -> WidgetPath {
        WidgetPath::new("t").unwrap()
    }

    fn current<'a>(
        path: &'a WidgetPath,
        config: &'a WidgetConfig,
        value: &'a WidgetValue,
        history: &'a History,
        revision: u64,
    ) -> Current<'a> {
        Current {
            path,
            incarnation: 1,
            config_epoch: 0,
            revision,
            config,
            value,
            history,
        }
    }

    fn base(revision: u64) -> Option<Baseline> {
        Some(Baseline {
            incarnation: 1,
            config_epoch: 0,
            revision,
        })
    }

    #[test]
    fn test_history_window() {
        let mut h = History::new(2);
        for rev in 1..=3 {
            h.push(rev, vec![Patch::Int(rev as i64)]);
        }
        assert_eq!(h.len(), 2);
        assert_eq!(h.between(1, 3), Some(vec![Patch::Int(2), Patch::Int(3)]));
        assert_eq!(h.between(0, 3), None);
        assert_eq!(h.between(2, 2), None);

        let mut off = History::new(0);
        off.push(1, vec![Patch::Int(1)]);
        assert_eq!(off.between(0, 1), None);
    }

    #[test]
    fn test_compute_cases() {
        let p = path();
        let cfg = WidgetConfig::default_for(WidgetKind::Counter);
        let val = WidgetValue::Counter(3);
        let mut h = History::new(4);
        for rev in 1..=3 {
            h.push(rev, vec![Patch::Int(rev as i64)]);
        }
        let dc = DeltaComputer::default();
        let cur = || Some(current(&p, &cfg, &val, &h, 3));

        assert!(matches!(dc.compute(cur(), None), Delta::FullSnapshot(Snapshot { resend: false, .. })));
        assert_eq!(dc.compute(cur(), base(3)), Delta::NoChange { revision: 3 });
        assert_eq!(
            dc.compute(cur(), base(1)),
            Delta::Incremental {
                from: 1,
                to: 3,
                patches: vec![Patch::Int(3)]
            }
        );
        assert_eq!(dc.compute(None, base(1)), Delta::Gone);

        let stale_epoch = Some(Baseline {
            config_epoch: 7,
            ..base(3).unwrap()
        });
        assert!(dc.compute(cur(), stale_epoch).is_resend());
        assert!(DeltaComputer::new(true).compute(cur(), base(2)).is_resend());
    }

    #[test]
    fn test_compact_buckets() {
        let merged = compact(vec![
            Patch::Buckets {
                changed: vec![(0, 1), (2, 4)],
                total: 5,
                sum: 1.0,
            },
            Patch::Buckets {
                changed: vec![(0, 2)],
                total: 6,
                sum: 2.0,
            },
        ]);
        assert_eq!(
            merged,
            vec![Patch::Buckets {
                changed: vec![(0, 2), (2, 4)],
                total: 6,
                sum: 2.0
            }]
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Append(String),
        Del(usize),
        Set(usize, String),
        Drain,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            "[a-z]{0,4}".prop_map(Op::Append),
            (0usize..8).prop_map(Op::Del),
            (0usize..8, "[a-z]{1,3}").prop_map(|(i, s)| Op::Set(i, s)),
            Just(Op::Drain),
        ]
    }

    proptest! {
        // A replica that starts from a snapshot and applies whatever the computer hands out
        // always ends up equal to the live value.
        #[test]
        fn test_replay_reproduces_live_state(ops in prop::collection::vec(op(), 1..60), window in 0usize..6) {
            let p = path();
            let mut tc = TableConfig::with_titles(["name"]);
            tc.max_rows = 5;
            let cfg = WidgetConfig::Table(tc);
            let mut live = WidgetValue::initial(&cfg);
            let mut history = History::new(window);
            let mut revision = 0u64;
            let log = ObservationLog::default();
            let dc = DeltaComputer::default();

            let mut replica: Option<(Baseline, WidgetValue)> = None;
            let sync = |live: &WidgetValue, history: &History, revision: u64,
                            replica: &mut Option<(Baseline, WidgetValue)>| {
                let cur = Some(current(&p, &cfg, live, history, revision));
                let delta = dc.compute(cur, replica.as_ref().map(|(b, _)| *b));
                match &delta {
                    Delta::FullSnapshot(s) => *replica = Some((Baseline::after(None, &delta).unwrap(), s.value.clone())),
                    Delta::Incremental { from, patches, .. } => {
                        let (b, v) = replica.as_mut().unwrap();
                        assert_eq!(*from, b.revision);
                        v.apply_all(patches).unwrap();
                        *b = Baseline::after(Some(*b), &delta).unwrap();
                    }
                    Delta::NoChange { .. } => {}
                    Delta::Gone => unreachable!(),
                }
            };

            for op in ops {
                let rows: Vec<Row> = match &live {
                    WidgetValue::Table(t) => t.rows().iter().map(|r| r.id).collect(),
                    _ => unreachable!(),
                };
                let m = match op {
                    Op::Append(s) => Mutation::AppendRow(vec![s]),
                    Op::Del(i) if !rows.is_empty() => Mutation::DelRow(rows[i % rows.len()]),
                    Op::Set(i, s) if !rows.is_empty() => Mutation::SetCell {
                        row: rows[i % rows.len()],
                        col: crate::widgets::Col(0),
                        value: s,
                    },
                    Op::Drain => {
                        sync(&live, &history, revision, &mut replica);
                        continue;
                    }
                    _ => continue,
                };
                let patches = m.plan(&p, &cfg, &live, &log, 0).unwrap();
                live.apply_all(&patches).unwrap();
                revision += 1;
                history.push(revision, patches);
            }
            sync(&live, &history, revision, &mut replica);

            let (b, v) = replica.unwrap();
            prop_assert_eq!(b.revision, revision);
            prop_assert_eq!(v, live);
        }
    }
}
