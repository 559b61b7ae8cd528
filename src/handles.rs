//! # Typed widget handles.
//!
//! One handle type per widget kind, each a thin wrapper over [`WidgetHandle`] that only
//! exposes the mutations that fit the kind:
//!
//! ```rust
//! use livedash::{Counter, CounterConfig, EngineBuilder, EngineConfig, Table, TableConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), livedash::EngineError> {
//!     let engine = EngineBuilder::new(EngineConfig::default()).build()?;
//!
//!     let done = Counter::register(&engine, "jobs.done", CounterConfig { step: 2 })?;
//!     done.step()?;
//!     done.inc(3)?;
//!     assert_eq!(done.value()?, 5);
//!
//!     let jobs = Table::register(&engine, "jobs.list", TableConfig::with_titles(["name", "state"]))?;
//!     let row = jobs.append_row(["build", "ok"])?;
//!     assert_eq!(jobs.cell(row, 1)?.as_deref(), Some("ok"));
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! Handles follow one registration: after the widget is removed every call fails with
//! `WidgetGone`, even if the path is registered again.

use crate::actions::CallbackRef;
use crate::core::{Engine, WidgetHandle};
use crate::error::{EngineError, Result};
use crate::widgets::{
    BoardConfig, ClickConfig, Col, CounterConfig, GaugeConfig, HistogramConfig, HistogramValue,
    Mutation, PulseConfig, PulseValue, Row, Sample, SelectorConfig, SliderConfig, SwitchConfig,
    TableConfig, WidgetConfig, WidgetDescriptor, WidgetValue,
};

macro_rules! typed_handle {
    ($(#[$doc:meta])* $name:ident, $config:ident, $variant:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            inner: WidgetHandle,
        }

        impl $name {
            /// Registers the widget (or updates its config if it already exists).
            pub fn register(engine: &Engine, path: &str, config: $config) -> Result<Self> {
                Self::register_descriptor(engine, path, WidgetDescriptor::new(WidgetConfig::$variant(config)))
            }

            fn register_descriptor(engine: &Engine, path: &str, descriptor: WidgetDescriptor) -> Result<Self> {
                engine.register(path, descriptor).map(|inner| Self { inner })
            }

            /// Untyped handle to the same registration.
            pub fn handle(&self) -> &WidgetHandle {
                &self.inner
            }

            pub fn remove(&self) -> Result<()> {
                self.inner.remove()
            }

            fn current(&self) -> Result<WidgetValue> {
                self.inner.value()
            }

            fn unexpected(&self) -> EngineError {
                EngineError::WidgetGone {
                    path: self.inner.path().to_string(),
                }
            }
        }
    };
}

macro_rules! interactive_handle {
    ($name:ident, $config:ident, $variant:ident) => {
        impl $name {
            /// Registers the widget with an action callback.
            pub fn register_with(
                engine: &Engine,
                path: &str,
                config: $config,
                callback: CallbackRef,
            ) -> Result<Self> {
                let descriptor =
                    WidgetDescriptor::new(WidgetConfig::$variant(config)).with_callback(callback);
                Self::register_descriptor(engine, path, descriptor)
            }

            /// Binds (or replaces) the action callback.
            pub fn bind(&self, callback: CallbackRef) -> Result<()> {
                self.inner.rebind_callback(callback)
            }

            pub fn unbind(&self) -> Result<()> {
                self.inner.unbind_callback()
            }
        }
    };
}

typed_handle!(
    /// Monotonic or signed counter.
    Counter, CounterConfig, Counter
);
typed_handle!(Gauge, GaugeConfig, Gauge);
typed_handle!(Histogram, HistogramConfig, Histogram);
typed_handle!(
    /// Stream of timestamped samples; keeps the last `retain`.
    Pulse, PulseConfig, Pulse
);
typed_handle!(Table, TableConfig, Table);
typed_handle!(
    /// Key/value board laid out by `BoardConfig::layout`.
    Board, BoardConfig, Board
);
typed_handle!(
    /// Button; the application counts acknowledged clicks.
    Click, ClickConfig, Click
);
typed_handle!(Selector, SelectorConfig, Selector);
typed_handle!(Slider, SliderConfig, Slider);
typed_handle!(Switch, SwitchConfig, Switch);

interactive_handle!(Click, ClickConfig, Click);
interactive_handle!(Selector, SelectorConfig, Selector);
interactive_handle!(Slider, SliderConfig, Slider);
interactive_handle!(Switch, SwitchConfig, Switch);

impl Counter {
    pub fn inc(&self, by: i64) -> Result<u64> {
        self.inner.update(Mutation::Inc(by))
    }

    /// Adds the configured step.
    pub fn step(&self) -> Result<u64> {
        self.inner.update(Mutation::Step)
    }

    pub fn value(&self) -> Result<i64> {
        match self.current()? {
            WidgetValue::Counter(v) => Ok(v),
            _ => Err(self.unexpected()),
        }
    }
}

impl Gauge {
    pub fn set(&self, level: f64) -> Result<u64> {
        self.inner.update(Mutation::Set(level))
    }

    pub fn value(&self) -> Result<f64> {
        match self.current()? {
            WidgetValue::Gauge(v) => Ok(v),
            _ => Err(self.unexpected()),
        }
    }
}

impl Histogram {
    /// Records one observation.
    pub fn add(&self, x: f64) -> Result<u64> {
        self.inner.update(Mutation::Observe(x))
    }

    pub fn value(&self) -> Result<HistogramValue> {
        match self.current()? {
            WidgetValue::Histogram(h) => Ok(h),
            _ => Err(self.unexpected()),
        }
    }
}

impl Pulse {
    pub fn push(&self, x: f64) -> Result<u64> {
        self.inner.update(Mutation::Push(x))
    }

    pub fn latest(&self) -> Result<Option<Sample>> {
        self.value().map(|p| p.latest().copied())
    }

    pub fn value(&self) -> Result<PulseValue> {
        match self.current()? {
            WidgetValue::Pulse(p) => Ok(p),
            _ => Err(self.unexpected()),
        }
    }
}

impl Table {
    /// Adds an empty row with an explicit id.
    pub fn add_row(&self, row: Row) -> Result<u64> {
        self.inner.update(Mutation::AddRow(row))
    }

    /// Adds a row with the next free id and returns that id.
    pub fn append_row<I, S>(&self, cells: I) -> Result<Row>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cells: Vec<String> = cells.into_iter().map(Into::into).collect();
        self.inner.append_row(cells).map(|(_, row)| row)
    }

    pub fn del_row(&self, row: Row) -> Result<u64> {
        self.inner.update(Mutation::DelRow(row))
    }

    pub fn set_cell(&self, row: Row, col: u64, value: impl Into<String>) -> Result<u64> {
        self.inner.update(Mutation::SetCell {
            row,
            col: Col(col),
            value: value.into(),
        })
    }

    pub fn cell(&self, row: Row, col: u64) -> Result<Option<String>> {
        match self.current()? {
            WidgetValue::Table(t) => Ok(t.cell(row, Col(col)).map(str::to_owned)),
            _ => Err(self.unexpected()),
        }
    }

    pub fn len(&self) -> Result<usize> {
        match self.current()? {
            WidgetValue::Table(t) => Ok(t.len()),
            _ => Err(self.unexpected()),
        }
    }
}

impl Board {
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<u64> {
        self.inner.update(Mutation::BoardSet {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn unset(&self, key: impl Into<String>) -> Result<u64> {
        self.inner.update(Mutation::BoardRemove { key: key.into() })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        match self.current()? {
            WidgetValue::Board(b) => Ok(b.get(key).map(str::to_owned)),
            _ => Err(self.unexpected()),
        }
    }
}

impl Click {
    /// Acknowledges one click.
    pub fn clicked(&self) -> Result<u64> {
        self.inner.update(Mutation::Clicked)
    }

    pub fn clicks(&self) -> Result<i64> {
        match self.current()? {
            WidgetValue::Click(n) => Ok(n),
            _ => Err(self.unexpected()),
        }
    }
}

impl Selector {
    pub fn select(&self, choice: Option<&str>) -> Result<u64> {
        self.inner.update(Mutation::Select(choice.map(str::to_owned)))
    }

    pub fn selected(&self) -> Result<Option<String>> {
        match self.current()? {
            WidgetValue::Selector(s) => Ok(s),
            _ => Err(self.unexpected()),
        }
    }
}

impl Slider {
    /// Sets the level; in-range values snap to the configured step.
    pub fn set(&self, level: f64) -> Result<u64> {
        self.inner.update(Mutation::Set(level))
    }

    pub fn value(&self) -> Result<f64> {
        match self.current()? {
            WidgetValue::Slider(v) => Ok(v),
            _ => Err(self.unexpected()),
        }
    }
}

impl Switch {
    pub fn toggle(&self, on: bool) -> Result<u64> {
        self.inner.update(Mutation::Toggle(on))
    }

    pub fn state(&self) -> Result<bool> {
        match self.current()? {
            WidgetValue::Switch(on) => Ok(on),
            _ => Err(self.unexpected()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, ActionEvent, CallbackFn};
    use crate::core::{EngineBuilder, EngineConfig, ViewerId};
    use crate::error::CallbackError;
    use crate::widgets::WidgetKind;
    use std::sync::Arc;

    fn engine() -> Arc<Engine> {
        EngineBuilder::new(EngineConfig::default()).build().unwrap()
    }

    #[tokio::test]
    async fn test_display_handles() {
        let engine = engine();
        let g = Gauge::register(&engine, "cpu", GaugeConfig { min: Some(0.0), max: Some(100.0) }).unwrap();
        g.set(42.5).unwrap();
        assert_eq!(g.value().unwrap(), 42.5);
        assert_eq!(g.set(f64::NAN).unwrap_err().as_label(), "invalid_value");

        let h = Histogram::register(
            &engine,
            "latency",
            HistogramConfig { bucket_bounds: vec![1.0, 10.0], retention: None },
        )
        .unwrap();
        h.add(0.5).unwrap();
        h.add(20.0).unwrap();
        assert_eq!(h.value().unwrap().total(), 2);

        let p = Pulse::register(&engine, "beat", PulseConfig { retain: 2 }).unwrap();
        for x in [1.0, 2.0, 3.0] {
            p.push(x).unwrap();
        }
        assert_eq!(p.value().unwrap().len(), 2);
        assert_eq!(p.latest().unwrap().map(|s| s.value), Some(3.0));

        let b = Board::register(&engine, "host", BoardConfig::default()).unwrap();
        b.set("os", "linux").unwrap();
        assert_eq!(b.get("os").unwrap().as_deref(), Some("linux"));
        b.unset("os").unwrap();
        assert_eq!(b.get("os").unwrap(), None);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_table_handle() {
        let engine = engine();
        let t = Table::register(&engine, "jobs", TableConfig::with_titles(["a", "b"])).unwrap();
        let first = t.append_row(["x", "y"]).unwrap();
        let second = t.append_row(["z"]).unwrap();
        assert_eq!((first, second), (Row(0), Row(1)));

        t.set_cell(second, 1, "w").unwrap();
        assert_eq!(t.cell(second, 1).unwrap().as_deref(), Some("w"));
        t.del_row(first).unwrap();
        assert_eq!(t.len().unwrap(), 1);
        assert_eq!(t.add_row(second).unwrap_err().as_label(), "invalid_value");
        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_append_row_ids() {
        let engine = engine();
        let t = Table::register(&engine, "log", TableConfig::with_titles(["who"])).unwrap();

        let appended: Vec<(Row, String)> = std::thread::scope(|s| {
            let writers: Vec<_> = (0..4)
                .map(|w| {
                    let t = t.clone();
                    s.spawn(move || {
                        (0..250)
                            .map(|i| {
                                let text = format!("w{w}-{i}");
                                (t.append_row([text.as_str()]).unwrap(), text)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            writers.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        let ids: std::collections::HashSet<Row> = appended.iter().map(|(row, _)| *row).collect();
        assert_eq!(ids.len(), 1000);
        for (row, text) in &appended {
            assert_eq!(t.cell(*row, 0).unwrap().as_deref(), Some(text.as_str()));
        }
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_handle_outlives_registration() {
        let engine = engine();
        let c = Counter::register(&engine, "c", CounterConfig::default()).unwrap();
        c.inc(1).unwrap();
        c.remove().unwrap();
        Gauge::register(&engine, "c", GaugeConfig::default()).unwrap();
        assert_eq!(c.inc(1).unwrap_err().as_label(), "widget_gone");
        assert_eq!(engine.read("c").unwrap().0.kind(), WidgetKind::Gauge);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_interactive_handles() {
        let engine = engine();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let cb = CallbackFn::arc("on", move |ev: ActionEvent| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(ev.action);
                Ok::<_, CallbackError>(())
            }
        });
        let sw = Switch::register(&engine, "sw", SwitchConfig { initial_state: true }).unwrap();
        assert!(sw.state().unwrap());
        sw.toggle(false).unwrap();
        assert!(!sw.state().unwrap());

        let viewer = ViewerId(99);
        engine.on_connect(viewer).unwrap();
        let act = || {
            engine.on_action_received(
                viewer,
                crate::actions::ActionEnvelope::new(
                    sw.handle().path().clone(),
                    Action::Switch { new_state: true },
                ),
            )
        };
        assert_eq!(act().unwrap_err().as_label(), "unsupported_action");
        sw.bind(cb).unwrap();
        act().unwrap();
        assert_eq!(rx.recv().await, Some(Some(Action::Switch { new_state: true })));
        sw.unbind().unwrap();
        assert_eq!(act().unwrap_err().as_label(), "unsupported_action");

        let click = Click::register(&engine, "btn", ClickConfig::default()).unwrap();
        click.clicked().unwrap();
        assert_eq!(click.clicks().unwrap(), 1);

        let choices = ["a", "b"].map(String::from).to_vec();
        let sel = Selector::register(&engine, "sel", SelectorConfig { choices }).unwrap();
        sel.select(Some("b")).unwrap();
        assert_eq!(sel.selected().unwrap().as_deref(), Some("b"));
        assert_eq!(sel.select(Some("c")).unwrap_err().as_label(), "invalid_value");

        let slider = Slider::register(&engine, "speed", SliderConfig::default()).unwrap();
        slider.set(41.6).unwrap();
        assert_eq!(slider.value().unwrap(), 42.0);
        engine.shutdown().await;
    }
}
