//! # Example: In-process viewer
//!
//! Registers a few widgets, drives them from a producer task, and mirrors them into a
//! [`LocalViewer`] the way a remote dashboard would. Engine events are rendered by the
//! built-in `LogWriter`.
//!
//! ```text
//! producer ──update──► Engine ──deltas──► LocalViewer (replicas)
//!                         ▲                    │
//!                         └── slider action ───┘
//! ```
//!
//! Run with:
//! ```bash
//! cargo run --example local_viewer --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use livedash::{
    Action, ActionEvent, CallbackError, CallbackFn, Counter, CounterConfig, EngineBuilder,
    EngineConfig, LocalViewer, LogWriter, Pulse, PulseConfig, Slider, SliderConfig, Subscribe,
    Table, TableConfig,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let engine = EngineBuilder::new(EngineConfig::default())
        .with_subscribers(subs)
        .build()?;

    let done = Counter::register(&engine, "jobs.done", CounterConfig::default())?;
    let beat = Pulse::register(&engine, "jobs.beat", PulseConfig { retain: 16 })?;
    let jobs = Table::register(&engine, "jobs.list", TableConfig::with_titles(["job", "state"]))?;

    // The slider paces the producer; the callback only records the requested level.
    let speed = Slider::register(&engine, "ui.speed", SliderConfig::default())?;
    let level = speed.clone();
    speed.bind(CallbackFn::arc("speed", move |ev: ActionEvent| {
        let level = level.clone();
        async move {
            if let Some(Action::Slider { new_value }) = ev.action {
                level
                    .set(new_value)
                    .map_err(|e| CallbackError::rejected(e.as_message()))?;
            }
            Ok(())
        }
    }))?;
    speed.set(20.0)?;

    let producer = {
        let (done, beat, jobs, speed) = (done.clone(), beat.clone(), jobs.clone(), speed.clone());
        tokio::spawn(async move {
            for i in 0..12u32 {
                let row = jobs.append_row([format!("job-{i}"), "running".to_string()])?;
                let pace = speed.value()?.max(1.0);
                tokio::time::sleep(Duration::from_millis((400.0 / pace * 10.0) as u64)).await;
                jobs.set_cell(row, 1, "done")?;
                done.step()?;
                beat.push(f64::from(i))?;
            }
            Ok::<_, livedash::EngineError>(())
        })
    };

    let viewer = LocalViewer::connect(&engine)?;
    for path in ["jobs.done", "jobs.beat", "jobs.list", "ui.speed"] {
        viewer.subscribe(path)?;
    }
    viewer.act("ui.speed", Action::Slider { new_value: 80.0 })?;

    while !producer.is_finished() {
        let applied = tokio::time::timeout(Duration::from_millis(500), viewer.wait_and_sync()).await;
        if let Ok(Ok(n)) = applied {
            println!("viewer applied {n} delta(s); done = {:?}", viewer.value("jobs.done"));
        }
    }
    producer.await??;
    viewer.sync()?;

    for path in viewer.paths() {
        if let Some(replica) = viewer.replica(path.as_str()) {
            println!("{path} @ rev {}: {:?}", replica.revision, replica.value);
        }
    }

    drop(viewer);
    engine.shutdown().await;
    Ok(())
}
