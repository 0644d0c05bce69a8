use std::thread;

use anyhow::Result;
use cadence_core::{drain_due_timers, pump_timers};
use cadence_hooks::{BatchCoalescer, BatchConfig, Debounced};
use web_time::Duration;

/// Feeds a burst of events through the batch coalescer while a debounced
/// "search box" settles alongside it.
fn main() -> Result<()> {
    env_logger::init();

    let batch = BatchCoalescer::new(
        |events: Vec<String>| println!("flushed {:>2} events: {events:?}", events.len()),
        BatchConfig {
            batch_window: Duration::from_millis(250),
            max_batch_size: 4,
            ..BatchConfig::default()
        },
    );

    let query = Debounced::new(String::new(), Duration::from_millis(200));
    query.value().subscribe(|q: &String| {
        if !q.is_empty() {
            println!("search settled on: {q:?}");
        }
    });

    let keystrokes = ["c", "ca", "cad", "cade", "cadence"];
    for (i, typed) in keystrokes.iter().enumerate() {
        query.feed(typed.to_string());
        batch.add_update(format!("evt-{i}"));
        pump_timers();
        thread::sleep(std::time::Duration::from_millis(80));
    }

    for i in keystrokes.len()..12 {
        batch.add_update(format!("evt-{i}"));
        pump_timers();
        thread::sleep(std::time::Duration::from_millis(80));
    }

    // Let the stragglers land, then drain whatever is still pending.
    for _ in 0..6 {
        drain_due_timers(8);
        thread::sleep(std::time::Duration::from_millis(60));
    }
    batch.finish();
    log::info!("feed drained");
    Ok(())
}
