use std::cell::Cell;
use std::rc::Rc;
use std::thread;

use anyhow::Result;
use cadence_core::{clock, next_timer_deadline, pump_timers, schedule_once};
use cadence_hooks::{AttemptContext, RetryConfig, RetryController, RetryFailure, RetryState};
use web_time::Duration;

/// Drives a deliberately flaky "fetch" through the retry orchestrator and
/// prints the live countdown between attempts. Run with RUST_LOG=info for
/// the retry observer output.
fn main() -> Result<()> {
    env_logger::init();

    let attempts = Rc::new(Cell::new(0u32));
    let retry = RetryController::new(
        {
            let attempts = attempts.clone();
            move |url: &'static str, ctx: AttemptContext<String, String>| {
                let n = attempts.get() + 1;
                attempts.set(n);
                println!("attempt {n}: GET {url}");
                // Simulated latency: the attempt settles later, from a timer.
                schedule_once(Duration::from_millis(120), move || {
                    if n < 3 {
                        ctx.fail(format!("connection reset (attempt {n})"));
                    } else {
                        ctx.succeed(format!("200 OK for {url}"));
                    }
                });
            }
        },
        RetryConfig {
            max_attempts: 4,
            initial_delay: Duration::from_millis(400),
            countdown_poll: Duration::from_millis(100),
            on_retry: Some(Rc::new(|err: &String, retry_no, delay| {
                log::info!("scheduling retry #{retry_no} in {delay:?} after: {err}");
            })),
            ..RetryConfig::default()
        },
    );

    retry.state().subscribe(|s: &RetryState<String>| {
        if s.is_retrying && !s.time_until_next_retry.is_zero() {
            println!("  retrying in {:?}", s.time_until_next_retry);
        }
    });

    let outcome = retry.execute("https://example.test/feed");
    outcome.on_settled(|result| match result {
        Ok(body) => println!("fetched: {body}"),
        Err(RetryFailure::Operation(err)) => println!("gave up: {err}"),
        Err(RetryFailure::Cancelled) => println!("cancelled"),
    });

    // Pump until settled, sleeping only as long as the queue allows.
    while !outcome.is_settled() {
        pump_timers();
        let wait = match next_timer_deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(clock::now())
                .clamp(Duration::from_millis(1), Duration::from_millis(50)),
            None => Duration::from_millis(10),
        };
        thread::sleep(wait);
    }
    Ok(())
}
