//! # Rollout Scheduler Demo
//!
//! Runs the dispatch scheduler against an in-memory work queue for a few
//! seconds and prints what it released.
//!
//! ## Features Demonstrated
//!
//! ### 1. Rollout Windows
//! - Window list loaded from a JSON file, or a built-in default
//! - Invalid entries reported through `tracing` while valid siblings apply
//! - Current rate, next boundary and a dispatch estimate printed up front
//!
//! ### 2. Pacing
//! - A limited window spaces releases `unit / N` apart
//! - Live reconfiguration halfway through the run
//!
//! ### 3. Empty-Queue Backoff
//! - A bursty producer refills the queue at random intervals
//! - Empty polls back off instead of spinning
//!
//! ### 4. Graceful Shutdown
//! - `Scheduler::stop` stops the pacer and waits for the supervisor
//!
//! ## Running
//!
//! ```bash
//! # Built-in windows (20/sec, switching to unlimited midway)
//! cargo run -p rollout-scheduler --bin demo
//!
//! # Windows from a file: a JSON array of {days, start, end, rate}
//! cargo run -p rollout-scheduler --bin demo -- windows.json
//!
//! # Shorter run
//! cargo run -p rollout-scheduler --bin demo -- --quick
//!
//! # See schedule rebuilds and dispatches
//! RUST_LOG=rollout_scheduler=debug cargo run -p rollout-scheduler --bin demo
//! ```

use anyhow::Context;
use rand::Rng;
use rollout_scheduler::{MemoryQueue, Scheduler, SchedulerConfig, SchedulerMetrics, WatchedSource};
use rollout_window::{Configuration, RawWindow, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_WINDOWS: &str = r#"[
    {"rate": "20/sec"},
    {"days": ["sat", "sun"], "start": "00:00", "end": "06:00", "rate": 0},
    {"days": ["someday"], "rate": "5/min"}
]"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let quick = args.iter().any(|a| a == "--quick");
    let path = args.iter().find(|a| !a.starts_with("--"));
    let run_for = if quick {
        Duration::from_secs(2)
    } else {
        Duration::from_secs(6)
    };

    let windows = load_windows(path.map(String::as_str))?;

    println!("Demo Configuration:");
    println!("   Windows: {}", path.map_or("built-in", String::as_str));
    println!("   Entries: {}", windows.len());
    println!("   Run time: {:?}", run_for);
    println!();

    // =========================================================================
    // PHASE 1: Inspect the windows
    // =========================================================================

    let (configuration, parsed) = Configuration::from_raw(Some(windows.as_slice()));
    if let Err(errors) = &parsed {
        println!("   Skipped invalid entries: {errors}");
    }
    let now = Utc::now();
    let active = configuration.active(now);
    println!("Phase 1: Windows");
    println!("   Valid windows: {}", configuration.snapshot().len());
    println!("   Rate now: {}", active.rate);
    match active.until {
        Some(until) => println!("   Next boundary: {until}"),
        None => println!("   Next boundary: none"),
    }
    match configuration.estimate(now, 99) {
        Some(at) => println!("   100th item expected at: {at}"),
        None => println!("   100th item expected at: not within a week"),
    }
    println!();

    // =========================================================================
    // PHASE 2: Dispatch
    // =========================================================================

    println!("Phase 2: Dispatching");
    let source = Arc::new(WatchedSource::new(Some(windows)));
    let queue = Arc::new(MemoryQueue::<u64>::new());
    queue.extend(0..50);

    let config = SchedulerConfig::default()
        .with_backoff_init(Duration::from_millis(50))
        .with_backoff_limit(Duration::from_millis(400));
    let scheduler = Scheduler::start(Arc::clone(&source), Arc::clone(&queue), config);
    let metrics = Arc::clone(scheduler.metrics());

    let producer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            let mut next_id = 50u64;
            loop {
                let (pause, burst) = {
                    let mut rng = rand::thread_rng();
                    (rng.gen_range(200..800), rng.gen_range(0..40))
                };
                tokio::time::sleep(Duration::from_millis(pause)).await;
                queue.extend(next_id..next_id + burst);
                next_id += burst;
            }
        })
    };

    let half = run_for / 2;
    tokio::time::sleep(half).await;
    print_progress("midway", &metrics, &queue);

    println!("   Reconfiguring: unlimited");
    source.set(Some(vec![RawWindow::with_rate("unlimited")]));
    tokio::time::sleep(run_for - half).await;

    producer.abort();
    scheduler.stop().await?;
    print_progress("stopped", &metrics, &queue);
    println!();

    // =========================================================================
    // PHASE 3: Final statistics
    // =========================================================================

    println!("Phase 3: Final Statistics");
    println!("   Dispatched:      {}", metrics.dispatched());
    println!("   Empty polls:     {}", metrics.empty_polls());
    println!("   Queue errors:    {}", metrics.queue_errors());
    println!("   Schedules built: {}", metrics.schedules_built());
    println!("   Config errors:   {}", metrics.config_errors());
    println!(
        "   Throughput:      {:.1} items/sec",
        metrics.dispatched() as f64 / run_for.as_secs_f64()
    );

    Ok(())
}

fn load_windows(path: Option<&str>) -> anyhow::Result<Vec<RawWindow>> {
    let json = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading window file {path}"))?,
        None => DEFAULT_WINDOWS.to_owned(),
    };
    serde_json::from_str(&json).context("window list must be a JSON array of objects")
}

fn print_progress(label: &str, metrics: &SchedulerMetrics, queue: &MemoryQueue<u64>) {
    println!(
        "   [{label}] dispatched={} pending={} empty_polls={} schedules={}",
        metrics.dispatched(),
        queue.pending_count(),
        metrics.empty_polls(),
        metrics.schedules_built(),
    );
}
