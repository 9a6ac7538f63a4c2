//! Detached watchdog for a running scheduler: periodic summaries, error
//! reporting, idle detection, and the graceful-shutdown trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use crate::scheduler::{Scheduler, Status};

/// Sink for monitor output. The level is 0 for info, 1 for warnings, 2 for
/// errors.
pub type Record = Arc<dyn Fn(u8, &str) + Send + Sync>;

const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(200);
const DEFAULT_SUMMARIZE_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_MAX_IDLE_COUNT: usize = 5;

/// Watches `scheduler` until it goes idle or stops.
///
/// Every `summarize_interval` the scheduler summary is rendered as JSON and
/// recorded when it changed; every `check_interval` activity is inspected.
/// After `max_idle_count` consecutive idle observations the scheduler is
/// stopped (when `autostop` is set) and the returned channel yields the
/// number of checks performed.
///
/// Zero durations and counts fall back to defaults.
pub fn monitor(
    scheduler: Arc<Scheduler>,
    check_interval: Duration,
    summarize_interval: Duration,
    max_idle_count: usize,
    autostop: bool,
    record: Record,
) -> mpsc::Receiver<u64> {
    let check_interval = if check_interval.is_zero() {
        DEFAULT_CHECK_INTERVAL
    } else {
        check_interval
    };
    let summarize_interval = if summarize_interval.is_zero() {
        DEFAULT_SUMMARIZE_INTERVAL
    } else {
        summarize_interval
    };
    let max_idle_count = if max_idle_count == 0 {
        DEFAULT_MAX_IDLE_COUNT
    } else {
        max_idle_count
    };

    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("skitter-monitor".to_string())
        .spawn(move || {
            wait_for_start(&scheduler);
            let done = Arc::new(AtomicBool::new(false));
            spawn_summarizer(
                Arc::clone(&scheduler),
                summarize_interval,
                Arc::clone(&record),
                Arc::clone(&done),
            );
            spawn_error_reporter(&scheduler, Arc::clone(&record));

            let check_count = check_until_idle(
                &scheduler,
                check_interval,
                max_idle_count,
                autostop,
                &record,
            );
            done.store(true, Ordering::SeqCst);
            let _ = tx.send(check_count);
        });
    if let Err(e) = spawned {
        crate::utils::log(&format!("Couldn't spawn the monitor: {}", e));
    }
    rx
}

fn wait_for_start(scheduler: &Arc<Scheduler>) {
    while scheduler.status() != Status::Started {
        thread::sleep(Duration::from_millis(10));
    }
}

fn spawn_summarizer(
    scheduler: Arc<Scheduler>,
    interval: Duration,
    record: Record,
    done: Arc<AtomicBool>,
) {
    let spawned = thread::Builder::new()
        .name("skitter-monitor-summary".to_string())
        .spawn(move || {
            let mut prev = String::new();
            while !done.load(Ordering::SeqCst) {
                if let Ok(summary) = scheduler.summary() {
                    match serde_json::to_string_pretty(&summary) {
                        Ok(text) if text != prev => {
                            record(0, &format!("Monitor summary:\n{}", text));
                            prev = text;
                        }
                        Ok(_) => {}
                        Err(e) => record(1, &format!("Couldn't render the summary: {}", e)),
                    }
                }
                thread::sleep(interval);
            }
        });
    if let Err(e) = spawned {
        crate::utils::log(&format!("Couldn't spawn the summarizer: {}", e));
    }
}

fn spawn_error_reporter(scheduler: &Arc<Scheduler>, record: Record) {
    let errors = match scheduler.error_chan() {
        Ok(errors) => errors,
        Err(e) => {
            record(1, &format!("Couldn't open the error channel: {}", e));
            return;
        }
    };
    // The iterator ends once the error pool is closed and drained.
    let spawned = thread::Builder::new()
        .name("skitter-monitor-errors".to_string())
        .spawn(move || {
            for err in errors.iter() {
                record(2, &format!("Received an error: {}", err));
            }
        });
    if let Err(e) = spawned {
        crate::utils::log(&format!("Couldn't spawn the error reporter: {}", e));
    }
}

fn check_until_idle(
    scheduler: &Arc<Scheduler>,
    interval: Duration,
    max_idle_count: usize,
    autostop: bool,
    record: &Record,
) -> u64 {
    let mut check_count: u64 = 0;
    let mut idle_count: usize = 0;
    loop {
        thread::sleep(interval);
        check_count += 1;
        let status = scheduler.status();
        if status == Status::Stopped || status == Status::Stopping {
            break;
        }
        if status != Status::Started {
            continue;
        }
        if scheduler.idle() {
            idle_count += 1;
            if idle_count >= max_idle_count {
                record(
                    0,
                    &format!(
                        "The scheduler has been idle for {} consecutive checks.",
                        idle_count
                    ),
                );
                if autostop {
                    match scheduler.stop() {
                        Ok(()) => record(0, "Stopped the scheduler."),
                        Err(e) => record(2, &format!("Couldn't stop the scheduler: {}", e)),
                    }
                }
                break;
            }
        } else {
            idle_count = 0;
        }
    }
    check_count
}
