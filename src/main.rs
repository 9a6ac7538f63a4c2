//! Thin CLI layer: parse flags, wire the default modules, run the scheduler
//! under the monitor, and exit 0 only on a graceful idle shutdown.

mod setup;

use clap::{Arg, ArgAction, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::io::IsTerminal;
use std::process;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use skitter_core::{monitor, DataArgs, ModuleArgs, Record, RequestArgs, Scheduler};

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn warning(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.yellow());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn make_record(quiet: bool) -> Record {
    Arc::new(move |level, msg| match level {
        0 => {
            if !quiet {
                dim(msg);
            }
        }
        1 => warning(msg),
        _ => error(msg),
    })
}

/// Show a spinner until the monitor reports completion.
fn wait_with_spinner(checks: mpsc::Receiver<u64>) {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⠈⠐⠠⠰⠸⠹")
            .template("{spinner:.dim} {msg}")
            .unwrap(),
    );
    spinner.set_message("Crawling...");
    loop {
        match checks.try_recv() {
            Ok(_) => {
                spinner.finish_and_clear();
                return;
            }
            Err(mpsc::TryRecvError::Disconnected) => {
                spinner.finish_and_clear();
                return;
            }
            Err(mpsc::TryRecvError::Empty) => {}
        }
        spinner.tick();
        thread::sleep(Duration::from_millis(80));
    }
}

fn main() {
    let matches = Command::new("skitter")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Bhuvan Prakash <bhuvanstark6@gmail.com>")
        .about("Concurrent web crawler: fetch pages inside accepted domains up to a depth, saving them to a directory")
        .after_help(
            "Examples:\n  skitter --first http://example.com/ --domains example.com --depth 2\n  skitter --first http://docs.example.com/start --domains example.com --dir ./pages",
        )
        .arg(
            Arg::new("first")
                .long("first")
                .value_name("URL")
                .default_value("http://example.com/")
                .help("The first URL to access"),
        )
        .arg(
            Arg::new("domains")
                .long("domains")
                .value_name("LIST")
                .default_value("example.com")
                .help("Accepted primary domains, comma separated"),
        )
        .arg(
            Arg::new("depth")
                .long("depth")
                .value_name("N")
                .default_value("3")
                .value_parser(clap::value_parser!(u32))
                .help("Maximum crawl depth"),
        )
        .arg(
            Arg::new("dir")
                .long("dir")
                .value_name("PATH")
                .default_value("./pages")
                .help("Directory the fetched pages are saved to"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppress periodic summaries; show a spinner instead"),
        )
        .get_matches();

    let first = matches
        .get_one::<String>("first")
        .cloned()
        .unwrap_or_default();
    let domains_raw = matches
        .get_one::<String>("domains")
        .cloned()
        .unwrap_or_default();
    let depth = matches.get_one::<u32>("depth").copied().unwrap_or(3);
    let dir = matches.get_one::<String>("dir").cloned().unwrap_or_default();
    let quiet = matches.get_flag("quiet");
    if quiet {
        env::set_var("SKITTER_QUIET", "1");
    }

    let accepted_domains: Vec<String> = domains_raw
        .split(',')
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect();
    if accepted_domains.is_empty() {
        error("No accepted primary domains given.");
        process::exit(2);
    }

    let request_args = RequestArgs {
        accepted_domains,
        max_depth: depth,
    };
    let data_args = DataArgs {
        req_buffer_cap: 50,
        req_max_buffer_number: 1000,
        resp_buffer_cap: 50,
        resp_max_buffer_number: 10,
        item_buffer_cap: 50,
        item_max_buffer_number: 100,
        error_buffer_cap: 50,
        error_max_buffer_number: 1,
    };

    let downloaders = match setup::get_downloaders(1) {
        Ok(downloaders) => downloaders,
        Err(e) => {
            error(&format!("An error occurred when creating downloaders: {}", e));
            process::exit(1);
        }
    };
    let analyzers = match setup::get_analyzers(1) {
        Ok(analyzers) => analyzers,
        Err(e) => {
            error(&format!("An error occurred when creating analyzers: {}", e));
            process::exit(1);
        }
    };
    let pipelines = match setup::get_pipelines(1, &dir) {
        Ok(pipelines) => pipelines,
        Err(e) => {
            error(&format!("An error occurred when creating pipelines: {}", e));
            process::exit(1);
        }
    };
    let module_args = ModuleArgs {
        downloaders,
        analyzers,
        pipelines,
    };

    let scheduler = Arc::new(Scheduler::new());
    if let Err(e) = scheduler.init(request_args, data_args, module_args) {
        error(&format!("An error occurred when initializing the scheduler: {}", e));
        process::exit(1);
    }

    // Monitor cadence is tunable for test harnesses and impatient shells.
    let check_interval = Duration::from_millis(env_u64("SKITTER_CHECK_INTERVAL_MS", 1_000));
    let summarize_interval = Duration::from_millis(env_u64("SKITTER_SUMMARIZE_INTERVAL_MS", 500));
    let max_idle_count = env_u64("SKITTER_MAX_IDLE_COUNT", 5) as usize;
    let checks = monitor(
        Arc::clone(&scheduler),
        check_interval,
        summarize_interval,
        max_idle_count,
        true,
        make_record(quiet),
    );

    if let Err(e) = scheduler.start(&first) {
        error(&format!("An error occurred when starting the scheduler: {}", e));
        process::exit(1);
    }

    if quiet && use_color() {
        wait_with_spinner(checks);
    } else {
        let _ = checks.recv();
    }

    match scheduler.summary() {
        Ok(summary) => {
            info("Crawl finished.");
            match serde_json::to_string_pretty(&summary) {
                Ok(text) => dim(&text),
                Err(e) => warning(&format!("Couldn't render the final summary: {}", e)),
            }
        }
        Err(e) => warning(&format!("Couldn't fetch the final summary: {}", e)),
    }
}
