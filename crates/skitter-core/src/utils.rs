//! Small shared helpers: timestamped logging with env-based quieting.

use std::env;

use chrono::Local;

fn is_quiet() -> bool {
    if env::var("SKITTER_QUIET")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false)
    {
        return true;
    }
    env::var("SKITTER_LOG")
        .map(|v| {
            let v = v.to_lowercase();
            v == "quiet" || v == "error"
        })
        .unwrap_or(false)
}

/// Prints a timestamped line unless quieted via SKITTER_QUIET / SKITTER_LOG.
pub fn log(message: &str) {
    if is_quiet() {
        return;
    }
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    println!("[{}] {}", timestamp, message);
}
