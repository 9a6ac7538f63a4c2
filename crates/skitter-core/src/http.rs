//! Shared HTTP client: connection reuse via a single Agent, capped
//! concurrency, retry with jittered backoff.

use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::Duration;

use rand::Rng;

const REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CONCURRENCY: usize = 32;
const MAX_CONCURRENCY_CAP: usize = 128;
const DEFAULT_RETRY_COUNT: usize = 2;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 5_000;
const MAX_IDLE_PER_HOST: usize = 16;

fn concurrency_from_env() -> usize {
    std::env::var("SKITTER_NETWORK_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .map(|n| n.clamp(1, MAX_CONCURRENCY_CAP))
        .unwrap_or_else(|| (num_cpus::get() * 4).clamp(4, DEFAULT_CONCURRENCY))
}

fn retry_count_from_env() -> usize {
    std::env::var("SKITTER_HTTP_RETRIES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_RETRY_COUNT)
}

// Caps in-flight requests. `take` parks the caller until one of the slots
// frees up; the returned token gives its slot back on drop, so a fetch can
// never leak a slot whichever way it exits.
struct FetchSlots {
    free: Mutex<usize>,
    freed: Condvar,
}

struct SlotToken<'a> {
    slots: &'a FetchSlots,
}

impl FetchSlots {
    fn new(limit: usize) -> Self {
        FetchSlots {
            free: Mutex::new(limit.max(1)),
            freed: Condvar::new(),
        }
    }

    fn take(&self) -> SlotToken<'_> {
        let free = self.free.lock().unwrap();
        let mut free = self.freed.wait_while(free, |free| *free == 0).unwrap();
        *free -= 1;
        SlotToken { slots: self }
    }
}

impl Drop for SlotToken<'_> {
    fn drop(&mut self) {
        *self.slots.free.lock().unwrap() += 1;
        self.slots.freed.notify_one();
    }
}

/// A fully fetched page: final URL after redirects, status, and body bytes.
#[derive(Debug, Clone)]
pub struct Page {
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Default)]
struct FetchMetrics {
    requests_total: AtomicU64,
    requests_success: AtomicU64,
    requests_failed: AtomicU64,
    bytes_downloaded: AtomicU64,
}

impl FetchMetrics {
    fn record(&self, success: bool, bytes: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Snapshot of the client's counters, for summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchStats {
    pub requests_total: u64,
    pub requests_success: u64,
    pub requests_failed: u64,
    pub bytes_downloaded: u64,
}

/// HTTP client: one Agent (connection reuse), bounded concurrent requests.
pub struct HttpClient {
    agent: ureq::Agent,
    slots: FetchSlots,
    metrics: Arc<FetchMetrics>,
}

impl HttpClient {
    pub fn new(max_concurrent: usize) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .max_idle_connections_per_host(MAX_IDLE_PER_HOST)
            .build();
        Self {
            agent,
            slots: FetchSlots::new(max_concurrent),
            metrics: Arc::new(FetchMetrics::default()),
        }
    }

    /// GET `url` and snapshot the body. 4xx pages are returned as-is (the
    /// caller decides what a 404 means); 5xx/429 and transport errors are
    /// retried with backoff before failing.
    pub fn fetch(&self, url: &str) -> Result<Page, String> {
        let _slot = self.slots.take();
        let retries = retry_count_from_env();
        let mut attempt = 0usize;
        let mut backoff = DEFAULT_RETRY_BACKOFF_MS;
        loop {
            attempt += 1;
            let outcome = match self.agent.get(url).call() {
                Ok(resp) => Ok(resp),
                Err(ureq::Error::Status(code, resp)) if code < 500 && code != 429 => Ok(resp),
                Err(ureq::Error::Status(code, _)) => Err(format!("HTTP {}", code)),
                Err(e) => Err(e.to_string()),
            };
            match outcome {
                Ok(resp) => {
                    let page = Self::snapshot(resp)?;
                    self.metrics.record(true, page.body.len() as u64);
                    return Ok(page);
                }
                Err(msg) => {
                    if attempt <= retries {
                        std::thread::sleep(Duration::from_millis(jittered(backoff)));
                        backoff = backoff.saturating_mul(2).min(MAX_BACKOFF_MS);
                        continue;
                    }
                    self.metrics.record(false, 0);
                    return Err(msg);
                }
            }
        }
    }

    fn snapshot(resp: ureq::Response) -> Result<Page, String> {
        let final_url = resp.get_url().to_string();
        let status = resp.status();
        let content_type = {
            let ct = resp.content_type();
            if ct.is_empty() {
                None
            } else {
                Some(ct.to_string())
            }
        };
        // Pre-allocate from Content-Length if present to reduce reallocs.
        let hint = resp
            .header("Content-Length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = Vec::with_capacity(if hint > 0 { hint } else { 64 * 1024 });
        resp.into_reader()
            .read_to_end(&mut body)
            .map_err(|e| e.to_string())?;
        Ok(Page {
            final_url,
            status,
            content_type,
            body,
        })
    }

    pub fn stats(&self) -> FetchStats {
        FetchStats {
            requests_total: self.metrics.requests_total.load(Ordering::Relaxed),
            requests_success: self.metrics.requests_success.load(Ordering::Relaxed),
            requests_failed: self.metrics.requests_failed.load(Ordering::Relaxed),
            bytes_downloaded: self.metrics.bytes_downloaded.load(Ordering::Relaxed),
        }
    }
}

fn jittered(backoff_ms: u64) -> u64 {
    let jitter = backoff_ms / 4;
    if jitter == 0 {
        return backoff_ms;
    }
    backoff_ms + rand::thread_rng().gen_range(0..=jitter)
}

static CLIENT: OnceLock<HttpClient> = OnceLock::new();

/// The process-wide client; concurrency read from
/// `SKITTER_NETWORK_CONCURRENCY` at first use.
pub fn global_client() -> &'static HttpClient {
    CLIENT.get_or_init(|| HttpClient::new(concurrency_from_env()))
}
