//! End-to-end tests for the scheduler engine, driven with a stub downloader
//! so no network is involved.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::data::{Data, Item, Request, Response};
use crate::error::{CrawlerError, ErrorKind, IllegalParameterError};
use crate::module::analyzer::LocalAnalyzer;
use crate::module::base::{impl_module_delegate, ModuleBase};
use crate::module::pipeline::LocalPipeline;
use crate::module::{gen_mid, Downloader, Module, ParseResponse, ProcessItem, Type};
use crate::monitor::{monitor, Record};
use crate::reader::MultipleReader;
use crate::scheduler::{DataArgs, ModuleArgs, RequestArgs, Scheduler, Status};

struct StubDownloader {
    base: ModuleBase,
    fetched: Mutex<Vec<String>>,
    delay: Duration,
}

impl StubDownloader {
    fn new(sn: u64, delay: Duration) -> Arc<Self> {
        Arc::new(StubDownloader {
            base: ModuleBase::new(gen_mid(Type::Downloader, sn, None), None).unwrap(),
            fetched: Mutex::new(Vec::new()),
            delay,
        })
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl_module_delegate!(StubDownloader);

impl Downloader for StubDownloader {
    fn download(&self, req: &Request) -> Result<Response, CrawlerError> {
        let _handling = self.base.start_handling();
        self.base.incr_called_count();
        if !req.valid() {
            return Err(CrawlerError::by(
                ErrorKind::Downloader,
                &IllegalParameterError::new("invalid request"),
            ));
        }
        self.base.incr_accepted_count();
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.fetched.lock().unwrap().push(req.url().to_string());
        self.base.incr_completed_count();
        Ok(Response::new(
            req.url(),
            200,
            Some("text/html".into()),
            Some(MultipleReader::from_bytes(b"<html></html>".to_vec())),
            req.depth(),
        ))
    }
}

fn small_data_args() -> DataArgs {
    DataArgs {
        req_buffer_cap: 10,
        req_max_buffer_number: 10,
        resp_buffer_cap: 10,
        resp_max_buffer_number: 2,
        item_buffer_cap: 10,
        item_max_buffer_number: 2,
        error_buffer_cap: 10,
        error_max_buffer_number: 1,
    }
}

fn request_args(domains: &[&str], max_depth: u32) -> RequestArgs {
    RequestArgs {
        accepted_domains: domains.iter().map(|d| d.to_string()).collect(),
        max_depth,
    }
}

fn link_parser(links: &'static [&'static str]) -> ParseResponse {
    Arc::new(move |resp: &Response| {
        let data = links
            .iter()
            .map(|link| Data::Request(Request::new(*link, resp.depth() + 1)))
            .collect();
        (data, Vec::new())
    })
}

fn noop_processor() -> ProcessItem {
    Arc::new(|_item: &Item| Ok(None))
}

fn module_args(
    downloader: &Arc<StubDownloader>,
    parsers: Vec<ParseResponse>,
    analyzer_sn: u64,
) -> ModuleArgs {
    ModuleArgs {
        downloaders: vec![Arc::clone(downloader) as Arc<dyn Downloader>],
        analyzers: vec![Arc::new(
            LocalAnalyzer::new(gen_mid(Type::Analyzer, analyzer_sn, None), parsers, None).unwrap(),
        )],
        pipelines: vec![Arc::new(
            LocalPipeline::new(
                gen_mid(Type::Pipeline, analyzer_sn, None),
                vec![noop_processor()],
                None,
            )
            .unwrap(),
        )],
    }
}

fn silent_record() -> Record {
    Arc::new(|_level, _msg| {})
}

fn run_until_idle_stop(scheduler: &Arc<Scheduler>, seed: &str) -> u64 {
    let checks = monitor(
        Arc::clone(scheduler),
        Duration::from_millis(10),
        Duration::from_millis(50),
        3,
        true,
        silent_record(),
    );
    scheduler.start(seed).unwrap();
    checks
        .recv_timeout(Duration::from_secs(20))
        .expect("monitor never reported completion")
}

fn wait_for_no_handling(scheduler: &Arc<Scheduler>) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let busy = scheduler
            .registrar
            .get_all()
            .values()
            .any(|m| m.as_module().handling_number() > 0);
        if !busy {
            return;
        }
        assert!(Instant::now() < deadline, "handling counters never drained");
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn lifecycle_guards_reject_out_of_order_calls() {
    let scheduler = Arc::new(Scheduler::new());
    assert_eq!(scheduler.status(), Status::Uninitialized);

    assert!(scheduler.start("http://example.com/").is_err());
    assert_eq!(scheduler.status(), Status::Uninitialized);
    assert!(scheduler.stop().is_err());
    assert_eq!(scheduler.status(), Status::Uninitialized);

    let downloader = StubDownloader::new(1, Duration::ZERO);
    scheduler
        .init(
            request_args(&["example.com"], 1),
            small_data_args(),
            module_args(&downloader, vec![link_parser(&[])], 1),
        )
        .unwrap();
    assert_eq!(scheduler.status(), Status::Initialized);
    assert!(scheduler.stop().is_err());
    assert_eq!(scheduler.status(), Status::Initialized);

    scheduler.start("http://example.com/").unwrap();
    assert_eq!(scheduler.status(), Status::Started);
    assert!(scheduler.start("http://example.com/").is_err());
    assert_eq!(scheduler.status(), Status::Started);
    assert!(scheduler
        .init(
            request_args(&["example.com"], 1),
            small_data_args(),
            module_args(&downloader, vec![link_parser(&[])], 1),
        )
        .is_err());
    assert_eq!(scheduler.status(), Status::Started);

    scheduler.stop().unwrap();
    assert_eq!(scheduler.status(), Status::Stopped);
}

#[test]
fn init_rejects_invalid_arguments() {
    let scheduler = Arc::new(Scheduler::new());
    let downloader = StubDownloader::new(1, Duration::ZERO);
    let bad_data_args = DataArgs {
        req_buffer_cap: 0,
        ..small_data_args()
    };
    assert!(scheduler
        .init(
            request_args(&["example.com"], 1),
            bad_data_args,
            module_args(&downloader, vec![link_parser(&[])], 1),
        )
        .is_err());
    assert_eq!(scheduler.status(), Status::Uninitialized);

    assert!(scheduler
        .init(
            request_args(&["example.com"], 1),
            small_data_args(),
            ModuleArgs::default(),
        )
        .is_err());
    assert_eq!(scheduler.status(), Status::Uninitialized);
}

#[test]
fn start_rejects_bad_seed_urls() {
    let scheduler = Arc::new(Scheduler::new());
    let downloader = StubDownloader::new(1, Duration::ZERO);
    scheduler
        .init(
            request_args(&["example.com"], 1),
            small_data_args(),
            module_args(&downloader, vec![link_parser(&[])], 1),
        )
        .unwrap();
    assert!(scheduler.start("").is_err());
    assert!(scheduler
        .init(
            request_args(&["example.com"], 1),
            small_data_args(),
            module_args(&downloader, vec![link_parser(&[])], 1),
        )
        .is_ok());
    assert!(scheduler.start("ftp://example.com/").is_err());
}

#[test]
fn zero_max_depth_downloads_exactly_the_seed() {
    let scheduler = Arc::new(Scheduler::new());
    let downloader = StubDownloader::new(1, Duration::ZERO);
    let parsers = vec![link_parser(&[
        "http://example.com/a",
        "http://example.com/b",
    ])];
    scheduler
        .init(
            request_args(&["example.com"], 0),
            small_data_args(),
            module_args(&downloader, parsers, 1),
        )
        .unwrap();

    let checks = run_until_idle_stop(&scheduler, "http://example.com/");
    assert!(checks >= 3);
    assert_eq!(scheduler.status(), Status::Stopped);
    assert_eq!(downloader.fetched(), vec!["http://example.com/".to_string()]);
}

#[test]
fn duplicate_urls_reach_the_downloader_once() {
    let scheduler = Arc::new(Scheduler::new());
    let downloader = StubDownloader::new(1, Duration::ZERO);
    // Every page links to the same URL twice.
    let parsers = vec![link_parser(&[
        "http://example.com/dup",
        "http://example.com/dup",
    ])];
    scheduler
        .init(
            request_args(&["example.com"], 3),
            small_data_args(),
            module_args(&downloader, parsers, 1),
        )
        .unwrap();

    run_until_idle_stop(&scheduler, "http://example.com/");
    let fetched = downloader.fetched();
    assert_eq!(fetched.len(), 2, "fetched: {:?}", fetched);
    assert_eq!(
        fetched
            .iter()
            .filter(|u| u.as_str() == "http://example.com/dup")
            .count(),
        1
    );
}

#[test]
fn off_domain_seed_downloads_nothing_and_goes_idle() {
    let scheduler = Arc::new(Scheduler::new());
    let downloader = StubDownloader::new(1, Duration::ZERO);
    scheduler
        .init(
            request_args(&["example.org"], 3),
            small_data_args(),
            module_args(&downloader, vec![link_parser(&[])], 1),
        )
        .unwrap();

    run_until_idle_stop(&scheduler, "http://example.com/");
    assert_eq!(scheduler.status(), Status::Stopped);
    assert!(downloader.fetched().is_empty());
}

#[test]
fn depth_filter_is_inclusive_at_max_depth() {
    let scheduler = Arc::new(Scheduler::new());
    let downloader = StubDownloader::new(1, Duration::ZERO);
    // A linear chain: / -> /1 -> /2 -> ...
    let parser: ParseResponse = Arc::new(|resp: &Response| {
        let next = format!("http://example.com/{}", resp.depth() + 1);
        (
            vec![Data::Request(Request::new(next, resp.depth() + 1))],
            Vec::new(),
        )
    });
    scheduler
        .init(
            request_args(&["example.com"], 2),
            small_data_args(),
            module_args(&downloader, vec![parser], 1),
        )
        .unwrap();

    run_until_idle_stop(&scheduler, "http://example.com/");
    let mut fetched = downloader.fetched();
    fetched.sort();
    // Depth 0, 1, and 2 are served; the depth-3 child is dropped.
    assert_eq!(
        fetched,
        vec![
            "http://example.com/".to_string(),
            "http://example.com/1".to_string(),
            "http://example.com/2".to_string(),
        ]
    );
}

#[test]
fn analyzer_errors_reach_the_error_channel() {
    let scheduler = Arc::new(Scheduler::new());
    let downloader = StubDownloader::new(1, Duration::ZERO);
    let failing_parser: ParseResponse = Arc::new(|_resp: &Response| {
        (
            Vec::new(),
            vec![CrawlerError::new(ErrorKind::Analyzer, "bad markup")],
        )
    });
    scheduler
        .init(
            request_args(&["example.com"], 0),
            small_data_args(),
            module_args(&downloader, vec![failing_parser], 1),
        )
        .unwrap();

    let errors = scheduler.error_chan().unwrap();
    scheduler.start("http://example.com/").unwrap();
    let err = errors
        .recv_timeout(Duration::from_secs(10))
        .expect("expected an analyzer error");
    assert_eq!(err.kind(), ErrorKind::Analyzer);
    assert_eq!(err.message(), "bad markup");
    scheduler.stop().unwrap();
}

#[test]
fn analyzer_produced_responses_are_rejected_with_an_error() {
    let scheduler = Arc::new(Scheduler::new());
    let downloader = StubDownloader::new(1, Duration::ZERO);
    // A misbehaving parser that echoes the response back as data.
    let echo_parser: ParseResponse = Arc::new(|resp: &Response| {
        let echo = Response::new(
            resp.url(),
            resp.status(),
            None,
            Some(MultipleReader::from_bytes(b"echo".to_vec())),
            resp.depth(),
        );
        (vec![Data::Response(echo)], Vec::new())
    });
    scheduler
        .init(
            request_args(&["example.com"], 0),
            small_data_args(),
            module_args(&downloader, vec![echo_parser], 1),
        )
        .unwrap();

    let errors = scheduler.error_chan().unwrap();
    scheduler.start("http://example.com/").unwrap();
    let err = errors
        .recv_timeout(Duration::from_secs(10))
        .expect("expected the echoed response to be rejected");
    assert_eq!(err.kind(), ErrorKind::Analyzer);
    assert!(err.message().contains("a response"), "message: {}", err.message());
    // The echoed response must not re-enter the flow as a second analysis.
    assert_eq!(downloader.fetched().len(), 1);
    scheduler.stop().unwrap();
}

#[test]
fn items_flow_to_the_pipeline() {
    let scheduler = Arc::new(Scheduler::new());
    let downloader = StubDownloader::new(1, Duration::ZERO);
    let item_parser: ParseResponse = Arc::new(|resp: &Response| {
        let mut item = Item::new();
        item.insert("url".to_string(), serde_json::json!(resp.url()));
        (vec![Data::Item(item)], Vec::new())
    });
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let recorder: ProcessItem = {
        let seen = Arc::clone(&seen);
        Arc::new(move |item: &Item| {
            if let Some(url) = item.get("url").and_then(|v| v.as_str()) {
                seen.lock().unwrap().push(url.to_string());
            }
            Ok(None)
        })
    };
    let args = ModuleArgs {
        downloaders: vec![Arc::clone(&downloader) as Arc<dyn Downloader>],
        analyzers: vec![Arc::new(
            LocalAnalyzer::new(gen_mid(Type::Analyzer, 1, None), vec![item_parser], None).unwrap(),
        )],
        pipelines: vec![Arc::new(
            LocalPipeline::new(gen_mid(Type::Pipeline, 1, None), vec![recorder], None).unwrap(),
        )],
    };
    scheduler
        .init(request_args(&["example.com"], 0), small_data_args(), args)
        .unwrap();

    run_until_idle_stop(&scheduler, "http://example.com/");
    assert_eq!(seen.lock().unwrap().as_slice(), ["http://example.com/"]);
}

#[test]
fn reinit_swaps_the_registry_and_supports_a_second_run() {
    let scheduler = Arc::new(Scheduler::new());
    let first_downloader = StubDownloader::new(1, Duration::ZERO);
    scheduler
        .init(
            request_args(&["example.com"], 0),
            small_data_args(),
            module_args(&first_downloader, vec![link_parser(&[])], 1),
        )
        .unwrap();

    // Re-init from Initialized with different modules drops the first set.
    let second_downloader = StubDownloader::new(2, Duration::ZERO);
    scheduler
        .init(
            request_args(&["example.com"], 0),
            small_data_args(),
            module_args(&second_downloader, vec![link_parser(&[])], 2),
        )
        .unwrap();
    let mids: Vec<String> = scheduler
        .registrar
        .get_all()
        .keys()
        .map(|mid| mid.as_str().to_string())
        .collect();
    assert!(mids.contains(&"D2".to_string()), "mids: {:?}", mids);
    assert!(!mids.contains(&"D1".to_string()), "mids: {:?}", mids);

    run_until_idle_stop(&scheduler, "http://example.com/");
    assert!(first_downloader.fetched().is_empty());
    assert_eq!(second_downloader.fetched().len(), 1);

    // And once stopped, a third init plus a fresh run still works: the dedup
    // set was reset, so the same seed is fetched again.
    let third_downloader = StubDownloader::new(3, Duration::ZERO);
    scheduler
        .init(
            request_args(&["example.com"], 0),
            small_data_args(),
            module_args(&third_downloader, vec![link_parser(&[])], 3),
        )
        .unwrap();
    run_until_idle_stop(&scheduler, "http://example.com/");
    assert_eq!(third_downloader.fetched().len(), 1);
}

#[test]
fn stop_during_active_work_drains_handling_counters() {
    let scheduler = Arc::new(Scheduler::new());
    let downloader = StubDownloader::new(1, Duration::from_millis(200));
    let parsers = vec![link_parser(&[
        "http://example.com/a",
        "http://example.com/b",
        "http://example.com/c",
    ])];
    scheduler
        .init(
            request_args(&["example.com"], 5),
            small_data_args(),
            module_args(&downloader, parsers, 1),
        )
        .unwrap();
    scheduler.start("http://example.com/").unwrap();

    // Let some downloads get in flight, then pull the plug.
    thread::sleep(Duration::from_millis(80));
    scheduler.stop().unwrap();
    assert_eq!(scheduler.status(), Status::Stopped);

    // In-flight module calls run to completion and their results are
    // discarded; nothing may be left as "handling".
    wait_for_no_handling(&scheduler);
    let summary = scheduler.summary().unwrap();
    assert_eq!(summary.status, "stopped");
    assert_eq!(summary.req_buffer_pool.total, 0);
    assert_eq!(summary.resp_buffer_pool.total, 0);
    assert_eq!(summary.item_buffer_pool.total, 0);
}

#[test]
fn summary_reflects_modules_and_dedup_set() {
    let scheduler = Arc::new(Scheduler::new());
    let downloader = StubDownloader::new(1, Duration::ZERO);
    scheduler
        .init(
            request_args(&["example.com"], 0),
            small_data_args(),
            module_args(&downloader, vec![link_parser(&[])], 1),
        )
        .unwrap();
    let summary = scheduler.summary().unwrap();
    assert_eq!(summary.status, "initialized");
    assert_eq!(summary.downloaders.len(), 1);
    assert_eq!(summary.analyzers.len(), 1);
    assert_eq!(summary.pipelines.len(), 1);
    assert_eq!(summary.num_url, 0);
    assert_eq!(summary.req_buffer_pool.buffer_cap, 10);

    run_until_idle_stop(&scheduler, "http://example.com/");
    let summary = scheduler.summary().unwrap();
    assert_eq!(summary.num_url, 1);
    assert_eq!(summary.downloaders[0].completed, 1);
}
