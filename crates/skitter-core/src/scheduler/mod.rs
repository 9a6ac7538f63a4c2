//! The scheduling and data-flow engine: owns the four buffer pools, drives
//! worker modules by score, deduplicates the frontier, and bounds traversal
//! by depth and primary domain.

pub mod args;
pub mod status;
pub mod summary;

#[cfg(test)]
mod scheduler_tests;

use std::error::Error;
use std::sync::{mpsc, Arc, Mutex, RwLock};
use std::thread;

use dashmap::DashSet;
use url::Url;

use crate::data::{Data, Item, Request, Response};
use crate::error::{CrawlerError, ErrorKind, IllegalParameterError};
use crate::module::{Analyzer, Downloader, Module, ModuleInstance, Pipeline, Registrar, Type};
use crate::pool::BufferPool;
use crate::utils;

pub use args::{DataArgs, ModuleArgs, ModuleArgsSummary, RequestArgs};
pub use status::Status;
pub use summary::{BufferPoolSummary, SchedSummaryStruct};

pub(crate) fn gen_error(msg: impl Into<String>) -> CrawlerError {
    CrawlerError::new(ErrorKind::Scheduler, msg)
}

pub(crate) fn gen_error_by(err: &dyn Error) -> CrawlerError {
    CrawlerError::by(ErrorKind::Scheduler, err)
}

pub(crate) fn gen_parameter_error(msg: impl Into<String>) -> CrawlerError {
    CrawlerError::by(ErrorKind::Scheduler, &IllegalParameterError::new(msg.into()))
}

// Everything one crawl run owns: the argument containers and the four pools.
// Rebuilt on every init; worker loops hold their own Arc so a re-init cannot
// pull the pools out from under them.
struct EngineCtx {
    request_args: RequestArgs,
    data_args: DataArgs,
    req_pool: Arc<BufferPool<Request>>,
    resp_pool: Arc<BufferPool<Response>>,
    item_pool: Arc<BufferPool<Item>>,
    error_pool: Arc<BufferPool<CrawlerError>>,
}

impl EngineCtx {
    fn close_all(&self) {
        self.req_pool.close();
        self.resp_pool.close();
        self.item_pool.close();
        self.error_pool.close();
    }

    fn any_closed(&self) -> Option<&'static str> {
        if self.req_pool.closed() {
            Some("request")
        } else if self.resp_pool.closed() {
            Some("response")
        } else if self.item_pool.closed() {
            Some("item")
        } else if self.error_pool.closed() {
            Some("error")
        } else {
            None
        }
    }
}

/// One owned crawl engine. Create it, `init` it with arguments and modules,
/// then `start` it with a seed URL; the monitor (or the caller) eventually
/// calls `stop`.
pub struct Scheduler {
    status: Mutex<Status>,
    registrar: Arc<Registrar>,
    ctx: RwLock<Option<Arc<EngineCtx>>>,
    // Canonical URL signatures already admitted to the frontier.
    url_map: Arc<DashSet<String>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            status: Mutex::new(Status::Uninitialized),
            registrar: Arc::new(Registrar::new()),
            ctx: RwLock::new(None),
            url_map: Arc::new(DashSet::new()),
        }
    }

    pub fn status(&self) -> Status {
        *self.status.lock().unwrap()
    }

    /// Prepares (or re-prepares) the engine: validates arguments, rebuilds
    /// the buffer pools, swaps the module registry, and resets the URL dedup
    /// set. May be called again once the scheduler is initialized or stopped.
    pub fn init(
        &self,
        request_args: RequestArgs,
        data_args: DataArgs,
        module_args: ModuleArgs,
    ) -> Result<(), CrawlerError> {
        self.check_and_set_status(Status::Initializing)?;
        let result = self.do_init(request_args, data_args, module_args);
        let mut status = self.status.lock().unwrap();
        *status = if result.is_ok() {
            Status::Initialized
        } else {
            Status::Uninitialized
        };
        result
    }

    fn do_init(
        &self,
        mut request_args: RequestArgs,
        data_args: DataArgs,
        module_args: ModuleArgs,
    ) -> Result<(), CrawlerError> {
        utils::log("Check arguments for initialization...");
        request_args.check()?;
        data_args.check()?;
        module_args.check()?;
        for domain in &mut request_args.accepted_domains {
            *domain = domain.trim().to_lowercase();
        }

        // A previous run's pools are torn down before new ones are built.
        if let Some(old) = self.ctx.read().unwrap().as_ref() {
            old.close_all();
        }
        let req_pool = new_pool(data_args.req_buffer_cap, data_args.req_max_buffer_number)?;
        let resp_pool = new_pool(data_args.resp_buffer_cap, data_args.resp_max_buffer_number)?;
        let item_pool = new_pool(data_args.item_buffer_cap, data_args.item_max_buffer_number)?;
        let error_pool = new_pool(data_args.error_buffer_cap, data_args.error_max_buffer_number)?;
        self.url_map.clear();

        self.registrar.clear();
        let summary = module_args.summary();
        self.register_modules(&module_args)?;
        utils::log(&format!(
            "Modules registered. (downloaders: {}, analyzers: {}, pipelines: {})",
            summary.downloader_list_size, summary.analyzer_list_size, summary.pipeline_list_size
        ));

        *self.ctx.write().unwrap() = Some(Arc::new(EngineCtx {
            request_args,
            data_args,
            req_pool,
            resp_pool,
            item_pool,
            error_pool,
        }));
        utils::log("Scheduler has been initialized.");
        Ok(())
    }

    fn register_modules(&self, module_args: &ModuleArgs) -> Result<(), CrawlerError> {
        let instances = module_args
            .downloaders
            .iter()
            .cloned()
            .map(ModuleInstance::Downloader)
            .chain(
                module_args
                    .analyzers
                    .iter()
                    .cloned()
                    .map(ModuleInstance::Analyzer),
            )
            .chain(
                module_args
                    .pipelines
                    .iter()
                    .cloned()
                    .map(ModuleInstance::Pipeline),
            );
        for instance in instances {
            let mid = instance.id().clone();
            let kind = instance.module_type();
            let registered = self.registrar.register(instance).map_err(|e| gen_error_by(&e))?;
            if !registered {
                return Err(gen_error(format!(
                    "Couldn't register {} instance with MID {:?}!",
                    kind,
                    mid.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Launches the worker loops and seeds the frontier with `first_url`.
    pub fn start(&self, first_url: &str) -> Result<(), CrawlerError> {
        utils::log("Start scheduler...");
        self.check_and_set_status(Status::Starting)?;
        let result = self.do_start(first_url);
        let mut status = self.status.lock().unwrap();
        *status = if result.is_ok() {
            Status::Started
        } else {
            Status::Uninitialized
        };
        result
    }

    fn do_start(&self, first_url: &str) -> Result<(), CrawlerError> {
        if first_url.trim().is_empty() {
            return Err(gen_parameter_error("empty first URL"));
        }
        let parsed = Url::parse(first_url)
            .map_err(|e| gen_parameter_error(format!("bad first URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(gen_parameter_error(format!(
                "unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }
        let ctx = self
            .ctx
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| gen_error("the scheduler has not been initialized!"))?;
        if let Some(which) = ctx.any_closed() {
            return Err(gen_error(format!(
                "closed {} buffer pool; initialize the scheduler again",
                which
            )));
        }

        let engine = Arc::new(Engine {
            registrar: Arc::clone(&self.registrar),
            url_map: Arc::clone(&self.url_map),
            ctx,
        });
        spawn_loop("skitter-downloader", &engine, Engine::download_loop)?;
        spawn_loop("skitter-analyzer", &engine, Engine::analyze_loop)?;
        spawn_loop("skitter-pipeline", &engine, Engine::process_loop)?;

        engine.send_req(Request::new(parsed.as_str(), 0));
        utils::log("Scheduler has been started.");
        Ok(())
    }

    /// Closes all four pools; worker loops observe the closure on their next
    /// pool operation and exit.
    pub fn stop(&self) -> Result<(), CrawlerError> {
        utils::log("Stop scheduler...");
        self.check_and_set_status(Status::Stopping)?;
        if let Some(ctx) = self.ctx.read().unwrap().as_ref() {
            ctx.close_all();
        }
        let mut status = self.status.lock().unwrap();
        *status = Status::Stopped;
        utils::log("Scheduler has been stopped.");
        Ok(())
    }

    /// True when all three data pools are drained and no module holds
    /// in-flight work. The error pool may still be draining.
    pub fn idle(&self) -> bool {
        for instance in self.registrar.get_all().values() {
            if instance.as_module().handling_number() > 0 {
                return false;
            }
        }
        match self.ctx.read().unwrap().as_ref() {
            Some(ctx) => {
                ctx.req_pool.total() == 0
                    && ctx.resp_pool.total() == 0
                    && ctx.item_pool.total() == 0
            }
            None => true,
        }
    }

    /// Snapshot of the scheduler and all registered modules.
    pub fn summary(&self) -> Result<SchedSummaryStruct, CrawlerError> {
        let ctx = self
            .ctx
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| gen_error("the scheduler has not been initialized!"))?;
        Ok(SchedSummaryStruct {
            status: self.status().description().to_string(),
            request_args: ctx.request_args.clone(),
            data_args: ctx.data_args,
            downloaders: self.module_summaries(Type::Downloader),
            analyzers: self.module_summaries(Type::Analyzer),
            pipelines: self.module_summaries(Type::Pipeline),
            req_buffer_pool: BufferPoolSummary::of(&ctx.req_pool),
            resp_buffer_pool: BufferPoolSummary::of(&ctx.resp_pool),
            item_buffer_pool: BufferPoolSummary::of(&ctx.item_pool),
            error_buffer_pool: BufferPoolSummary::of(&ctx.error_pool),
            num_url: self.url_map.len(),
        })
    }

    fn module_summaries(&self, module_type: Type) -> Vec<crate::module::SummaryStruct> {
        let mut summaries: Vec<_> = self
            .registrar
            .get_all_by_type(module_type)
            .map(|modules| modules.values().map(ModuleInstance::summary).collect())
            .unwrap_or_default();
        summaries.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        summaries
    }

    /// A receive stream of crawler errors, fed from the error pool by a
    /// detached drainer. The stream ends when the pool is closed and drained.
    pub fn error_chan(&self) -> Result<mpsc::Receiver<CrawlerError>, CrawlerError> {
        let ctx = self
            .ctx
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| gen_error("the scheduler has not been initialized!"))?;
        let (tx, rx) = mpsc::channel();
        let pool = Arc::clone(&ctx.error_pool);
        thread::Builder::new()
            .name("skitter-error-chan".to_string())
            .spawn(move || {
                while let Ok(err) = pool.get() {
                    if tx.send(err).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| gen_error(format!("couldn't spawn error drainer: {}", e)))?;
        Ok(rx)
    }

    fn check_and_set_status(&self, wanted: Status) -> Result<(), CrawlerError> {
        let mut current = self.status.lock().unwrap();
        status::check_status(*current, wanted)?;
        *current = wanted;
        Ok(())
    }
}

// The worker side of a running crawl: everything the three loops share.
// Holding its own Arcs keeps the loops alive and correct across scheduler
// re-initialization.
struct Engine {
    registrar: Arc<Registrar>,
    url_map: Arc<DashSet<String>>,
    ctx: Arc<EngineCtx>,
}

impl Engine {
    fn download_loop(self: Arc<Self>) {
        loop {
            let req = match self.ctx.req_pool.get() {
                Ok(req) => req,
                Err(_) => break,
            };
            let engine = Arc::clone(&self);
            spawn_task("skitter-download", move || engine.download_one(req));
        }
    }

    fn analyze_loop(self: Arc<Self>) {
        loop {
            let resp = match self.ctx.resp_pool.get() {
                Ok(resp) => resp,
                Err(_) => break,
            };
            let engine = Arc::clone(&self);
            spawn_task("skitter-analyze", move || engine.analyze_one(resp));
        }
    }

    fn process_loop(self: Arc<Self>) {
        loop {
            let item = match self.ctx.item_pool.get() {
                Ok(item) => item,
                Err(_) => break,
            };
            let engine = Arc::clone(&self);
            spawn_task("skitter-process", move || engine.process_one(item));
        }
    }

    fn download_one(&self, req: Request) {
        if request_admissible(&self.ctx, &req).is_none() {
            return;
        }
        let instance = match self.registrar.get(Type::Downloader) {
            Ok(instance) => instance,
            Err(e) => {
                self.send_error(gen_error_by(&e));
                return;
            }
        };
        let ModuleInstance::Downloader(downloader) = instance else {
            self.send_error(gen_error("unexpected module instance for downloader"));
            return;
        };
        match downloader.download(&req) {
            // A put failure here means the engine is shutting down; the
            // response is discarded silently.
            Ok(resp) => {
                let _ = self.ctx.resp_pool.put(resp);
            }
            Err(err) => {
                self.send_error(err);
            }
        }
    }

    fn analyze_one(&self, resp: Response) {
        let instance = match self.registrar.get(Type::Analyzer) {
            Ok(instance) => instance,
            Err(e) => {
                self.send_error(gen_error_by(&e));
                return;
            }
        };
        let ModuleInstance::Analyzer(analyzer) = instance else {
            self.send_error(gen_error("unexpected module instance for analyzer"));
            return;
        };
        let (data_list, errors) = analyzer.analyze(&resp);
        for data in data_list {
            match data {
                Data::Request(req) => {
                    // Analyzer-produced requests are one hop deeper than the
                    // response that yielded them, whatever the parser set.
                    let bumped = Request::new(req.url(), resp.depth().saturating_add(1));
                    self.send_req(bumped);
                }
                Data::Item(item) => {
                    let _ = self.ctx.item_pool.put(item);
                }
                // Analyzers yield requests and items only; a response here
                // would bypass the frontier gate and its dedup.
                Data::Response(_) => {
                    self.send_error(CrawlerError::new(
                        ErrorKind::Analyzer,
                        format!(
                            "unsupported datum from analyzer {} (a response); dropped",
                            analyzer.id()
                        ),
                    ));
                }
            }
        }
        for err in errors {
            self.send_error(err);
        }
    }

    fn process_one(&self, item: Item) {
        let instance = match self.registrar.get(Type::Pipeline) {
            Ok(instance) => instance,
            Err(e) => {
                self.send_error(gen_error_by(&e));
                return;
            }
        };
        let ModuleInstance::Pipeline(pipeline) = instance else {
            self.send_error(gen_error("unexpected module instance for pipeline"));
            return;
        };
        for err in pipeline.send(item) {
            self.send_error(err);
        }
    }

    // Admits a request to the frontier: filter, then an atomic
    // check-and-insert of its signature, then the enqueue. The insert comes
    // first so racing producers of the same URL cannot both pass.
    fn send_req(&self, req: Request) -> bool {
        let parsed = match request_admissible(&self.ctx, &req) {
            Some(parsed) => parsed,
            None => return false,
        };
        let signature = url_signature(&parsed);
        if !self.url_map.insert(signature) {
            return false;
        }
        self.ctx.req_pool.put(req).is_ok()
    }

    // Publishes an error asynchronously; the pipeline never waits on the
    // error pool.
    fn send_error(&self, err: CrawlerError) -> bool {
        if self.ctx.error_pool.closed() {
            return false;
        }
        let pool = Arc::clone(&self.ctx.error_pool);
        thread::Builder::new()
            .name("skitter-error-send".to_string())
            .spawn(move || {
                if pool.put(err).is_err() {
                    utils::log("The error buffer pool was closed. Ignore error sending.");
                }
            })
            .is_ok()
    }
}

fn new_pool<T>(cap: u32, max_number: u32) -> Result<Arc<BufferPool<T>>, CrawlerError> {
    BufferPool::new(cap, max_number)
        .map(Arc::new)
        .map_err(|e| gen_error_by(&e))
}

fn spawn_loop(
    name: &str,
    engine: &Arc<Engine>,
    body: fn(Arc<Engine>),
) -> Result<(), CrawlerError> {
    let engine = Arc::clone(engine);
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || body(engine))
        .map_err(|e| gen_error(format!("couldn't spawn {} loop: {}", name, e)))?;
    Ok(())
}

fn spawn_task<F>(name: &str, f: F)
where
    F: FnOnce() + Send + 'static,
{
    if let Err(e) = thread::Builder::new().name(name.to_string()).spawn(f) {
        utils::log(&format!("Couldn't spawn {} task: {}", name, e));
    }
}

// The depth and primary-domain gate. Dropping a request here is the intended
// termination condition, not an error.
fn request_admissible(ctx: &EngineCtx, req: &Request) -> Option<Url> {
    if !req.valid() {
        return None;
    }
    let parsed = match Url::parse(req.url()) {
        Ok(parsed) => parsed,
        Err(_) => {
            utils::log(&format!("Ignore the request! (unparsable URL: {})", req.url()));
            return None;
        }
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    if req.depth() > ctx.request_args.max_depth {
        utils::log(&format!(
            "Ignore the request! (depth {} over the max {}, URL: {})",
            req.depth(),
            ctx.request_args.max_depth,
            req.url()
        ));
        return None;
    }
    let host = parsed.host_str()?;
    if !domain_accepted(&ctx.request_args.accepted_domains, host) {
        utils::log(&format!(
            "Ignore the request! (host {} not in accepted primary domains, URL: {})",
            host,
            req.url()
        ));
        return None;
    }
    Some(parsed)
}

// Naive dot-boundary suffix match: `docs.example.com` belongs to
// `example.com`, `notexample.com` does not. Hosts arrive lowercased from the
// URL parser; domains are lowercased at init.
fn domain_accepted(accepted: &[String], host: &str) -> bool {
    accepted.iter().any(|domain| {
        host == domain
            || (host.len() > domain.len()
                && host.ends_with(domain.as_str())
                && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
    })
}

// Canonical frontier signature: scheme, host, optional non-default port, and
// path; query and fragment do not participate.
fn url_signature(parsed: &Url) -> String {
    let mut signature = format!(
        "{}://{}",
        parsed.scheme(),
        parsed.host_str().unwrap_or_default()
    );
    if let Some(port) = parsed.port() {
        signature.push(':');
        signature.push_str(&port.to_string());
    }
    signature.push_str(parsed.path());
    signature
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_matching_is_suffix_on_dot_boundaries() {
        let accepted = vec!["example.com".to_string()];
        assert!(domain_accepted(&accepted, "example.com"));
        assert!(domain_accepted(&accepted, "docs.example.com"));
        assert!(domain_accepted(&accepted, "a.b.example.com"));
        assert!(!domain_accepted(&accepted, "notexample.com"));
        assert!(!domain_accepted(&accepted, "example.com.evil.org"));
        assert!(!domain_accepted(&accepted, "com"));
    }

    #[test]
    fn signatures_normalize_case_and_ignore_queries() {
        let a = Url::parse("HTTP://Example.COM/path?q=1#frag").unwrap();
        let b = Url::parse("http://example.com/path?q=2").unwrap();
        assert_eq!(url_signature(&a), url_signature(&b));
        assert_eq!(url_signature(&a), "http://example.com/path");

        let with_port = Url::parse("http://example.com:8080/x").unwrap();
        assert_eq!(url_signature(&with_port), "http://example.com:8080/x");
        let default_port = Url::parse("http://example.com:80/x").unwrap();
        assert_eq!(url_signature(&default_port), "http://example.com/x");
    }
}
