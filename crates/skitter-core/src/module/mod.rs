//! Worker module plumbing: identities, counters, scoring, and the three
//! module contracts (downloader, analyzer, pipeline).

pub mod analyzer;
pub mod base;
pub mod downloader;
pub mod pipeline;
pub mod registry;


use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::data::{Data, Item, Request, Response};
use crate::error::CrawlerError;

pub use base::{HandlingGuard, ModuleBase};
pub use registry::Registrar;

/// The three kinds of worker module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    Downloader,
    Analyzer,
    Pipeline,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Type::Downloader => "downloader",
            Type::Analyzer => "analyzer",
            Type::Pipeline => "pipeline",
        };
        write!(f, "{}", s)
    }
}

lazy_static! {
    static ref LEGAL_TYPE_LETTER_MAP: HashMap<Type, char> = {
        let mut m = HashMap::new();
        m.insert(Type::Downloader, 'D');
        m.insert(Type::Analyzer, 'A');
        m.insert(Type::Pipeline, 'P');
        m
    };
    static ref LEGAL_LETTER_TYPE_MAP: HashMap<char, Type> = {
        let mut m = HashMap::new();
        m.insert('D', Type::Downloader);
        m.insert('A', Type::Analyzer);
        m.insert('P', Type::Pipeline);
        m
    };
}

/// Errors raised by module construction and registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    NotFound,
    IllegalParameter(String),
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleError::NotFound => write!(f, "not found module instance"),
            ModuleError::IllegalParameter(msg) => write!(f, "illegal parameter: {}", msg),
        }
    }
}

impl Error for ModuleError {}

/// Module identifier: `<typeLetter><sequence>` with an optional `|address`
/// suffix, e.g. `D1` or `A3|127.0.0.1:8080`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MID(String);

impl MID {
    pub fn new(raw: impl Into<String>) -> Self {
        MID(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Builds a MID from its parts.
pub fn gen_mid(module_type: Type, sn: u64, addr: Option<&str>) -> MID {
    let letter = LEGAL_TYPE_LETTER_MAP[&module_type];
    match addr {
        Some(addr) => MID(format!("{}{}|{}", letter, sn, addr)),
        None => MID(format!("{}{}", letter, sn)),
    }
}

/// Splits a MID into `(type, sequence, address)`, validating each part.
pub fn split_mid(mid: &MID) -> Result<(Type, u64, Option<String>), ModuleError> {
    let raw = mid.as_str();
    let (head, addr) = match raw.split_once('|') {
        Some((head, addr)) => (head, Some(addr)),
        None => (raw, None),
    };
    let mut chars = head.chars();
    let letter = chars
        .next()
        .ok_or_else(|| ModuleError::IllegalParameter(format!("illegal module ID: {}", raw)))?;
    let module_type = *LEGAL_LETTER_TYPE_MAP
        .get(&letter)
        .ok_or_else(|| ModuleError::IllegalParameter(format!("illegal module type letter: {}", letter)))?;
    let sn = chars
        .as_str()
        .parse::<u64>()
        .map_err(|_| ModuleError::IllegalParameter(format!("illegal module SN: {}", raw)))?;
    let addr = match addr {
        Some(addr) => Some(check_addr(addr, raw)?),
        None => None,
    };
    Ok((module_type, sn, addr))
}

fn check_addr(addr: &str, raw_mid: &str) -> Result<String, ModuleError> {
    let err = || ModuleError::IllegalParameter(format!("illegal module address: {}", raw_mid));
    let (host, port) = addr.rsplit_once(':').ok_or_else(err)?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(err());
    }
    Ok(addr.to_string())
}

/// Best-effort type extraction from a MID (no full validation).
pub fn get_type(mid: &MID) -> Option<Type> {
    let letter = mid.as_str().chars().next()?;
    LEGAL_LETTER_TYPE_MAP.get(&letter).copied()
}

/// Snapshot of a module's internal counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub called_count: u64,
    pub accepted_count: u64,
    pub completed_count: u64,
    pub handling_number: u64,
}

/// Per-module summary rendered by the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryStruct {
    pub id: MID,
    pub called: u64,
    pub accepted: u64,
    pub completed: u64,
    pub handling: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Pure function from counters to a load score; lower scores are preferred
/// by the balancer.
pub type CalculateScore = fn(Counts) -> u64;

/// Default score: in-flight work dominates, then completions and calls.
pub fn calculate_score_simple(counts: Counts) -> u64 {
    counts.called_count
        + (counts.accepted_count << 1)
        + (counts.completed_count << 2)
        + (counts.handling_number << 4)
}

/// Recomputes a module's score via its calculator; returns whether the
/// stored score changed.
pub fn update_score(module: &dyn Module) -> bool {
    let calculator = module.score_calculator();
    let new_score = calculator(module.counts());
    if new_score == module.score() {
        return false;
    }
    module.set_score(new_score);
    true
}

/// Behavior common to every worker module.
pub trait Module: Send + Sync {
    fn id(&self) -> &MID;
    fn addr(&self) -> Option<&str>;
    fn score(&self) -> u64;
    fn set_score(&self, score: u64);
    fn score_calculator(&self) -> CalculateScore;
    fn called_count(&self) -> u64;
    fn accepted_count(&self) -> u64;
    fn completed_count(&self) -> u64;
    fn handling_number(&self) -> u64;
    fn counts(&self) -> Counts;
    fn summary(&self) -> SummaryStruct;
}

/// Fetches one request into a response.
pub trait Downloader: Module {
    fn download(&self, req: &Request) -> Result<Response, CrawlerError>;
}

/// One response-parsing pass; the response body can be re-read via its
/// snapshot, and its depth rides along on the response itself.
pub type ParseResponse = Arc<dyn Fn(&Response) -> (Vec<Data>, Vec<CrawlerError>) + Send + Sync>;

/// Turns one response into follow-up requests and extracted items.
pub trait Analyzer: Module {
    fn resp_parsers(&self) -> Vec<ParseResponse>;
    fn analyze(&self, resp: &Response) -> (Vec<Data>, Vec<CrawlerError>);
}

/// One item-processing stage. `Ok(Some(item))` feeds the returned item to
/// the next stage; `Ok(None)` passes the current item through unchanged.
pub type ProcessItem = Arc<dyn Fn(&Item) -> Result<Option<Item>, CrawlerError> + Send + Sync>;

/// Runs items through a processor chain.
pub trait Pipeline: Module {
    fn item_processors(&self) -> Vec<ProcessItem>;
    fn send(&self, item: Item) -> Vec<CrawlerError>;
    /// When set, the first processor error aborts the chain.
    fn fail_fast(&self) -> bool;
    fn set_fail_fast(&self, fail_fast: bool);
}

/// A registered module instance, tagged by kind so callers get the concrete
/// capability back out of the registry.
#[derive(Clone)]
pub enum ModuleInstance {
    Downloader(Arc<dyn Downloader>),
    Analyzer(Arc<dyn Analyzer>),
    Pipeline(Arc<dyn Pipeline>),
}

impl std::fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleInstance::Downloader(_) => f.write_str("ModuleInstance::Downloader(..)"),
            ModuleInstance::Analyzer(_) => f.write_str("ModuleInstance::Analyzer(..)"),
            ModuleInstance::Pipeline(_) => f.write_str("ModuleInstance::Pipeline(..)"),
        }
    }
}

impl ModuleInstance {
    pub fn module_type(&self) -> Type {
        match self {
            ModuleInstance::Downloader(_) => Type::Downloader,
            ModuleInstance::Analyzer(_) => Type::Analyzer,
            ModuleInstance::Pipeline(_) => Type::Pipeline,
        }
    }

    pub fn as_module(&self) -> &dyn Module {
        match self {
            ModuleInstance::Downloader(m) => m.as_ref(),
            ModuleInstance::Analyzer(m) => m.as_ref(),
            ModuleInstance::Pipeline(m) => m.as_ref(),
        }
    }

    pub fn id(&self) -> &MID {
        self.as_module().id()
    }

    pub fn summary(&self) -> SummaryStruct {
        self.as_module().summary()
    }
}
