//! Core engine for skitter: elastic buffer pools, a scored module registry,
//! the concurrent scheduler, and the idle-detecting monitor.
//! Used by the CLI binary; can be embedded by other crawling front ends.

pub mod buffer;
pub mod data;
pub mod error;
pub mod http;
pub mod module;
pub mod monitor;
pub mod pool;
pub mod reader;
pub mod scheduler;
pub mod seqgen;
pub mod utils;


// Re-export the main API for front ends.
pub use buffer::{Buffer, BufferError};
pub use data::{Data, Item, Request, Response};
pub use error::{CrawlerError, ErrorKind, IllegalParameterError};
pub use http::{global_client, HttpClient, Page};
pub use module::analyzer::LocalAnalyzer;
pub use module::downloader::LocalDownloader;
pub use module::pipeline::LocalPipeline;
pub use module::{
    calculate_score_simple, gen_mid, split_mid, Analyzer, CalculateScore, Counts, Downloader,
    Module, ModuleError, ModuleInstance, ParseResponse, Pipeline, ProcessItem, Registrar,
    SummaryStruct, Type, MID,
};
pub use monitor::{monitor, Record};
pub use pool::BufferPool;
pub use reader::MultipleReader;
pub use scheduler::{
    DataArgs, ModuleArgs, ModuleArgsSummary, RequestArgs, SchedSummaryStruct, Scheduler, Status,
};
pub use seqgen::SNGenerator;
