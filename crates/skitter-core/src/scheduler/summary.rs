//! Point-in-time snapshot of a scheduler, rendered by the monitor.

use serde::Serialize;

use crate::module::SummaryStruct;
use crate::pool::BufferPool;
use crate::scheduler::args::{DataArgs, RequestArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferPoolSummary {
    pub buffer_cap: u32,
    pub max_buffer_number: u32,
    pub buffer_number: u32,
    pub total: u64,
}

impl BufferPoolSummary {
    pub(crate) fn of<T>(pool: &BufferPool<T>) -> Self {
        BufferPoolSummary {
            buffer_cap: pool.buffer_cap(),
            max_buffer_number: pool.max_buffer_number(),
            buffer_number: pool.buffer_number(),
            total: pool.total(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedSummaryStruct {
    pub status: String,
    pub request_args: RequestArgs,
    pub data_args: DataArgs,
    pub downloaders: Vec<SummaryStruct>,
    pub analyzers: Vec<SummaryStruct>,
    pub pipelines: Vec<SummaryStruct>,
    pub req_buffer_pool: BufferPoolSummary,
    pub resp_buffer_pool: BufferPoolSummary,
    pub item_buffer_pool: BufferPoolSummary,
    pub error_buffer_pool: BufferPoolSummary,
    pub num_url: usize,
}
