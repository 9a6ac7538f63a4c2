//! Argument containers accepted by `Scheduler::init`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CrawlerError;
use crate::module::{Analyzer, Downloader, Pipeline};
use crate::scheduler::gen_parameter_error;

/// Everything `init` needs to gate the frontier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestArgs {
    /// Primary domains a request host may belong to.
    #[serde(rename = "accepted_primary_domains")]
    pub accepted_domains: Vec<String>,
    /// Inclusive depth bound; requests deeper than this are dropped.
    pub max_depth: u32,
}

impl RequestArgs {
    pub fn check(&self) -> Result<(), CrawlerError> {
        if self.accepted_domains.iter().any(|d| d.trim().is_empty()) {
            return Err(gen_parameter_error("empty accepted primary domain"));
        }
        Ok(())
    }

    /// Structural equality with another argument container.
    pub fn same(&self, another: &RequestArgs) -> bool {
        self == another
    }
}

/// Capacities for the four buffer pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataArgs {
    pub req_buffer_cap: u32,
    pub req_max_buffer_number: u32,
    pub resp_buffer_cap: u32,
    pub resp_max_buffer_number: u32,
    pub item_buffer_cap: u32,
    pub item_max_buffer_number: u32,
    pub error_buffer_cap: u32,
    pub error_max_buffer_number: u32,
}

impl DataArgs {
    pub fn check(&self) -> Result<(), CrawlerError> {
        let fields = [
            (self.req_buffer_cap, "zero request buffer capacity"),
            (self.req_max_buffer_number, "zero max request buffer number"),
            (self.resp_buffer_cap, "zero response buffer capacity"),
            (self.resp_max_buffer_number, "zero max response buffer number"),
            (self.item_buffer_cap, "zero item buffer capacity"),
            (self.item_max_buffer_number, "zero max item buffer number"),
            (self.error_buffer_cap, "zero error buffer capacity"),
            (self.error_max_buffer_number, "zero max error buffer number"),
        ];
        for (value, msg) in fields {
            if value == 0 {
                return Err(gen_parameter_error(msg));
            }
        }
        Ok(())
    }
}

/// The worker modules to register at init time.
#[derive(Clone, Default)]
pub struct ModuleArgs {
    pub downloaders: Vec<Arc<dyn Downloader>>,
    pub analyzers: Vec<Arc<dyn Analyzer>>,
    pub pipelines: Vec<Arc<dyn Pipeline>>,
}

impl ModuleArgs {
    pub fn check(&self) -> Result<(), CrawlerError> {
        if self.downloaders.is_empty() {
            return Err(gen_parameter_error("empty downloader list"));
        }
        if self.analyzers.is_empty() {
            return Err(gen_parameter_error("empty analyzer list"));
        }
        if self.pipelines.is_empty() {
            return Err(gen_parameter_error("empty pipeline list"));
        }
        Ok(())
    }

    pub fn summary(&self) -> ModuleArgsSummary {
        ModuleArgsSummary {
            downloader_list_size: self.downloaders.len(),
            analyzer_list_size: self.analyzers.len(),
            pipeline_list_size: self.pipelines.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleArgsSummary {
    pub downloader_list_size: usize,
    pub analyzer_list_size: usize,
    pub pipeline_list_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_args_reject_blank_domains() {
        let args = RequestArgs {
            accepted_domains: vec!["example.com".into(), "  ".into()],
            max_depth: 1,
        };
        assert!(args.check().is_err());
        let args = RequestArgs {
            accepted_domains: vec!["example.com".into()],
            max_depth: 0,
        };
        assert!(args.check().is_ok());
    }

    #[test]
    fn request_args_same_compares_structurally() {
        let a = RequestArgs {
            accepted_domains: vec!["example.com".into()],
            max_depth: 2,
        };
        let b = a.clone();
        assert!(a.same(&b));
        let c = RequestArgs {
            accepted_domains: vec!["example.org".into()],
            max_depth: 2,
        };
        assert!(!a.same(&c));
    }

    #[test]
    fn data_args_require_every_field_positive() {
        let good = DataArgs {
            req_buffer_cap: 50,
            req_max_buffer_number: 100,
            resp_buffer_cap: 50,
            resp_max_buffer_number: 10,
            item_buffer_cap: 50,
            item_max_buffer_number: 100,
            error_buffer_cap: 50,
            error_max_buffer_number: 1,
        };
        assert!(good.check().is_ok());
        let bad = DataArgs {
            item_buffer_cap: 0,
            ..good
        };
        assert!(bad.check().is_err());
    }

    #[test]
    fn module_args_require_every_kind() {
        let args = ModuleArgs::default();
        assert!(args.check().is_err());
        assert_eq!(
            args.summary(),
            ModuleArgsSummary {
                downloader_list_size: 0,
                analyzer_list_size: 0,
                pipeline_list_size: 0,
            }
        );
    }
}
