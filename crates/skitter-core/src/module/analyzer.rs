//! Default analyzer: drives a list of response parsers.

use crate::data::{Data, Response};
use crate::error::{CrawlerError, ErrorKind, IllegalParameterError};
use crate::module::base::{impl_module_delegate, ModuleBase};
use crate::module::{Analyzer, CalculateScore, ModuleError, ParseResponse, MID};
use crate::utils;

pub struct LocalAnalyzer {
    base: ModuleBase,
    resp_parsers: Vec<ParseResponse>,
}

impl LocalAnalyzer {
    pub fn new(
        mid: MID,
        resp_parsers: Vec<ParseResponse>,
        score_calculator: Option<CalculateScore>,
    ) -> Result<Self, ModuleError> {
        if resp_parsers.is_empty() {
            return Err(ModuleError::IllegalParameter(
                "empty response parser list".to_string(),
            ));
        }
        Ok(LocalAnalyzer {
            base: ModuleBase::new(mid, score_calculator)?,
            resp_parsers,
        })
    }
}

impl_module_delegate!(LocalAnalyzer);

impl Analyzer for LocalAnalyzer {
    fn resp_parsers(&self) -> Vec<ParseResponse> {
        self.resp_parsers.clone()
    }

    fn analyze(&self, resp: &Response) -> (Vec<Data>, Vec<CrawlerError>) {
        let _handling = self.base.start_handling();
        self.base.incr_called_count();
        if !resp.valid() {
            let err = CrawlerError::by(
                ErrorKind::Analyzer,
                &IllegalParameterError::new("invalid response"),
            );
            return (Vec::new(), vec![err]);
        }
        self.base.incr_accepted_count();
        utils::log(&format!(
            "Analyze the response (URL: {}, depth: {})...",
            resp.url(),
            resp.depth()
        ));
        let mut data_list = Vec::new();
        let mut error_list = Vec::new();
        for parser in &self.resp_parsers {
            let (data, errors) = parser(resp);
            data_list.extend(data.into_iter().filter(Data::valid));
            error_list.extend(errors);
        }
        if error_list.is_empty() {
            self.base.incr_completed_count();
        }
        (data_list, error_list)
    }
}
