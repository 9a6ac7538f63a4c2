//! Default downloader over the shared HTTP client.

use crate::data::{Request, Response};
use crate::error::{CrawlerError, ErrorKind, IllegalParameterError};
use crate::http;
use crate::module::base::{impl_module_delegate, ModuleBase};
use crate::module::{CalculateScore, Downloader, ModuleError, MID};
use crate::reader::MultipleReader;
use crate::utils;

pub struct LocalDownloader {
    base: ModuleBase,
}

impl LocalDownloader {
    pub fn new(mid: MID, score_calculator: Option<CalculateScore>) -> Result<Self, ModuleError> {
        Ok(LocalDownloader {
            base: ModuleBase::new(mid, score_calculator)?,
        })
    }
}

impl_module_delegate!(LocalDownloader);

impl Downloader for LocalDownloader {
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
        utils::log(&format!(
            "Fetch the page (URL: {}, depth: {})...",
            req.url(),
            req.depth()
        ));
        match http::global_client().fetch(req.url()) {
            Ok(page) => {
                self.base.incr_completed_count();
                Ok(Response::new(
                    page.final_url,
                    page.status,
                    page.content_type,
                    Some(MultipleReader::from_bytes(page.body)),
                    req.depth(),
                ))
            }
            Err(msg) => Err(CrawlerError::new(ErrorKind::Downloader, msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{gen_mid, Module, Type};

    #[test]
    fn invalid_request_is_counted_but_not_accepted() {
        let downloader =
            LocalDownloader::new(gen_mid(Type::Downloader, 1, None), None).unwrap();
        let err = downloader.download(&Request::new("", 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Downloader);
        assert_eq!(downloader.called_count(), 1);
        assert_eq!(downloader.accepted_count(), 0);
        assert_eq!(downloader.handling_number(), 0);
    }
}
