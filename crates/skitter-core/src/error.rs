//! Crawler error values: every error flowing through the engine is normalized
//! into a `CrawlerError` tagged with the stage that raised it.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The stage of the engine an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Scheduler,
    Downloader,
    Analyzer,
    Pipeline,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Scheduler => "scheduler",
            ErrorKind::Downloader => "downloader",
            ErrorKind::Analyzer => "analyzer",
            ErrorKind::Pipeline => "pipeline",
        };
        write!(f, "{}", s)
    }
}

/// A normalized crawler error: kind plus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlerError {
    kind: ErrorKind,
    message: String,
}

impl CrawlerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        CrawlerError {
            kind,
            message: message.into(),
        }
    }

    /// Wraps a foreign error, inheriting `kind` from the raising stage.
    pub fn by(kind: ErrorKind, err: &dyn Error) -> Self {
        CrawlerError {
            kind,
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CrawlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "crawler error: {} error: {}", self.kind, self.message)
    }
}

impl Error for CrawlerError {}

/// An invalid-argument error, usually wrapped inside a `CrawlerError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalParameterError {
    message: String,
}

impl IllegalParameterError {
    pub fn new(message: impl Into<String>) -> Self {
        IllegalParameterError {
            message: message.into(),
        }
    }
}

impl fmt::Display for IllegalParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal parameter: {}", self.message)
    }
}

impl Error for IllegalParameterError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawler_error_display_includes_kind_and_message() {
        let err = CrawlerError::new(ErrorKind::Downloader, "connection refused");
        assert_eq!(
            err.to_string(),
            "crawler error: downloader error: connection refused"
        );
    }

    #[test]
    fn by_wraps_foreign_error_message() {
        let inner = IllegalParameterError::new("empty URL");
        let err = CrawlerError::by(ErrorKind::Scheduler, &inner);
        assert_eq!(err.kind(), ErrorKind::Scheduler);
        assert_eq!(err.message(), "illegal parameter: empty URL");
    }
}
