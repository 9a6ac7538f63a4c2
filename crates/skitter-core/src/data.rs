//! Values that flow through the engine's buffer pools.

use std::collections::HashMap;

use crate::reader::MultipleReader;

/// A crawl request: target URL plus its hop distance from the seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    url: String,
    depth: u32,
}

impl Request {
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Request {
            url: url.into(),
            depth,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn valid(&self) -> bool {
        !self.url.is_empty()
    }
}

/// A fetched page, carrying the depth of the request that produced it. The
/// body is a re-readable snapshot so several parsers can each consume it.
#[derive(Debug, Clone)]
pub struct Response {
    url: String,
    status: u16,
    content_type: Option<String>,
    body: Option<MultipleReader>,
    depth: u32,
}

impl Response {
    pub fn new(
        url: impl Into<String>,
        status: u16,
        content_type: Option<String>,
        body: Option<MultipleReader>,
        depth: u32,
    ) -> Self {
        Response {
            url: url.into(),
            status,
            content_type,
            body,
            depth,
        }
    }

    /// Final URL of the fetch, after redirects.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn body(&self) -> Option<&MultipleReader> {
        self.body.as_ref()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn valid(&self) -> bool {
        self.body.is_some()
    }
}

/// An extracted piece of structured data, produced by analyzers and consumed
/// by pipelines.
pub type Item = HashMap<String, serde_json::Value>;

/// The polymorphic datum carried between stages.
#[derive(Debug, Clone)]
pub enum Data {
    Request(Request),
    Response(Response),
    Item(Item),
}

impl Data {
    pub fn valid(&self) -> bool {
        match self {
            Data::Request(req) => req.valid(),
            Data::Response(resp) => resp.valid(),
            Data::Item(item) => !item.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_validity_requires_url() {
        assert!(Request::new("http://example.com/", 0).valid());
        assert!(!Request::new("", 2).valid());
    }

    #[test]
    fn response_validity_requires_body() {
        let with_body = Response::new(
            "http://example.com/",
            200,
            Some("text/html".into()),
            Some(MultipleReader::from_bytes(b"<html></html>".to_vec())),
            1,
        );
        assert!(with_body.valid());
        let without_body = Response::new("http://example.com/", 304, None, None, 1);
        assert!(!without_body.valid());
    }

    #[test]
    fn datum_validity_follows_the_variant() {
        let mut item = Item::new();
        assert!(!Data::Item(item.clone()).valid());
        item.insert("url".into(), serde_json::json!("http://example.com/"));
        assert!(Data::Item(item).valid());
        assert!(!Data::Request(Request::new("", 0)).valid());
    }
}
