//! Wires the default crawl modules: a downloader over the shared HTTP
//! client, a link-extracting + page-capturing analyzer, and a page-saving
//! pipeline.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use serde_json::json;
use skitter_core::{
    gen_mid, utils, Analyzer, CrawlerError, Data, Downloader, ErrorKind, Item, LocalAnalyzer,
    LocalDownloader, LocalPipeline, ModuleError, ParseResponse, Pipeline, ProcessItem, Request,
    Response, SNGenerator, Type,
};
use url::Url;

// One shared sequence for module MIDs, another for saved-page file names.
fn mid_sn() -> &'static SNGenerator {
    static SN: OnceLock<SNGenerator> = OnceLock::new();
    SN.get_or_init(|| SNGenerator::new(1, 0))
}

fn file_sn() -> &'static SNGenerator {
    static SN: OnceLock<SNGenerator> = OnceLock::new();
    SN.get_or_init(|| SNGenerator::new(1, 0))
}

pub fn get_downloaders(number: u32) -> Result<Vec<Arc<dyn Downloader>>, ModuleError> {
    let mut downloaders: Vec<Arc<dyn Downloader>> = Vec::new();
    for _ in 0..number {
        let mid = gen_mid(Type::Downloader, mid_sn().get(), None);
        downloaders.push(Arc::new(LocalDownloader::new(mid, None)?));
    }
    Ok(downloaders)
}

pub fn get_analyzers(number: u32) -> Result<Vec<Arc<dyn Analyzer>>, ModuleError> {
    let mut analyzers: Vec<Arc<dyn Analyzer>> = Vec::new();
    for _ in 0..number {
        let mid = gen_mid(Type::Analyzer, mid_sn().get(), None);
        analyzers.push(Arc::new(LocalAnalyzer::new(
            mid,
            vec![parse_links(), parse_page()],
            None,
        )?));
    }
    Ok(analyzers)
}

pub fn get_pipelines(number: u32, dir: &str) -> Result<Vec<Arc<dyn Pipeline>>, ModuleError> {
    let mut pipelines: Vec<Arc<dyn Pipeline>> = Vec::new();
    for _ in 0..number {
        let mid = gen_mid(Type::Pipeline, mid_sn().get(), None);
        let pipeline = LocalPipeline::new(
            mid,
            vec![save_page(PathBuf::from(dir)), record_saved()],
            None,
        )?;
        pipeline.set_fail_fast(true);
        pipelines.push(Arc::new(pipeline));
    }
    Ok(pipelines)
}

fn is_html(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.starts_with("text/html") || ct.starts_with("application/xhtml"))
        .unwrap_or(false)
}

/// Extracts follow-up requests from `href`/`src` attributes, resolved
/// against the page URL.
fn parse_links() -> ParseResponse {
    Arc::new(|resp: &Response| {
        let mut data = Vec::new();
        let mut errors = Vec::new();
        if resp.status() != 200 {
            errors.push(CrawlerError::new(
                ErrorKind::Analyzer,
                format!(
                    "unsupported status code {} (URL: {})",
                    resp.status(),
                    resp.url()
                ),
            ));
            return (data, errors);
        }
        let body = match resp.body() {
            Some(body) => body,
            None => return (data, errors),
        };
        if !is_html(resp.content_type()) {
            return (data, errors);
        }
        let base = match Url::parse(resp.url()) {
            Ok(base) => base,
            Err(e) => {
                errors.push(CrawlerError::new(
                    ErrorKind::Analyzer,
                    format!("bad response URL {}: {}", resp.url(), e),
                ));
                return (data, errors);
            }
        };
        let text = String::from_utf8_lossy(body.as_bytes()).into_owned();
        for raw in extract_attr_values(&text, &["href", "src"]) {
            if raw.is_empty()
                || raw.starts_with('#')
                || raw.starts_with("javascript:")
                || raw.starts_with("mailto:")
            {
                continue;
            }
            if let Ok(mut link) = base.join(&raw) {
                link.set_fragment(None);
                data.push(Data::Request(Request::new(link.as_str(), resp.depth() + 1)));
            }
        }
        (data, errors)
    })
}

// Plain scan for attr="value" / attr='value' occurrences; enough for link
// discovery without dragging in an HTML parser.
fn extract_attr_values(html: &str, attrs: &[&str]) -> Vec<String> {
    let mut values = Vec::new();
    for attr in attrs {
        for quote in ['"', '\''] {
            let needle = format!("{}={}", attr, quote);
            let mut rest = html;
            while let Some(idx) = rest.find(&needle) {
                let value_start = idx + needle.len();
                rest = &rest[value_start..];
                if let Some(end) = rest.find(quote) {
                    values.push(rest[..end].trim().to_string());
                    rest = &rest[end..];
                } else {
                    break;
                }
            }
        }
    }
    values
}

/// Captures a successful page as an item for the pipeline.
fn parse_page() -> ParseResponse {
    Arc::new(|resp: &Response| {
        let body = match resp.body() {
            Some(body) => body,
            None => return (Vec::new(), Vec::new()),
        };
        if resp.status() != 200 {
            return (Vec::new(), Vec::new());
        }
        let mut item = Item::new();
        item.insert("url".to_string(), json!(resp.url()));
        item.insert("content_type".to_string(), json!(resp.content_type()));
        item.insert("depth".to_string(), json!(resp.depth()));
        item.insert(
            "body".to_string(),
            json!(String::from_utf8_lossy(body.as_bytes())),
        );
        (vec![Data::Item(item)], Vec::new())
    })
}

fn extension_for(content_type: Option<&str>) -> &'static str {
    match content_type {
        Some(ct) if ct.starts_with("text/html") => ".html",
        Some(ct) if ct.starts_with("application/json") => ".json",
        Some(ct) if ct.starts_with("text/plain") => ".txt",
        _ => ".dat",
    }
}

/// Writes the captured page body under `dir` with a sequence-numbered name
/// and passes a slimmed item (minus the body) down the chain.
fn save_page(dir: PathBuf) -> ProcessItem {
    Arc::new(move |item: &Item| {
        let url = item
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CrawlerError::new(ErrorKind::Pipeline, "item without a URL"))?;
        let body = item
            .get("body")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                CrawlerError::new(ErrorKind::Pipeline, format!("item without a body (URL: {})", url))
            })?;
        fs::create_dir_all(&dir).map_err(|e| {
            CrawlerError::new(
                ErrorKind::Pipeline,
                format!("couldn't create directory {}: {}", dir.display(), e),
            )
        })?;
        let content_type = item.get("content_type").and_then(|v| v.as_str());
        let file_name = format!("{}{}", file_sn().get(), extension_for(content_type));
        let path = dir.join(file_name);
        fs::write(&path, body.as_bytes()).map_err(|e| {
            CrawlerError::new(
                ErrorKind::Pipeline,
                format!("couldn't save page to {}: {}", path.display(), e),
            )
        })?;
        let mut next = item.clone();
        next.remove("body");
        next.insert("saved_path".to_string(), json!(path.display().to_string()));
        Ok(Some(next))
    })
}

/// Logs where each page landed.
fn record_saved() -> ProcessItem {
    Arc::new(|item: &Item| {
        let url = item.get("url").and_then(|v| v.as_str()).unwrap_or("?");
        let path = item.get("saved_path").and_then(|v| v.as_str()).unwrap_or("?");
        utils::log(&format!("Saved page. (URL: {}, file: {})", url, path));
        Ok(None)
    })
}
