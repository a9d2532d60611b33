use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::Client;
use scraper::{ElementRef, Html, Node};
use serde::Serialize;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use verbtab_core::config::{FetcherBackend, FetcherConfig};
use verbtab_core::{Error, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const MAX_TEXT_DEPTH: usize = 256;

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "td",
    "th", "tr", "ul",
];

/// A fetched page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// Final URL after redirects, when the backend knows it.
    pub url: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Page>;

    /// Whether the backend can run on this machine.
    fn check_installed(&self) -> bool;

    fn name(&self) -> &str;
}

pub fn create_fetcher(config: &FetcherConfig) -> Result<Arc<dyn Fetcher>> {
    match config.backend {
        FetcherBackend::Http => Ok(Arc::new(HttpFetcher::new(config)?)),
        FetcherBackend::Lynx => Ok(Arc::new(LynxFetcher::new(config))),
    }
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Fetch(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Page> {
        info!(url = %url, "Fetching page");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(Error::Fetch(format!("failed to fetch {}: HTTP {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("failed to read body of {}: {}", url, e)))?;
        let html = decode_body(&bytes);
        let text = html_to_text(&html);

        debug!(url = %final_url, status = %status, html_len = html.len(), text_len = text.len(), "Page fetched");
        Ok(Page {
            url: final_url,
            text,
            html,
        })
    }

    fn check_installed(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Bytes to text, inflating bodies that arrive gzip-compressed without a
/// matching `Content-Encoding` header.
pub fn decode_body(bytes: &[u8]) -> String {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut inflated = Vec::new();
        match GzDecoder::new(bytes).read_to_end(&mut inflated) {
            Ok(_) => return String::from_utf8_lossy(&inflated).into_owned(),
            Err(e) => warn!(error = %e, "Body looked gzip-compressed but failed to inflate"),
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

/// Readable text of a document: scripts and styles dropped, block elements
/// on their own lines, whitespace collapsed within lines.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    collect_text(document.root_element(), &mut raw, 0);

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(el: ElementRef, out: &mut String, depth: usize) {
    if depth > MAX_TEXT_DEPTH {
        return;
    }
    let tag = el.value().name();
    if SKIPPED_TAGS.contains(&tag) {
        return;
    }
    let block = BLOCK_TAGS.contains(&tag);
    if block {
        out.push('\n');
    }
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out, depth + 1);
                }
            }
            _ => {}
        }
    }
    if block {
        out.push('\n');
    }
}

/// Text-mode fetching through the `lynx` browser.
pub struct LynxFetcher {
    binary: String,
    timeout: Duration,
}

impl LynxFetcher {
    pub fn new(config: &FetcherConfig) -> Self {
        Self {
            binary: config.lynx_binary.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn run(&self, args: &[&str], url: &str) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).arg(url).kill_on_drop(true);

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::Fetch(format!("failed to run {}: {}", self.binary, e)));
            }
            Err(_) => {
                return Err(Error::Fetch(format!(
                    "failed to fetch {}: {} timed out after {}s",
                    url,
                    self.binary,
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Fetch(format!(
                "failed to fetch {}: {} exited with {}: {}",
                url,
                self.binary,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Fetcher for LynxFetcher {
    async fn fetch(&self, url: &str) -> Result<Page> {
        info!(url = %url, binary = %self.binary, "Fetching page with lynx");
        let text = self.run(&["-dump", "-nolist"], url).await?;
        let html = self.run(&["-source"], url).await?;
        Ok(Page {
            url: url.to_string(),
            text: text.trim().to_string(),
            html,
        })
    }

    fn check_installed(&self) -> bool {
        which::which(&self.binary).is_ok()
    }

    fn name(&self) -> &str {
        "lynx"
    }
}
