//! HTTP "directory index" adapter.
//!
//! Crawls the auto-generated listing pages web servers produce for
//! directories (Apache `mod_autoindex`, nginx `autoindex`, ...). Links ending
//! in `/` are directories, everything else is a file whose size and change
//! marker come from a `HEAD` request.
//!
//! Every request (page fetch or `HEAD`) takes a permit from a per-storage
//! semaphore and releases it as soon as the response is in, so a directory
//! listing waiting on its files' `HEAD`s never starves them of permits.

use crate::backend::{AdapterOptions, StorageAdapter};
use crate::consts::{ANCHOR_SELECTOR, INDEX_TITLE_REGEX, TITLE_SELECTOR};
use crate::error::{Error, ErrorKind, Result};
use crate::models::{ByteStream, HttpParams, ModifiedMarker, NodeKind, Protocol, RemoteFile, RemoteStat, TreeNode};
use crate::path;
use crate::range::ByteRange;
use async_trait::async_trait;
use exn::ResultExt;
use futures::{StreamExt, TryStreamExt};
use geocrawl_asyncutils::ByteStreamExt;
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use reqwest::header::{CONTENT_LENGTH, ETAG, HeaderMap, HeaderName, LAST_MODIFIED, RANGE};
use reqwest::{Client, StatusCode};
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// Characters escaped when turning a decoded path segment back into a URL.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Which pages count as directory listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexPolicy {
    /// The page title must start with "Index of".
    #[default]
    Strict,
    /// Any HTML page; every in-prefix link is an entry.
    Lenient,
}

pub struct HttpAdapter {
    base: Url,
    root: String,
    client: Client,
    rate_limiter: Arc<Semaphore>,
    concurrency: usize,
    policy: IndexPolicy,
}

impl HttpAdapter {
    pub fn new(params: &HttpParams, options: &AdapterOptions) -> Result<Self> {
        let mut base =
            Url::parse(&params.url).or_raise(|| ErrorKind::InvalidParams(format!("not a URL: {}", params.url)))?;
        if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
            exn::bail!(ErrorKind::InvalidParams(format!("not an http(s) URL: {}", params.url)));
        }
        base.set_query(None);
        base.set_fragment(None);
        let root = path::directory(&decode(base.path()))?;
        base.set_path(&encode_path(&root));
        let client = Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.timeout)
            .user_agent(concat!("geocrawl/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::InvalidParams("unable to build HTTP client".into()))?;
        let concurrency = options.http_concurrency.max(1);
        Ok(Self {
            base,
            root,
            client,
            rate_limiter: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            policy: options.index_policy,
        })
    }

    fn url_for(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(&encode_path(path));
        url
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::Protocol("request limiter closed".into()))
    }

    async fn head(&self, path: &str) -> Result<(StatusCode, HeaderMap)> {
        let _permit = self.acquire_permit().await?;
        let response = self.client.head(self.url_for(path)).send().await.map_err(|err| transport(err, path))?;
        Ok((response.status(), response.headers().clone()))
    }

    /// Size and marker for a listed file. A file the server refuses to
    /// describe is still listed, just without them.
    async fn describe(&self, path: &str) -> Result<(Option<u64>, Option<ModifiedMarker>)> {
        let (status, headers) = self.head(path).await?;
        if !status.is_success() {
            tracing::warn!(path, %status, "HEAD failed, listing file without size");
            return Ok((None, None));
        }
        Ok((content_length(&headers), marker(&headers)))
    }
}

fn transport(err: reqwest::Error, subject: &str) -> Error {
    ErrorKind::connectivity(format!("{subject}: {err}"))
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

// `Response::content_length()` reflects the (empty) body of a HEAD response,
// not the header.
fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
}

/// ETag if the server sends one, otherwise Last-Modified.
fn marker(headers: &HeaderMap) -> Option<ModifiedMarker> {
    let header = |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    header(ETAG)
        .map(ModifiedMarker::ETag)
        .or_else(|| header(LAST_MODIFIED).map(ModifiedMarker::Timestamp))
}

/// Every `href` on the page, or `None` if the page isn't a directory index
/// under `policy`.
fn index_links(html: &str, policy: IndexPolicy) -> Option<Vec<String>> {
    let document = Html::parse_document(html);
    if policy == IndexPolicy::Strict {
        let title: String = document.select(&TITLE_SELECTOR).next()?.text().collect();
        if !INDEX_TITLE_REGEX.is_match(&title) {
            return None;
        }
    }
    Some(
        document
            .select(&ANCHOR_SELECTOR)
            .filter_map(|anchor| anchor.value().attr("href"))
            .map(str::to_string)
            .collect(),
    )
}

/// Decoded name and kind of the entry `href` points to, if it is an immediate
/// child of `page`. Sorting links (`?C=N;O=D`), fragments, the parent, the
/// page itself and anything on another origin are all dropped.
fn child_entry(page: &Url, href: &str) -> Option<(String, NodeKind)> {
    let target = page.join(href).ok()?;
    if target.query().is_some() || target.fragment().is_some() || target.origin() != page.origin() {
        return None;
    }
    let relative = target.path().strip_prefix(page.path())?;
    let (segment, kind) = match relative.strip_suffix('/') {
        Some(dir) => (dir, NodeKind::Directory),
        None => (relative, NodeKind::File),
    };
    if segment.is_empty() || segment.contains('/') {
        return None;
    }
    Some((decode(segment), kind))
}

#[async_trait]
impl StorageAdapter for HttpAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn listing_concurrency(&self) -> usize {
        self.concurrency
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<TreeNode>> {
        let dir = path::directory(path)?;
        let page = self.url_for(&dir);
        let html = {
            let _permit = self.acquire_permit().await?;
            let response = self.client.get(page.clone()).send().await.map_err(|err| transport(err, &dir))?;
            if !response.status().is_success() {
                return Err(ErrorKind::listing(&dir, format!("HTTP {}", response.status())));
            }
            response.text().await.map_err(|err| transport(err, &dir))?
        };
        let links = index_links(&html, self.policy).ok_or_else(|| ErrorKind::listing(&dir, "not a directory index"))?;

        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        for href in links {
            let Some((name, kind)) = child_entry(&page, &href) else {
                continue;
            };
            let Ok(full_path) = path::join(&dir, &name, kind) else {
                continue;
            };
            // Index pages often link each entry twice (icon and name).
            if !seen.insert(full_path.clone()) {
                continue;
            }
            nodes.push(match kind {
                NodeKind::Directory => TreeNode::directory(name, full_path),
                NodeKind::File => TreeNode::file(name, full_path, None, None),
            });
        }

        let lookups: Vec<_> = nodes
            .iter()
            .filter(|n| !n.is_directory())
            .map(|node| self.describe(&node.full_path))
            .collect();
        let described: Vec<_> = futures::stream::iter(lookups)
            .buffered(self.concurrency)
            .try_collect()
            .await?;
        let mut described = described.into_iter();
        for node in nodes.iter_mut().filter(|n| !n.is_directory()) {
            if let Some((size, modified)) = described.next() {
                node.size = size;
                node.modified = modified;
            }
        }
        Ok(nodes)
    }

    fn access_locator(&self, path: &str) -> Result<String> {
        Ok(self.url_for(&path::validate_file(path)?).to_string())
    }

    async fn stat(&self, path: &str) -> Result<RemoteStat> {
        let file = path::validate_file(path)?;
        let (status, headers) = self.head(&file).await?;
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => exn::bail!(ErrorKind::NotFound(file)),
            status if !status.is_success() => exn::bail!(ErrorKind::Protocol(format!("{file}: HTTP {status}"))),
            _ => {},
        }
        let size = content_length(&headers)
            .ok_or_else(|| Error::from(ErrorKind::Protocol(format!("{file}: no Content-Length"))))?;
        Ok(RemoteStat {
            size,
            modified: marker(&headers),
        })
    }

    async fn stream_range(&self, path: &str, range: Option<ByteRange>) -> Result<RemoteFile> {
        let file = path::validate_file(path)?;
        let size = self.stat(&file).await?.size;
        let mut request = self.client.get(self.url_for(&file));
        if let Some(range) = range {
            request = request.header(RANGE, format!("bytes={}-{}", range.start, range.end));
        }
        let response = {
            let _permit = self.acquire_permit().await?;
            request.send().await.map_err(|err| transport(err, &file))?
        };
        let status = response.status();
        let (offset, length) = match (status, range) {
            (StatusCode::PARTIAL_CONTENT, Some(range)) => (0, range.len()),
            // Server ignored the Range header: cut the window out ourselves.
            (StatusCode::OK, Some(range)) => (range.start, range.len()),
            (StatusCode::OK, None) => (0, size),
            (StatusCode::NOT_FOUND | StatusCode::GONE, _) => exn::bail!(ErrorKind::NotFound(file)),
            _ => exn::bail!(ErrorKind::Protocol(format!("{file}: HTTP {status}"))),
        };
        let body: ByteStream = Box::pin(response.bytes_stream().map_err(io::Error::other).slice_bytes(offset, length));
        Ok(RemoteFile { size, range, stream: body })
    }

    async fn check_connectivity(&self) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        let response = self.client.get(self.base.clone()).send().await.map_err(|err| transport(err, &self.root))?;
        match response.status().is_success() {
            true => Ok(()),
            false => exn::bail!(ErrorKind::Connectivity(format!("{}: HTTP {}", self.base, response.status()))),
        }
    }
}
