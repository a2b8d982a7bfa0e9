//! Byte-range proxy for files of a storage's current snapshot.
//!
//! Only files listed by the last successful scan can be fetched, so the proxy
//! never becomes a way to read arbitrary paths off a remote.

use crate::error::{ErrorKind, Result};
use crate::{Context, catalog, tree};
use exn::ResultExt;
use geocrawl_cache::{DataFormat, StorageId};
use geocrawl_storage::{ByteStream, ModifiedMarker, RangeError, parse_range};
use http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use tracing::instrument;
use url::Url;

/// Where this service serves `path` of `storage` from, below `public_url`.
///
/// ```
/// use url::Url;
/// let base = Url::parse("https://geocrawl.example.org/api/").unwrap();
/// assert_eq!(
///     geocrawl_engine::download::proxied_locator(&base, 7, "/data/a b.jp2"),
///     "https://geocrawl.example.org/api/storages/7/files/data/a%20b.jp2",
/// );
/// ```
pub fn proxied_locator(public_url: &Url, storage: StorageId, path: &str) -> String {
    let mut url = public_url.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend(["storages", &storage.to_string(), "files"])
            .extend(path.split('/').filter(|s| !s.is_empty()));
    }
    url.to_string()
}

/// A response ready to be written by whatever serves HTTP.
pub struct Download {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `None` for `HEAD`.
    pub body: Option<ByteStream>,
}

impl Debug for Download {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Download")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|_| ".."))
            .finish()
    }
}

fn content_type(path: &str) -> &'static str {
    match tree::classify(path) {
        Some(DataFormat::Jpeg2000) => "image/jp2",
        Some(DataFormat::GeoTiff) => "image/tiff",
        None => "application/octet-stream",
    }
}

/// Serve `path` of `storage`, or the window of it `range` asks for.
///
/// `HEAD` only stats the file and ignores `range`. A remote that can't be
/// reached, or no longer has the file, reads as not found.
#[instrument(skip(ctx, method), fields(%method))]
pub async fn download(
    ctx: &Context,
    storage: StorageId,
    path: &str,
    method: &Method,
    range: Option<&str>,
) -> Result<Download> {
    if *method != Method::GET && *method != Method::HEAD {
        exn::bail!(ErrorKind::MethodNotAllowed(method.to_string()));
    }
    let (found, item) = catalog::resolve_file(ctx, storage, path).await?;
    let not_found = || ErrorKind::NotFound(format!("{path} on storage {storage}"));
    let adapter = ctx.adapters.get(&found.remote).await.or_raise(not_found)?;
    let stat = adapter.stat(&item.full_path).await.or_raise(not_found)?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type(&item.name)));
    if let Some(ModifiedMarker::ETag(tag)) = &stat.modified
        && let Ok(value) = HeaderValue::from_str(tag)
    {
        headers.insert(ETAG, value);
    }
    if *method == Method::HEAD {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(stat.size));
        return Ok(Download {
            status: StatusCode::OK,
            headers,
            body: None,
        });
    }

    let range = match range {
        Some(header) => Some(parse_range(header, stat.size).map_err(|err| match err {
            RangeError::Unsatisfiable { size } => exn::Exn::from(ErrorKind::RangeNotSatisfiable { size }),
            other => exn::Exn::from(ErrorKind::InvalidRange(other.to_string())),
        })?),
        None => None,
    };
    let file = adapter.stream_range(&item.full_path, range).await.or_raise(not_found)?;
    headers.insert(CONTENT_LENGTH, HeaderValue::from(file.content_length()));
    let status = match file.range {
        Some(range) => {
            let value = HeaderValue::from_str(&range.content_range(file.size))
                .or_raise(|| ErrorKind::InvalidRange(range.content_range(file.size)))?;
            headers.insert(CONTENT_RANGE, value);
            StatusCode::PARTIAL_CONTENT
        },
        None => StatusCode::OK,
    };
    tracing::debug!(%status, length = file.content_length(), "Serving file");
    Ok(Download {
        status,
        headers,
        body: Some(file.stream),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use futures::TryStreamExt;
    use geocrawl_storage::Protocol;
    use geocrawl_storage::backend::MockAdapter;
    use rstest::rstest;

    async fn scanned() -> (Context, StorageId) {
        let adapter = MockAdapter::new(Protocol::Http)
            .with_file("/tiles/a.jp2", &(0u8..100).collect::<Vec<_>>(), "v1")
            .with_file("/readme.txt", b"hello", "v1");
        let (ctx, storage, _) = testing::scanned_storage(adapter).await;
        (ctx, storage.id)
    }

    #[rstest]
    #[case("https://geocrawl.example.org", "https://geocrawl.example.org/storages/3/files/x/y.tif")]
    #[case("https://geocrawl.example.org/api/", "https://geocrawl.example.org/api/storages/3/files/x/y.tif")]
    #[case("https://geocrawl.example.org/api", "https://geocrawl.example.org/api/storages/3/files/x/y.tif")]
    fn test_proxied_locator(#[case] base: &str, #[case] expected: &str) {
        let base = Url::parse(base).unwrap();
        assert_eq!(proxied_locator(&base, 3, "/x/y.tif"), expected);
    }

    #[tokio::test]
    async fn test_range() {
        let (ctx, storage) = scanned().await;
        let download = download(&ctx, storage, "/tiles/a.jp2", &Method::GET, Some("bytes=10-19")).await.unwrap();
        assert_eq!(download.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(download.headers[CONTENT_LENGTH], "10");
        assert_eq!(download.headers[CONTENT_RANGE], "bytes 10-19/100");
        assert_eq!(download.headers[CONTENT_TYPE], "image/jp2");
        let body: Vec<_> = download.body.unwrap().try_collect().await.unwrap();
        assert_eq!(body.concat(), (10u8..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_whole_file() {
        let (ctx, storage) = scanned().await;
        let download = download(&ctx, storage, "/readme.txt", &Method::GET, None).await.unwrap();
        assert_eq!(download.status, StatusCode::OK);
        assert_eq!(download.headers[CONTENT_LENGTH], "5");
        assert_eq!(download.headers[CONTENT_TYPE], "application/octet-stream");
        let body: Vec<_> = download.body.unwrap().try_collect().await.unwrap();
        assert_eq!(body.concat(), b"hello");
    }

    #[tokio::test]
    async fn test_head() {
        let (ctx, storage) = scanned().await;
        let download = download(&ctx, storage, "/tiles/a.jp2", &Method::HEAD, None).await.unwrap();
        assert_eq!(download.status, StatusCode::OK);
        assert_eq!(download.headers[CONTENT_LENGTH], "100");
        assert_eq!(download.headers[ACCEPT_RANGES], "bytes");
        assert!(download.body.is_none());
    }

    #[rstest]
    #[case("bytes=0-1,4-5")]
    #[case("bytes=200-300")]
    #[tokio::test]
    async fn test_head_ignores_range(#[case] header: &str) {
        let (ctx, storage) = scanned().await;
        let download = download(&ctx, storage, "/tiles/a.jp2", &Method::HEAD, Some(header)).await.unwrap();
        assert_eq!(download.status, StatusCode::OK);
        assert_eq!(download.headers[CONTENT_LENGTH], "100");
        assert!(download.headers.get(CONTENT_RANGE).is_none());
    }

    #[rstest]
    #[case("bytes=0-1,4-5", 400)]
    #[case("items=0-1", 400)]
    #[case("bytes=200-300", 416)]
    #[tokio::test]
    async fn test_bad_range(#[case] header: &str, #[case] status: u16) {
        let (ctx, storage) = scanned().await;
        let err = download(&ctx, storage, "/tiles/a.jp2", &Method::GET, Some(header)).await.unwrap_err();
        assert_eq!(err.status_code().as_u16(), status);
    }

    #[rstest]
    #[case("/tiles/missing.jp2")]
    #[case("/tiles/")]
    #[case("/../etc/passwd")]
    #[tokio::test]
    async fn test_unknown_path(#[case] path: &str) {
        let (ctx, storage) = scanned().await;
        let err = download(&ctx, storage, path, &Method::GET, None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_file_gone_from_remote() {
        let adapter = MockAdapter::new(Protocol::Http).with_file("/a.tif", b"abc", "v1");
        let (ctx, storage, adapter) = testing::scanned_storage(adapter).await;
        adapter.remove("/a.tif").await;
        let err = download(&ctx, storage.id, "/a.tif", &Method::GET, None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }
}
