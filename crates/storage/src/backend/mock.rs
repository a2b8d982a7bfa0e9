//! In-memory storage adapter for testing.

use crate::backend::StorageAdapter;
use crate::error::{ErrorKind, Result};
use crate::models::{ByteStream, ModifiedMarker, NodeKind, Protocol, RemoteFile, RemoteStat, TreeNode};
use crate::path;
use crate::range::ByteRange;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use geocrawl_asyncutils::ByteStreamExt;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Chunk size the mock streams files in; small so range tests cross chunks.
const CHUNK: usize = 7;

#[derive(Debug, Clone)]
enum Entry {
    Directory,
    File { data: Vec<u8>, modified: String },
}

/// In-memory storage adapter for testing.
///
/// Entries live in a sorted map keyed by full path (directories with a
/// trailing `/`), so listings come back in a stable order. Files can be
/// changed between scans, directories can be made to fail, and the whole
/// remote can be taken "offline" to simulate connectivity loss.
///
/// # Examples
///
/// ```
/// use geocrawl_storage::backend::{MockAdapter, StorageAdapter};
/// use geocrawl_storage::models::Protocol;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let adapter = MockAdapter::new(Protocol::Ftp)
///     .with_file("/data/a.jp2", b"raster", "v1")
///     .with_file("/b.txt", b"text", "v1");
/// let tree = adapter.list_tree("/").await.unwrap();
/// assert_eq!(tree.children.len(), 2);
/// # }
/// ```
pub struct MockAdapter {
    protocol: Protocol,
    entries: RwLock<BTreeMap<String, Entry>>,
    failing: RwLock<HashSet<String>>,
    offline: AtomicBool,
    listing_concurrency: usize,
    listings: AtomicUsize,
    listing_in_flight: AtomicUsize,
    listing_peak: AtomicUsize,
}

impl MockAdapter {
    pub fn new(protocol: Protocol) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("/".to_string(), Entry::Directory);
        Self {
            protocol,
            entries: RwLock::new(entries),
            failing: RwLock::new(HashSet::new()),
            offline: AtomicBool::new(false),
            listing_concurrency: 1,
            listings: AtomicUsize::new(0),
            listing_in_flight: AtomicUsize::new(0),
            listing_peak: AtomicUsize::new(0),
        }
    }

    /// Add a file (and any missing parent directories).
    ///
    /// Panics on an invalid path. If test setup is wrong, the test should
    /// not pass.
    pub fn with_file(mut self, file: &str, data: &[u8], modified: &str) -> Self {
        insert_file(self.entries.get_mut(), file, data, modified);
        self
    }

    /// Let [`list_tree`](StorageAdapter::list_tree) keep `limit` listings
    /// in flight, like the HTTP adapter does.
    pub fn with_listing_concurrency(mut self, limit: usize) -> Self {
        self.listing_concurrency = limit;
        self
    }

    pub fn with_directory(mut self, dir: &str) -> Self {
        insert_directories(self.entries.get_mut(), dir);
        self
    }

    pub async fn put_file(&self, file: &str, data: &[u8], modified: &str) {
        insert_file(&mut *self.entries.write().await, file, data, modified);
    }

    pub async fn remove(&self, file: &str) {
        self.entries.write().await.remove(file);
    }

    /// Make every listing of `dir` fail.
    pub async fn fail_listing(&self, dir: &str) {
        let Ok(dir) = path::directory(dir) else {
            panic!("MockAdapter::fail_listing: invalid path {dir}");
        };
        self.failing.write().await.insert(dir);
    }

    /// While offline, every call fails with a connectivity error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `list_directory` calls served so far.
    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    /// Most `list_directory` calls ever in flight at once.
    pub fn listing_peak(&self) -> usize {
        self.listing_peak.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<()> {
        match self.offline.load(Ordering::SeqCst) {
            true => exn::bail!(ErrorKind::Connectivity("mock remote is offline".into())),
            false => Ok(()),
        }
    }

    async fn list_entries(&self, dir: &str) -> Result<Vec<TreeNode>> {
        let dir = path::directory(dir)?;
        if self.failing.read().await.contains(&dir) {
            return Err(ErrorKind::listing(&dir, "permission denied"));
        }
        let entries = self.entries.read().await;
        if !matches!(entries.get(&dir), Some(Entry::Directory)) {
            return Err(ErrorKind::listing(&dir, "no such directory"));
        }
        let children = entries
            .range(dir.clone()..)
            .skip(1)
            .take_while(|(key, _)| key.starts_with(&dir))
            .filter(|(key, _)| {
                let relative = key[dir.len()..].trim_end_matches('/');
                !relative.is_empty() && !relative.contains('/')
            })
            .map(|(key, entry)| {
                let name = path::file_name(key).to_string();
                match entry {
                    Entry::Directory => TreeNode::directory(name, key.clone()),
                    Entry::File { data, modified } => TreeNode::file(
                        name,
                        key.clone(),
                        Some(data.len() as u64),
                        Some(ModifiedMarker::Timestamp(modified.clone())),
                    ),
                }
            })
            .collect();
        Ok(children)
    }

    async fn file(&self, file: &str) -> Result<(Vec<u8>, String)> {
        let file = path::validate_file(file)?;
        match self.entries.read().await.get(&file) {
            Some(Entry::File { data, modified }) => Ok((data.clone(), modified.clone())),
            _ => exn::bail!(ErrorKind::NotFound(file)),
        }
    }
}

fn insert_directories(entries: &mut BTreeMap<String, Entry>, dir: &str) {
    let Ok(dir) = path::directory(dir) else {
        panic!("MockAdapter: invalid directory {dir}");
    };
    let mut current = String::from("/");
    for segment in dir.split('/').filter(|s| !s.is_empty()) {
        current.push_str(segment);
        current.push('/');
        entries.entry(current.clone()).or_insert(Entry::Directory);
    }
}

fn insert_file(entries: &mut BTreeMap<String, Entry>, file: &str, data: &[u8], modified: &str) {
    let Ok(file) = path::validate_file(file) else {
        panic!("MockAdapter: invalid file path {file}");
    };
    let parent = &file[..file.len() - path::file_name(&file).len()];
    insert_directories(entries, parent);
    entries.insert(
        file,
        Entry::File {
            data: data.to_vec(),
            modified: modified.to_string(),
        },
    );
}

#[async_trait]
impl StorageAdapter for MockAdapter {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn root(&self) -> &str {
        "/"
    }

    fn listing_concurrency(&self) -> usize {
        self.listing_concurrency
    }

    async fn list_directory(&self, dir: &str) -> Result<Vec<TreeNode>> {
        self.ensure_online()?;
        self.listings.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.listing_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.listing_peak.fetch_max(in_flight, Ordering::SeqCst);
        // Give sibling listings the chance to start, as a network round trip would.
        tokio::task::yield_now().await;
        let listing = self.list_entries(dir).await;
        self.listing_in_flight.fetch_sub(1, Ordering::SeqCst);
        listing
    }

    fn access_locator(&self, file: &str) -> Result<String> {
        Ok(format!("{}://mock{}", self.protocol, path::validate_file(file)?))
    }

    async fn stat(&self, file: &str) -> Result<RemoteStat> {
        self.ensure_online()?;
        let (data, modified) = self.file(file).await?;
        Ok(RemoteStat {
            size: data.len() as u64,
            modified: Some(ModifiedMarker::Timestamp(modified)),
        })
    }

    async fn stream_range(&self, file: &str, range: Option<ByteRange>) -> Result<RemoteFile> {
        self.ensure_online()?;
        let (data, _) = self.file(file).await?;
        let size = data.len() as u64;
        let start = range.map(|r| r.start).unwrap_or(0).min(size) as usize;
        // Like FTP: seek to the start, stream to EOF, and let the limiter
        // enforce the end.
        let chunks: Vec<io::Result<Bytes>> =
            data[start..].chunks(CHUNK).map(|c| Ok(Bytes::copy_from_slice(c))).collect();
        let length = range.map(|r| r.len()).unwrap_or(size);
        let body: ByteStream = Box::pin(stream::iter(chunks).limit_bytes(length));
        Ok(RemoteFile { size, range, stream: body })
    }

    async fn check_connectivity(&self) -> Result<()> {
        self.ensure_online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn adapter() -> MockAdapter {
        MockAdapter::new(Protocol::Sftp)
            .with_file("/data/a.jp2", &[1u8; 100], "v1")
            .with_file("/data/deeper/c.tif", b"ccc", "v1")
            .with_file("/b.txt", b"bb", "v1")
            .with_directory("/empty")
    }

    #[tokio::test]
    async fn test_list_directory_immediate_children() {
        let adapter = adapter();
        let paths: Vec<_> = adapter
            .list_directory("/data/")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.full_path)
            .collect();
        assert_eq!(paths, ["/data/a.jp2", "/data/deeper/"]);
        assert!(adapter.list_directory("/empty/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_tree_failing_branch_aborts() {
        let adapter = adapter();
        adapter.fail_listing("/data/deeper").await;
        let err = adapter.list_tree("/").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Listing { path, .. } if path == "/data/deeper/"));
    }

    #[tokio::test]
    async fn test_offline() {
        let adapter = adapter();
        adapter.set_offline(true);
        assert!(adapter.list_tree("/").await.unwrap_err().is_connectivity());
        adapter.set_offline(false);
        assert_eq!(adapter.list_tree("/").await.unwrap().children.len(), 3);
    }

    #[tokio::test]
    async fn test_stream_range() {
        let adapter = MockAdapter::new(Protocol::Ftp).with_file("/f.bin", &(0u8..100).collect::<Vec<_>>(), "v1");
        let file = adapter.stream_range("/f.bin", Some(ByteRange { start: 10, end: 19 })).await.unwrap();
        assert_eq!(file.content_length(), 10);
        let body: Vec<Bytes> = file.stream.try_collect().await.unwrap();
        assert_eq!(body.concat(), (10u8..20).collect::<Vec<_>>());
    }
}
