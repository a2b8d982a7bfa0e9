//! Storage adapter trait and implementations.
//!
//! This module defines the [`StorageAdapter`] trait, a uniform view over the
//! remote trees we crawl (FTP servers, SFTP servers, HTTP directory indexes).
//! Adapters are read-only: they list directories, describe files and stream
//! byte ranges out of them.

mod ftp;
mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod sftp;
mod walk;

pub use self::ftp::FtpAdapter;
pub use self::http::{HttpAdapter, IndexPolicy};
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockAdapter;
pub use self::sftp::SftpAdapter;
use crate::error::Result;
use crate::models::{Protocol, Remote, RemoteFile, RemoteStat, TreeNode};
use crate::range::ByteRange;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Per-deployment knobs shared by every adapter built through [`connect`].
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// Maximum concurrent HTTP requests per HTTP storage.
    pub http_concurrency: usize,
    pub index_policy: IndexPolicy,
    /// Connect/read timeout for remote operations.
    pub timeout: Duration,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            http_concurrency: 4,
            index_policy: IndexPolicy::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Uniform read-only interface over a remote tree.
///
/// # Paths
/// Every path is absolute on the remote (`/pub/data/a.tif`). Directory paths
/// end with `/`. Paths handed back by [`list_directory`](Self::list_directory)
/// can be passed straight back into any other method.
///
/// # Connections
/// Adapters connect lazily and may keep a session open between calls (FTP and
/// SFTP serialize their commands over it). Call [`disconnect`](Self::disconnect)
/// to drop it; the next call reconnects.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Directory the crawl starts from.
    fn root(&self) -> &str;

    /// How many [`list_directory`](Self::list_directory) calls
    /// [`list_tree`](Self::list_tree) may keep in flight. Adapters whose
    /// protocol multiplexes nothing over a session should leave this at 1.
    fn listing_concurrency(&self) -> usize {
        1
    }

    /// Immediate children of `path`, in server order.
    async fn list_directory(&self, path: &str) -> Result<Vec<TreeNode>>;

    /// The full tree below `root`.
    ///
    /// Any failure aborts the whole listing: a partial tree would make the
    /// persisted snapshot silently lose every file in the missing branch.
    async fn list_tree(&self, root: &str) -> Result<TreeNode> {
        self::walk::walk(self, root).await
    }

    /// URL an external consumer can use to fetch `path` directly.
    fn access_locator(&self, path: &str) -> Result<String>;

    async fn stat(&self, path: &str) -> Result<RemoteStat>;

    /// Stream the file, or only `range` of it.
    ///
    /// The returned stream yields exactly [`RemoteFile::content_length`]
    /// bytes when the remote behaves.
    async fn stream_range(&self, path: &str, range: Option<ByteRange>) -> Result<RemoteFile>;

    /// Open (and immediately close) a session to prove the remote is usable.
    async fn check_connectivity(&self) -> Result<()>;

    /// Drop any cached session.
    async fn disconnect(&self) {}
}

pub type AdapterHandle = Arc<dyn StorageAdapter>;

/// Build the adapter matching `remote`. Nothing is contacted until the first
/// call on the adapter.
pub fn connect(remote: &Remote, options: &AdapterOptions) -> Result<AdapterHandle> {
    Ok(match remote {
        Remote::Ftp(params) => Arc::new(FtpAdapter::new(params.clone(), options.timeout)?),
        Remote::Sftp(params) => Arc::new(SftpAdapter::new(params.clone(), options.timeout)?),
        Remote::Http(params) => Arc::new(HttpAdapter::new(params, options)?),
    })
}
