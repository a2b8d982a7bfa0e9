use crate::analyze::MetadataAnalyzer;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use geocrawl_cache::Repository;
use geocrawl_config::Config;
use geocrawl_storage::AdapterPool;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Wait after finding no pending scan.
    pub poll_interval: Duration,
    /// Minimum time between progress writes while analyzing.
    pub heartbeat_interval: Duration,
    pub analysis_concurrency: usize,
    /// Analysis concurrency for FTP storages.
    pub ftp_analysis_concurrency: usize,
    /// When set, HTTP files are handed to the analyzer through this
    /// service's own file endpoint rather than by their origin URL.
    pub public_url: Option<Url>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(5),
            analysis_concurrency: 8,
            ftp_analysis_concurrency: 1,
            public_url: None,
        }
    }
}

impl Settings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let public_url = match config.server.public_url.as_deref() {
            Some(raw) => {
                let url = Url::parse(raw).or_raise(|| ErrorKind::InvalidRemote(format!("public URL: {raw}")))?;
                if url.cannot_be_a_base() {
                    exn::bail!(ErrorKind::InvalidRemote(format!("public URL: {raw}")));
                }
                Some(url)
            },
            None => None,
        };
        Ok(Self {
            poll_interval: config.poll_interval(),
            heartbeat_interval: config.heartbeat_interval(),
            analysis_concurrency: config.analysis.concurrency,
            ftp_analysis_concurrency: config.analysis.ftp_concurrency,
            public_url,
        })
    }
}

/// Everything a scan or a download needs, shared for the process lifetime.
pub struct Context {
    pub repo: Repository,
    /// Adapters reused across scans and downloads. A scan closes the
    /// sessions of its adapter when done; the adapter stays pooled until its
    /// storage is removed.
    pub adapters: AdapterPool,
    /// Required by scans that find unanalyzed data files.
    pub analyzer: Option<Arc<dyn MetadataAnalyzer>>,
    pub settings: Settings,
}

impl Context {
    pub fn new(repo: Repository, adapters: AdapterPool, settings: Settings) -> Self {
        Self {
            repo,
            adapters,
            analyzer: None,
            settings,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn MetadataAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }
}
