//! Layered configuration.
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults.
//! 2. `config.toml`, `config.yaml` or `config.json` in the user config
//!    directory (e.g. `~/.config/geocrawl/` on Linux).
//! 3. An explicit file, usually from `--config`.
//! 4. Environment variables prefixed with `GEOCRAWL_`; nested keys are
//!    separated by a double underscore (`GEOCRAWL_WORKER__POLL_INTERVAL=5`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use geocrawl_storage::{AdapterOptions, IndexPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "GEOCRAWL_";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "geocrawl", "geocrawl")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file.
    pub database: PathBuf,
    pub worker: WorkerConfig,
    pub crawl: CrawlConfig,
    pub analysis: AnalysisConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Seconds to wait after finding no pending scan.
    pub poll_interval: u64,
    /// Seconds between progress writes while analyzing.
    pub heartbeat_interval: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub http_concurrency: usize,
    pub http_index_policy: IndexPolicy,
    /// Seconds.
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub concurrency: usize,
    /// Used instead of `concurrency` when the file is read over FTP.
    pub ftp_concurrency: usize,
    /// Base URL of the metadata analysis service.
    pub analyzer_url: Option<String>,
    /// Seconds to wait for one file's metadata.
    pub timeout: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Public base URL of this service, for building proxied access locators.
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default `tracing` filter directive; `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for Config {
    fn default() -> Self {
        let database = project_dirs()
            .map(|dirs| dirs.data_dir().join("geocrawl.sqlite"))
            .unwrap_or_else(|| PathBuf::from("geocrawl.sqlite"));
        Self {
            database,
            worker: WorkerConfig {
                poll_interval: 2,
                heartbeat_interval: 5,
            },
            crawl: CrawlConfig {
                http_concurrency: 4,
                http_index_policy: IndexPolicy::Strict,
                timeout: 30,
            },
            analysis: AnalysisConfig {
                concurrency: 8,
                ftp_concurrency: 1,
                analyzer_url: None,
                timeout: 120,
            },
            server: ServerConfig::default(),
            log: LogConfig {
                filter: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load and validate the configuration from every source.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(explicit)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(database = %config.database.display(), "Loaded configuration");
        Ok(config)
    }

    /// The merged sources, before extraction.
    pub fn figment(explicit: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(dirs) = project_dirs() {
            let dir = dirs.config_dir();
            figment = figment
                .merge(Toml::file(dir.join("config.toml")))
                .merge(Yaml::file(dir.join("config.yaml")))
                .merge(Json::file(dir.join("config.json")));
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("worker.poll_interval", self.worker.poll_interval == 0),
            ("worker.heartbeat_interval", self.worker.heartbeat_interval == 0),
            ("crawl.http_concurrency", self.crawl.http_concurrency == 0),
            ("crawl.timeout", self.crawl.timeout == 0),
            ("analysis.concurrency", self.analysis.concurrency == 0),
            ("analysis.ftp_concurrency", self.analysis.ftp_concurrency == 0),
            ("analysis.timeout", self.analysis.timeout == 0),
        ];
        if let Some((key, _)) = checks.into_iter().find(|(_, zero)| *zero) {
            exn::bail!(ErrorKind::Invalid {
                key,
                reason: "must be greater than zero",
            });
        }
        if self.analysis.analyzer_url.as_deref().is_some_and(str::is_empty) {
            exn::bail!(ErrorKind::Invalid {
                key: "analysis.analyzer_url",
                reason: "must not be empty",
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.worker.poll_interval)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.worker.heartbeat_interval)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis.timeout)
    }

    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions {
            http_concurrency: self.crawl.http_concurrency,
            index_policy: self.crawl.http_index_policy,
            timeout: Duration::from_secs(self.crawl.timeout),
        }
    }
}
