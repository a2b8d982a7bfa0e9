//! Metadata analysis of raster files.
//!
//! Extracting projections and footprints from raster headers is the job of
//! an external service behind [`MetadataAnalyzer`]. The [`pipeline`] feeds it
//! the data items of a scan that have no cached metadata yet.

pub(crate) mod pipeline;
mod remote;

pub use self::remote::HttpAnalyzer;

use async_trait::async_trait;
use derive_more::{Display, Error};
use geocrawl_cache::{ErrorRecord, FailureKind};

/// Why one file could not be analyzed. Never fatal to a scan.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum AnalysisFailure {
    /// The analyzer read the file and does not recognize it as a raster.
    #[display("not a recognized raster: {_0}")]
    NotRaster(#[error(not(source))] String),
    /// The analyzer (or the remote file, through it) could not be reached.
    #[display("analysis unavailable: {_0}")]
    Connectivity(#[error(not(source))] String),
}

impl AnalysisFailure {
    pub fn to_record(&self) -> ErrorRecord {
        let kind = match self {
            Self::NotRaster(_) => FailureKind::NotRaster,
            Self::Connectivity(_) => FailureKind::Connectivity,
        };
        ErrorRecord::new(kind, self.to_string())
    }
}

/// Computes the metadata document of the raster behind an access locator.
#[async_trait]
pub trait MetadataAnalyzer: Send + Sync {
    async fn analyze(&self, locator: &str) -> Result<serde_json::Value, AnalysisFailure>;
}
