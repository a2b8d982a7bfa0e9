//! Error types for the [`scan`](super) module.
//!
//! These never leave the engine as errors: a failed scan is recorded on its
//! storage as an [`ErrorRecord`](geocrawl_cache::ErrorRecord) whose kind is
//! derived from the variant here.

use derive_more::{Display, Error};
use geocrawl_cache::FailureKind;

/// A scan error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies what aborted a scan.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote could not be reached, or refused the credentials.
    #[display("remote storage is unreachable")]
    Connectivity,
    /// A directory of the remote tree could not be listed.
    #[display("remote tree could not be listed")]
    Listing,
    /// Crawl results could not be written.
    #[display("scan results could not be stored")]
    Persistence,
    /// The storage stopped running this scan underneath us.
    #[display("scan state changed concurrently")]
    Conflict,
    /// Data files need analyzing but no analyzer is configured.
    #[display("no metadata analyzer configured")]
    NoAnalyzer,
    /// The stored connection parameters do not describe a usable remote.
    #[display("storage adapter unavailable")]
    Adapter,
}

impl ErrorKind {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Connectivity => FailureKind::Connectivity,
            Self::Listing => FailureKind::Listing,
            Self::Persistence => FailureKind::Persistence,
            Self::Conflict => FailureKind::Conflict,
            Self::NoAnalyzer | Self::Adapter => FailureKind::Internal,
        }
    }
}

/// Raise a storage error as the scan error it amounts to.
#[track_caller]
pub(crate) fn storage_failure(err: geocrawl_storage::error::Error, fallback: ErrorKind) -> Error {
    let kind = if err.is_connectivity() { ErrorKind::Connectivity } else { fallback };
    err.raise(kind)
}

/// Raise a persistence error as the scan error it amounts to.
#[track_caller]
pub(crate) fn cache_failure(err: geocrawl_cache::error::Error) -> Error {
    let kind = match &*err {
        geocrawl_cache::error::ErrorKind::Conflict(_) | geocrawl_cache::error::ErrorKind::NotFound(_) => ErrorKind::Conflict,
        _ => ErrorKind::Persistence,
    };
    err.raise(kind)
}
