//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Remote could not be reached, or refused the handshake/credentials.
    #[display("connectivity error: {_0}")]
    Connectivity(#[error(not(source))] String),
    /// A single directory could not be listed.
    #[display("unable to list {path}: {reason}")]
    Listing { path: String, reason: String },
    /// File does not exist on the remote.
    #[display("file not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Path contains invalid characters or escapes the storage root
    #[display("invalid path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// Remote answered, but not in a way we understand.
    #[display("protocol error: {_0}")]
    Protocol(#[error(not(source))] String),
    /// Connection parameters can't describe a reachable remote.
    #[display("invalid connection parameters: {_0}")]
    InvalidParams(#[error(not(source))] String),
}

impl ErrorKind {
    #[track_caller]
    pub(crate) fn connectivity(err: impl std::fmt::Display) -> Error {
        Error::from(Self::Connectivity(err.to_string()))
    }

    #[track_caller]
    pub(crate) fn listing(path: &str, reason: impl std::fmt::Display) -> Error {
        Error::from(Self::Listing {
            path: path.to_string(),
            reason: reason.to_string(),
        })
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Protocol(_))
    }

    /// Returns `true` if the remote itself is unreachable (as opposed to one
    /// path on it being bad). Cached connections should be dropped.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}
