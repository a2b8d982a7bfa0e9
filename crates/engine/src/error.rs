//! Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Variants are named after what the
//! caller can do about them; the subsystem that failed is further down the
//! tree.

use derive_more::{Display, Error};
use http::StatusCode;

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The storage or file does not exist (or, through the download proxy,
    /// could not be reached).
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The storage is not in a state that allows the request.
    #[display("conflict: {_0}")]
    Conflict(#[error(not(source))] String),
    /// The `Range` header is malformed or asks for several ranges.
    #[display("invalid range: {_0}")]
    InvalidRange(#[error(not(source))] String),
    #[display("method not allowed: {_0}")]
    MethodNotAllowed(#[error(not(source))] String),
    #[display("range not satisfiable for {size} bytes")]
    RangeNotSatisfiable { size: u64 },
    /// Connection parameters that can't describe a remote.
    #[display("invalid remote: {_0}")]
    InvalidRemote(#[error(not(source))] String),
    /// The remote could not be reached or refused the credentials.
    #[display("remote storage is unreachable")]
    Unreachable,
    /// A scan was aborted; the previous snapshot is intact.
    #[display("scan failed")]
    Scan,
    #[display("persistence error")]
    Cache,
    #[display("storage error")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable | Self::Storage)
    }

    /// HTTP status a routing layer should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidRange(_) | Self::InvalidRemote(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Unreachable => StatusCode::BAD_GATEWAY,
            Self::Scan | Self::Cache | Self::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::NotFound("storage 1".into()), 404)]
    #[case(ErrorKind::Conflict("busy".into()), 409)]
    #[case(ErrorKind::InvalidRange("bytes=0-1,4-5".into()), 400)]
    #[case(ErrorKind::MethodNotAllowed("POST".into()), 405)]
    #[case(ErrorKind::RangeNotSatisfiable { size: 10 }, 416)]
    #[case(ErrorKind::Cache, 500)]
    fn test_status_code(#[case] kind: ErrorKind, #[case] status: u16) {
        assert_eq!(kind.status_code().as_u16(), status);
    }
}
