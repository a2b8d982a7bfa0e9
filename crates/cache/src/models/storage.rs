use super::{ScanId, StorageId, from_millis, opt_from_json, opt_from_millis};
use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use geocrawl_storage::Remote;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Idle,
    Pending,
    Processing,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Processing => "processing",
        }
    }
}

impl Display for ScanStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(Self::Idle),
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            _ => exn::bail!(ErrorKind::InvalidData("scan status")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStep {
    Listing,
    Analyzing,
}

impl ScanStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Analyzing => "analyzing",
        }
    }
}

impl FromStr for ScanStep {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "listing" => Ok(Self::Listing),
            "analyzing" => Ok(Self::Analyzing),
            _ => exn::bail!(ErrorKind::InvalidData("scan step")),
        }
    }
}

/// Counters maintained while a scan runs, and kept in the result once it succeeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub files: u64,
    pub directories: u64,
    pub data_files: u64,
    /// Data files whose fingerprint was already known, so their metadata was
    /// carried over instead of recomputed.
    pub not_modified_data_files: u64,
    pub analyzed_data_files: u64,
    pub broken_data_files: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub last_successful_scan: ScanId,
    #[serde(flatten)]
    pub counts: ScanProgress,
    /// Seconds.
    pub duration: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Connectivity,
    Listing,
    Persistence,
    Conflict,
    NotRaster,
    Internal,
    /// Written by a newer version.
    #[serde(other)]
    Other,
}

/// A persisted failure: the last error of a scan, or why one item could not
/// be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub kind: FailureKind,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

impl ErrorRecord {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            occurred_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanState {
    pub status: ScanStatus,
    pub step: Option<ScanStep>,
    pub progress: Option<ScanProgress>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub queued_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub processing_since: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub heartbeat: Option<OffsetDateTime>,
    pub last_error: Option<ErrorRecord>,
    /// Id of the scan in progress; the millisecond `processing_since` stands for.
    #[serde(skip)]
    pub scan_id: Option<ScanId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Storage {
    pub id: StorageId,
    #[serde(flatten)]
    pub remote: Remote,
    pub hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub scan: ScanState,
    pub result: Option<ScanResult>,
}

impl Storage {
    /// The scan whose items are the current snapshot, if any scan ever succeeded.
    pub fn last_successful_scan(&self) -> Option<ScanId> {
        self.result.map(|r| r.last_successful_scan)
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct StorageRow {
    pub id: i64,
    pub hash: String,
    pub protocol: String,
    pub params: String,
    pub created_at: i64,
    pub scan_status: String,
    pub scan_step: Option<String>,
    pub scan_progress: Option<String>,
    pub scan_queued_at: Option<i64>,
    pub scan_processing_since: Option<i64>,
    pub scan_heartbeat: Option<i64>,
    pub scan_last_error: Option<String>,
    pub result: Option<String>,
}

/// Split a remote into its `protocol` and `params` columns.
pub(crate) fn remote_columns(remote: &Remote) -> Result<(&'static str, String)> {
    let mut value = serde_json::to_value(remote).or_raise(|| ErrorKind::InvalidData("storage params"))?;
    let params = value.get_mut("params").map(serde_json::Value::take).unwrap_or_default();
    let params = serde_json::to_string(&params).or_raise(|| ErrorKind::InvalidData("storage params"))?;
    Ok((remote.protocol().as_str(), params))
}

impl TryFrom<StorageRow> for Storage {
    type Error = Error;

    fn try_from(row: StorageRow) -> Result<Self> {
        let params: serde_json::Value =
            serde_json::from_str(&row.params).or_raise(|| ErrorKind::InvalidData("storage params"))?;
        let remote: Remote = serde_json::from_value(serde_json::json!({ "type": row.protocol, "params": params }))
            .or_raise(|| ErrorKind::InvalidData("storage params"))?;
        let scan = ScanState {
            status: row.scan_status.parse()?,
            step: row.scan_step.as_deref().map(str::parse).transpose()?,
            progress: opt_from_json(row.scan_progress.as_deref(), "scan progress")?,
            queued_at: opt_from_millis(row.scan_queued_at)?,
            processing_since: opt_from_millis(row.scan_processing_since)?,
            heartbeat: opt_from_millis(row.scan_heartbeat)?,
            last_error: opt_from_json(row.scan_last_error.as_deref(), "scan error")?,
            scan_id: row.scan_processing_since.map(ScanId::from_millis),
        };
        Ok(Self {
            id: row.id,
            remote,
            hash: row.hash,
            created_at: from_millis(row.created_at)?,
            scan,
            result: opt_from_json(row.result.as_deref(), "scan result")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> StorageRow {
        StorageRow {
            id: 3,
            hash: "abc".to_string(),
            protocol: "ftp".to_string(),
            params: r#"{"host":"ftp.example.org","root":"/pub"}"#.to_string(),
            created_at: 1_700_000_000_000,
            scan_status: "processing".to_string(),
            scan_step: Some("analyzing".to_string()),
            scan_progress: Some(r#"{"files":2,"directories":1,"dataFiles":1,"notModifiedDataFiles":0,"analyzedDataFiles":0,"brokenDataFiles":0}"#.to_string()),
            scan_queued_at: None,
            scan_processing_since: Some(1_700_000_100_000),
            scan_heartbeat: Some(1_700_000_100_500),
            scan_last_error: None,
            result: None,
        }
    }

    #[test]
    fn test_row_to_model() {
        let storage = Storage::try_from(row()).unwrap();
        let Remote::Ftp(params) = &storage.remote else {
            panic!("expected an FTP remote");
        };
        assert_eq!(params.host, "ftp.example.org");
        assert_eq!(storage.scan.status, ScanStatus::Processing);
        assert_eq!(storage.scan.step, Some(ScanStep::Analyzing));
        assert_eq!(storage.scan.progress.unwrap().data_files, 1);
        assert_eq!(storage.scan.scan_id, Some(ScanId::from_millis(1_700_000_100_000)));
    }

    #[test]
    fn test_remote_columns_round_trip() {
        let remote = Remote::from_url("sftp://geo@sftp.example.org:2222/rasters").unwrap();
        let (protocol, params) = remote_columns(&remote).unwrap();
        assert_eq!(protocol, "sftp");
        let row = StorageRow {
            protocol: protocol.to_string(),
            params,
            ..row()
        };
        assert_eq!(Storage::try_from(row).unwrap().remote, remote);
    }

    #[test]
    fn test_document_shape() {
        let storage = Storage::try_from(row()).unwrap();
        let doc = serde_json::to_value(&storage).unwrap();
        assert_eq!(doc["type"], "ftp");
        assert_eq!(doc["params"]["host"], "ftp.example.org");
        assert_eq!(doc["scan"]["status"], "processing");
        assert_eq!(doc["scan"]["progress"]["dataFiles"], 1);
        assert!(doc["scan"]["processingSince"].is_string());
        assert!(doc["result"].is_null());
    }

    #[test]
    fn test_unknown_failure_kind() {
        let record: ErrorRecord =
            serde_json::from_str(r#"{"kind":"quota","message":"m","occurredAt":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(record.kind, FailureKind::Other);
    }

    #[test]
    fn test_result_is_flat() {
        let result = ScanResult {
            last_successful_scan: ScanId::from_millis(42),
            counts: ScanProgress { files: 2, ..Default::default() },
            duration: 7,
        };
        let doc = serde_json::to_value(result).unwrap();
        assert_eq!(doc["lastSuccessfulScan"], 42);
        assert_eq!(doc["files"], 2);
        assert_eq!(doc["duration"], 7);
    }
}
