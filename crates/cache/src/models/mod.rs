mod dataset;
mod storage;
mod tree_item;

pub use self::dataset::Dataset;
pub(crate) use self::dataset::DatasetRow;
pub use self::storage::{ErrorRecord, FailureKind, ScanProgress, ScanResult, ScanState, ScanStatus, ScanStep, Storage};
pub(crate) use self::storage::{StorageRow, remote_columns};
pub use self::tree_item::{NewTreeItem, TreeItem};
pub(crate) use self::tree_item::TreeItemRow;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use time::OffsetDateTime;

pub type StorageId = i64;

/// Identifies one scan of one storage: the Unix millisecond at which the scan
/// was claimed. Every tree item is tagged with the scan that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(i64);

impl ScanId {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn started_at(&self) -> Result<OffsetDateTime> {
        from_millis(self.0)
    }
}

impl Display for ScanId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// Raster format, decided from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataFormat {
    #[serde(rename = "jpeg2000")]
    Jpeg2000,
    #[serde(rename = "geotiff")]
    GeoTiff,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg2000 => "jpeg2000",
            Self::GeoTiff => "geotiff",
        }
    }
}

impl Display for DataFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataFormat {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jpeg2000" => Ok(Self::Jpeg2000),
            "geotiff" => Ok(Self::GeoTiff),
            _ => exn::bail!(ErrorKind::InvalidData("data format")),
        }
    }
}

pub(crate) fn to_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_millis(millis: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).or_raise(|| ErrorKind::InvalidData("timestamp"))
}

pub(crate) fn opt_from_millis(millis: Option<i64>) -> Result<Option<OffsetDateTime>> {
    millis.map(from_millis).transpose()
}

pub(crate) fn to_json<T: Serialize>(value: &T, what: &'static str) -> Result<String> {
    serde_json::to_string(value).or_raise(|| ErrorKind::InvalidData(what))
}

pub(crate) fn opt_to_json<T: Serialize>(value: Option<&T>, what: &'static str) -> Result<Option<String>> {
    value.map(|v| to_json(v, what)).transpose()
}

pub(crate) fn opt_from_json<T: DeserializeOwned>(raw: Option<&str>, what: &'static str) -> Result<Option<T>> {
    raw.map(|raw| serde_json::from_str(raw).or_raise(|| ErrorKind::InvalidData(what))).transpose()
}

pub(crate) fn to_size(size: Option<u64>) -> Result<Option<i64>> {
    size.map(|s| i64::try_from(s).or_raise(|| ErrorKind::InvalidData("size"))).transpose()
}

pub(crate) fn from_size(size: Option<i64>) -> Result<Option<u64>> {
    size.map(|s| u64::try_from(s).or_raise(|| ErrorKind::InvalidData("size"))).transpose()
}
