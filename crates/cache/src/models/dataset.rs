use super::{DataFormat, ScanId, StorageId, from_size, opt_from_json};
use crate::error::{Error, Result};
use geocrawl_storage::ModifiedMarker;
use serde::{Deserialize, Serialize};

/// A distinct version of a raster file, keyed by `(storage, fingerprint)`.
///
/// Holds the file metadata from the scan that first saw it, and the computed
/// metadata once analysis succeeded. Scans never delete datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: i64,
    pub storage: StorageId,
    pub fingerprint: String,
    pub data_format: DataFormat,
    pub name: String,
    pub full_path: String,
    pub size: Option<u64>,
    pub modified_marker: Option<ModifiedMarker>,
    pub first_scan: ScanId,
    pub computed_metadata: Option<serde_json::Value>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct DatasetRow {
    pub id: i64,
    pub storage_id: i64,
    pub fingerprint: String,
    pub data_format: String,
    pub name: String,
    pub full_path: String,
    pub size: Option<i64>,
    pub modified_marker: Option<String>,
    pub first_scan: i64,
    pub computed_metadata: Option<String>,
}

impl TryFrom<DatasetRow> for Dataset {
    type Error = Error;

    fn try_from(row: DatasetRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            storage: row.storage_id,
            fingerprint: row.fingerprint,
            data_format: row.data_format.parse()?,
            name: row.name,
            full_path: row.full_path,
            size: from_size(row.size)?,
            modified_marker: opt_from_json(row.modified_marker.as_deref(), "modified marker")?,
            first_scan: ScanId::from_millis(row.first_scan),
            computed_metadata: opt_from_json(row.computed_metadata.as_deref(), "computed metadata")?,
        })
    }
}
