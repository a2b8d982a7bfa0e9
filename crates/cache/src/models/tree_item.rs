use super::{DataFormat, ErrorRecord, ScanId, StorageId, from_size, opt_from_json};
use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use geocrawl_storage::{ModifiedMarker, NodeKind};
use serde::{Deserialize, Serialize};

/// A crawled entry, ready to be stored by
/// [`Repository::save_tree_items`](crate::Repository::save_tree_items).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTreeItem {
    pub kind: NodeKind,
    pub name: String,
    pub full_path: String,
    pub parent_directory: String,
    pub size: Option<u64>,
    pub modified: Option<ModifiedMarker>,
    /// Files only.
    pub fingerprint: Option<String>,
    /// Files with a raster extension only.
    pub data_format: Option<DataFormat>,
}

/// One file or directory as seen by one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeItem {
    pub id: i64,
    pub storage: StorageId,
    pub scan: ScanId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    pub full_path: String,
    pub parent_directory: String,
    pub size: Option<u64>,
    pub modified_marker: Option<ModifiedMarker>,
    pub fingerprint: Option<String>,
    pub data_format: Option<DataFormat>,
    pub dataset: Option<i64>,
    pub computed_metadata: Option<serde_json::Value>,
    pub analyze_error: Option<ErrorRecord>,
}

impl TreeItem {
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct TreeItemRow {
    pub id: i64,
    pub storage_id: i64,
    pub scan_id: i64,
    pub kind: String,
    pub name: String,
    pub full_path: String,
    pub parent_directory: String,
    pub size: Option<i64>,
    pub modified_marker: Option<String>,
    pub fingerprint: Option<String>,
    pub data_format: Option<String>,
    pub dataset_id: Option<i64>,
    pub computed_metadata: Option<String>,
    pub analyze_error: Option<String>,
}

impl TryFrom<TreeItemRow> for TreeItem {
    type Error = Error;

    fn try_from(row: TreeItemRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            storage: row.storage_id,
            scan: ScanId::from_millis(row.scan_id),
            kind: row.kind.parse::<NodeKind>().or_raise(|| ErrorKind::InvalidData("item kind"))?,
            name: row.name,
            full_path: row.full_path,
            parent_directory: row.parent_directory,
            size: from_size(row.size)?,
            modified_marker: opt_from_json(row.modified_marker.as_deref(), "modified marker")?,
            fingerprint: row.fingerprint,
            data_format: row.data_format.as_deref().map(str::parse).transpose()?,
            dataset: row.dataset_id,
            computed_metadata: opt_from_json(row.computed_metadata.as_deref(), "computed metadata")?,
            analyze_error: opt_from_json(row.analyze_error.as_deref(), "analyze error")?,
        })
    }
}
