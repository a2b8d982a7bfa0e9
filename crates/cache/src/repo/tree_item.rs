use super::Repository;
use crate::error::{ErrorKind, Result};
use crate::models::{
    Dataset, DatasetRow, ErrorRecord, NewTreeItem, ScanId, StorageId, TreeItem, TreeItemRow, opt_to_json, to_json,
    to_size,
};
use exn::ResultExt;

impl Repository {
    // =========================================================================
    // Insert
    // =========================================================================

    /// Store the items of one scan, in order, in a single transaction.
    ///
    /// Every item with a data format gets its dataset upserted by
    /// `(storage, fingerprint)`. When that dataset already carries computed
    /// metadata, the item gets a copy of it, which is how unchanged files
    /// avoid being analyzed again.
    pub async fn save_tree_items(&self, storage: StorageId, scan: ScanId, items: &[NewTreeItem]) -> Result<Vec<TreeItem>> {
        let mut saved = Vec::with_capacity(items.len());
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for (position, item) in items.iter().enumerate() {
            let size = to_size(item.size)?;
            let modified = opt_to_json(item.modified.as_ref(), "modified marker")?;
            let mut dataset = None;
            let mut computed_metadata = None;
            if let (Some(format), Some(fingerprint)) = (item.data_format, &item.fingerprint) {
                let (id, metadata): (i64, Option<String>) = sqlx::query_as(include_str!("../../queries/upsert_dataset.sql"))
                    .bind(storage)
                    .bind(fingerprint)
                    .bind(format.as_str())
                    .bind(&item.name)
                    .bind(&item.full_path)
                    .bind(size)
                    .bind(&modified)
                    .bind(scan.as_millis())
                    .fetch_one(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                dataset = Some(id);
                computed_metadata = metadata;
            }
            let position = i64::try_from(position).or_raise(|| ErrorKind::InvalidData("position"))?;
            let row: TreeItemRow = sqlx::query_as(include_str!("../../queries/insert_tree_item.sql"))
                .bind(storage)
                .bind(scan.as_millis())
                .bind(position)
                .bind(item.kind.as_str())
                .bind(&item.name)
                .bind(&item.full_path)
                .bind(&item.parent_directory)
                .bind(size)
                .bind(&modified)
                .bind(&item.fingerprint)
                .bind(item.data_format.map(|f| f.as_str()))
                .bind(dataset)
                .bind(computed_metadata)
                .fetch_one(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            saved.push(TreeItem::try_from(row)?);
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::debug!(storage, %scan, items = saved.len(), "Saved tree items");
        Ok(saved)
    }

    // =========================================================================
    // Update
    // =========================================================================

    pub async fn update_tree_item_computed_metadata(&self, item: i64, metadata: &serde_json::Value) -> Result<()> {
        sqlx::query(include_str!("../../queries/update_tree_item_computed_metadata.sql"))
            .bind(to_json(metadata, "computed metadata")?)
            .bind(item)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn update_tree_item_analyze_error(&self, item: i64, error: &ErrorRecord) -> Result<()> {
        sqlx::query(include_str!("../../queries/update_tree_item_analyze_error.sql"))
            .bind(to_json(error, "analyze error")?)
            .bind(item)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn update_dataset_computed_metadata(&self, dataset: i64, metadata: &serde_json::Value) -> Result<()> {
        sqlx::query(include_str!("../../queries/update_dataset_computed_metadata.sql"))
            .bind(to_json(metadata, "computed metadata")?)
            .bind(dataset)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Prune every item of `storage` that does not belong to `scan`.
    ///
    /// Returns the number of items removed.
    pub async fn drop_previous_tree_items(&self, storage: StorageId, scan: ScanId) -> Result<u64> {
        let result = sqlx::query(include_str!("../../queries/drop_previous_tree_items.sql"))
            .bind(storage)
            .bind(scan.as_millis())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    pub async fn list_tree_items(&self, storage: StorageId, scan: ScanId) -> Result<Vec<TreeItem>> {
        let rows: Vec<TreeItemRow> = sqlx::query_as(include_str!("../../queries/list_tree_items.sql"))
            .bind(storage)
            .bind(scan.as_millis())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TreeItem::try_from).collect()
    }

    /// Items of one scan that carry a data format.
    pub async fn find_data_items_by_scan(&self, storage: StorageId, scan: ScanId) -> Result<Vec<TreeItem>> {
        let rows: Vec<TreeItemRow> = sqlx::query_as(include_str!("../../queries/find_data_items_by_scan.sql"))
            .bind(storage)
            .bind(scan.as_millis())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(TreeItem::try_from).collect()
    }

    /// The file at `full_path` as seen by `scan`. Directories never match.
    pub async fn find_file_by_path(&self, storage: StorageId, scan: ScanId, full_path: &str) -> Result<Option<TreeItem>> {
        let row: Option<TreeItemRow> = sqlx::query_as(include_str!("../../queries/find_file_by_path.sql"))
            .bind(storage)
            .bind(scan.as_millis())
            .bind(full_path)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(TreeItem::try_from).transpose()
    }

    /// Number of items stored for `storage`, across all scans.
    pub async fn count_tree_items(&self, storage: StorageId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../../queries/count_tree_items.sql"))
            .bind(storage)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("count"))
    }

    pub async fn get_dataset(&self, id: i64) -> Result<Option<Dataset>> {
        let row: Option<DatasetRow> = sqlx::query_as(include_str!("../../queries/get_dataset.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Dataset::try_from).transpose()
    }
}
