use super::{Repository, StorageCreation};
use crate::error::{ErrorKind, Result};
use crate::models::{
    ErrorRecord, ScanId, ScanProgress, ScanResult, ScanStep, Storage, StorageId, StorageRow, remote_columns, to_json,
    to_millis,
};
use exn::ResultExt;
use geocrawl_storage::Remote;
use time::OffsetDateTime;

impl Repository {
    // =========================================================================
    // Storages
    // =========================================================================

    /// Store a new storage, unless one with the same protocol and parameters
    /// exists already, in which case that one is returned.
    pub async fn create_storage(&self, remote: &Remote) -> Result<StorageCreation> {
        let hash = remote.hash().or_raise(|| ErrorKind::InvalidData("storage params"))?;
        let (protocol, params) = remote_columns(remote)?;
        let created: Option<StorageRow> = sqlx::query_as(include_str!("../../queries/insert_storage.sql"))
            .bind(&hash)
            .bind(protocol)
            .bind(params)
            .bind(to_millis(OffsetDateTime::now_utc()))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if let Some(row) = created {
            let storage = Storage::try_from(row)?;
            tracing::info!(storage = storage.id, remote = %remote, "Created storage");
            return Ok(StorageCreation::Created(storage));
        }
        let existing: StorageRow = sqlx::query_as(include_str!("../../queries/get_storage_by_hash.sql"))
            .bind(&hash)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(StorageCreation::Existing(existing.try_into()?))
    }

    pub async fn get_storage(&self, id: StorageId) -> Result<Option<Storage>> {
        let row: Option<StorageRow> = sqlx::query_as(include_str!("../../queries/get_storage.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Storage::try_from).transpose()
    }

    /// The storage with the same protocol and parameters as `remote`, if any.
    pub async fn find_storage(&self, remote: &Remote) -> Result<Option<Storage>> {
        let hash = remote.hash().or_raise(|| ErrorKind::InvalidData("storage params"))?;
        let row: Option<StorageRow> = sqlx::query_as(include_str!("../../queries/get_storage_by_hash.sql"))
            .bind(&hash)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Storage::try_from).transpose()
    }

    pub async fn list_storages(&self) -> Result<Vec<Storage>> {
        let rows: Vec<StorageRow> = sqlx::query_as(include_str!("../../queries/list_storages.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Storage::try_from).collect()
    }

    /// Delete a storage along with its tree items and datasets.
    ///
    /// Returns `false` if there was no such storage.
    pub async fn delete_storage(&self, id: StorageId) -> Result<bool> {
        let result = sqlx::query(include_str!("../../queries/delete_storage.sql"))
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Scan lifecycle
    // =========================================================================

    /// `idle → pending`.
    ///
    /// Fails with [`ErrorKind::Conflict`] if a scan is already pending or
    /// running.
    pub async fn ask_for_scan(&self, id: StorageId) -> Result<Storage> {
        self.ask_for_scan_at(id, OffsetDateTime::now_utc()).await
    }

    /// [`ask_for_scan`](Self::ask_for_scan) with an explicit queue time.
    pub async fn ask_for_scan_at(&self, id: StorageId, queued_at: OffsetDateTime) -> Result<Storage> {
        let row: Option<StorageRow> = sqlx::query_as(include_str!("../../queries/ask_for_scan.sql"))
            .bind(to_millis(queued_at))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        match row {
            Some(row) => {
                tracing::debug!(storage = id, "Scan requested");
                row.try_into()
            },
            None => self.reject(id, "ask for a scan").await,
        }
    }

    /// `pending → processing` for the storage that has been queued longest,
    /// if any.
    ///
    /// The returned storage carries the id of the claimed scan in
    /// [`ScanState::scan_id`](crate::ScanState::scan_id).
    pub async fn start_next_scan(&self) -> Result<Option<Storage>> {
        self.start_next_scan_at(OffsetDateTime::now_utc()).await
    }

    /// [`start_next_scan`](Self::start_next_scan) with an explicit claim time.
    pub async fn start_next_scan_at(&self, now: OffsetDateTime) -> Result<Option<Storage>> {
        let row: Option<StorageRow> = sqlx::query_as(include_str!("../../queries/start_next_scan.sql"))
            .bind(to_millis(now))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Storage::try_from).transpose()
    }

    /// Heartbeat of a running scan: records the step and counters.
    ///
    /// Fails with [`ErrorKind::Conflict`] if the storage is no longer running
    /// that scan.
    pub async fn progress_scan(
        &self,
        id: StorageId,
        scan: ScanId,
        step: ScanStep,
        progress: &ScanProgress,
    ) -> Result<Storage> {
        let row: Option<StorageRow> = sqlx::query_as(include_str!("../../queries/progress_scan.sql"))
            .bind(step.as_str())
            .bind(to_json(progress, "scan progress")?)
            .bind(to_millis(OffsetDateTime::now_utc()))
            .bind(id)
            .bind(scan.as_millis())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        match row {
            Some(row) => row.try_into(),
            None => self.reject(id, "record scan progress").await,
        }
    }

    /// `processing → idle`, recording the result.
    pub async fn finish_scan_with_result(&self, id: StorageId, scan: ScanId, result: &ScanResult) -> Result<Storage> {
        let row: Option<StorageRow> = sqlx::query_as(include_str!("../../queries/finish_scan_with_result.sql"))
            .bind(to_json(result, "scan result")?)
            .bind(id)
            .bind(scan.as_millis())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        match row {
            Some(row) => row.try_into(),
            None => self.reject(id, "finish the scan").await,
        }
    }

    /// `processing → idle`, recording the error. The previous result stays.
    pub async fn finish_scan_with_error(&self, id: StorageId, scan: ScanId, error: &ErrorRecord) -> Result<Storage> {
        let row: Option<StorageRow> = sqlx::query_as(include_str!("../../queries/finish_scan_with_error.sql"))
            .bind(to_json(error, "scan error")?)
            .bind(id)
            .bind(scan.as_millis())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        match row {
            Some(row) => row.try_into(),
            None => self.reject(id, "fail the scan").await,
        }
    }
}
