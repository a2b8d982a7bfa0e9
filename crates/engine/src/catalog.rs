//! Storage management: everything a caller does to storages outside of a
//! running scan.

use crate::Context;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use geocrawl_cache::error::ErrorKind as CacheErrorKind;
use geocrawl_cache::{Storage, StorageCreation, StorageId, TreeItem};
use geocrawl_storage::Remote;
use tracing::instrument;

fn cache_error(err: geocrawl_cache::error::Error) -> crate::error::Error {
    let kind = match &*err {
        CacheErrorKind::NotFound(what) => ErrorKind::NotFound(what.clone()),
        CacheErrorKind::Conflict(why) => ErrorKind::Conflict(why.clone()),
        _ => ErrorKind::Cache,
    };
    err.raise(kind)
}

/// Register `remote` and queue its first scan.
///
/// A storage with the same protocol and parameters is returned as is, without
/// contacting the remote. A new one is only stored once the remote has
/// answered.
#[instrument(skip_all, fields(remote = %remote))]
pub async fn create_storage(ctx: &Context, remote: &Remote) -> Result<StorageCreation> {
    if let Some(existing) = ctx.repo.find_storage(remote).await.map_err(cache_error)? {
        tracing::debug!(storage = existing.id, "Storage already registered");
        return Ok(StorageCreation::Existing(existing));
    }
    check_connectivity(ctx, remote).await?;
    match ctx.repo.create_storage(remote).await.map_err(cache_error)? {
        StorageCreation::Created(storage) => {
            let queued = ctx.repo.ask_for_scan(storage.id).await.map_err(cache_error)?;
            Ok(StorageCreation::Created(queued))
        },
        // Lost a race with another caller registering the same remote.
        existing @ StorageCreation::Existing(_) => Ok(existing),
    }
}

/// Connect to `remote` and ask it for its root, without storing anything.
///
/// The session is closed afterwards; after a failure the adapter is dropped
/// from the pool altogether.
#[instrument(skip_all, fields(remote = %remote))]
pub async fn check_connectivity(ctx: &Context, remote: &Remote) -> Result<()> {
    let adapter = ctx.adapters.get(remote).await.or_raise(|| ErrorKind::InvalidRemote(remote.to_string()))?;
    let checked = adapter.check_connectivity().await;
    adapter.disconnect().await;
    if let Err(err) = checked {
        ctx.adapters.evict(remote).await;
        return Err(err.raise(ErrorKind::Unreachable));
    }
    tracing::info!("Remote is reachable");
    Ok(())
}

pub async fn get_storage(ctx: &Context, id: StorageId) -> Result<Storage> {
    ctx.repo
        .get_storage(id)
        .await
        .map_err(cache_error)?
        .ok_or_raise(|| ErrorKind::NotFound(format!("storage {id}")))
}

pub async fn list_storages(ctx: &Context) -> Result<Vec<Storage>> {
    ctx.repo.list_storages().await.map_err(cache_error)
}

/// Queue another scan. Fails with a conflict unless the storage is idle.
#[instrument(skip(ctx))]
pub async fn rescan(ctx: &Context, id: StorageId) -> Result<Storage> {
    let storage = ctx.repo.ask_for_scan(id).await.map_err(cache_error)?;
    tracing::info!("Scan queued");
    Ok(storage)
}

/// Data items of the current snapshot; empty until a scan has succeeded.
pub async fn data_items(ctx: &Context, id: StorageId) -> Result<Vec<TreeItem>> {
    let storage = get_storage(ctx, id).await?;
    let Some(scan) = storage.last_successful_scan() else {
        return Ok(Vec::new());
    };
    ctx.repo.find_data_items_by_scan(id, scan).await.map_err(cache_error)
}

/// Delete a storage with its items and datasets, and close its sessions.
#[instrument(skip(ctx))]
pub async fn remove_storage(ctx: &Context, id: StorageId) -> Result<()> {
    let storage = get_storage(ctx, id).await?;
    if !ctx.repo.delete_storage(id).await.map_err(cache_error)? {
        exn::bail!(ErrorKind::NotFound(format!("storage {id}")));
    }
    ctx.adapters.evict(&storage.remote).await;
    tracing::info!("Storage removed");
    Ok(())
}

/// The file at `path` in the current snapshot of storage `id`.
///
/// Directories, paths no successful scan has listed, and every path of a
/// storage that was never successfully scanned are not found.
pub async fn resolve_file(ctx: &Context, id: StorageId, path: &str) -> Result<(Storage, TreeItem)> {
    let storage = get_storage(ctx, id).await?;
    let not_found = || ErrorKind::NotFound(format!("{path} on storage {id}"));
    let scan = storage.last_successful_scan().ok_or_raise(not_found)?;
    let item = ctx
        .repo
        .find_file_by_path(id, scan, path)
        .await
        .map_err(cache_error)?
        .ok_or_raise(not_found)?;
    Ok((storage, item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use geocrawl_cache::{DataFormat, ScanStatus};
    use geocrawl_storage::Protocol;
    use geocrawl_storage::backend::MockAdapter;

    #[tokio::test]
    async fn test_create_storage_queues_scan_once() {
        let ctx = testing::context().await;
        let remote = testing::register_mock(&ctx, "ftp://ftp.example.org/pub", MockAdapter::new(Protocol::Ftp)).await;
        let created = create_storage(&ctx, &remote).await.unwrap();
        assert!(created.is_new());
        let storage = created.into_inner();
        assert_eq!(storage.scan.status, ScanStatus::Pending);
        assert!(storage.scan.queued_at.is_some());

        let again = create_storage(&ctx, &remote).await.unwrap();
        assert!(!again.is_new());
        assert_eq!(again.into_inner().id, storage.id);
        assert_eq!(list_storages(&ctx).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_storage_unreachable() {
        let ctx = testing::context().await;
        // Nothing listens on the discard port.
        let remote = Remote::from_url("ftp://127.0.0.1:9/").unwrap();
        let err = create_storage(&ctx, &remote).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Unreachable);
        assert!(list_storages(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rescan_conflict() {
        let ctx = testing::context().await;
        let remote = testing::register_mock(&ctx, "sftp://u@h/", MockAdapter::new(Protocol::Sftp)).await;
        let storage = create_storage(&ctx, &remote).await.unwrap().into_inner();
        let err = rescan(&ctx, storage.id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Conflict(_)));
        let err = rescan(&ctx, storage.id + 1).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_data_items_and_resolve_file() {
        let adapter = MockAdapter::new(Protocol::Ftp)
            .with_file("/data/a.jp2", &[0u8; 100], "v1")
            .with_file("/b.txt", b"hello", "v1");
        let (ctx, storage, _) = testing::scanned_storage(adapter).await;

        let items = data_items(&ctx, storage.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].full_path, "/data/a.jp2");
        assert_eq!(items[0].data_format, Some(DataFormat::Jpeg2000));

        let (_, item) = resolve_file(&ctx, storage.id, "/b.txt").await.unwrap();
        assert_eq!(item.size, Some(5));
        assert!(resolve_file(&ctx, storage.id, "/data/").await.is_err());
        assert!(resolve_file(&ctx, storage.id, "/c.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_data_items_before_first_scan() {
        let ctx = testing::context().await;
        let remote = testing::register_mock(&ctx, "ftp://ftp.example.org/", MockAdapter::new(Protocol::Ftp)).await;
        let storage = create_storage(&ctx, &remote).await.unwrap().into_inner();
        assert!(data_items(&ctx, storage.id).await.unwrap().is_empty());
        let err = resolve_file(&ctx, storage.id, "/a.jp2").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_storage() {
        let adapter = MockAdapter::new(Protocol::Ftp).with_file("/a.tif", b"tif", "v1");
        let (ctx, storage, _) = testing::scanned_storage(adapter).await;
        remove_storage(&ctx, storage.id).await.unwrap();
        assert!(ctx.adapters.is_empty().await);
        assert_eq!(ctx.repo.count_tree_items(storage.id).await.unwrap(), 0);
        let err = remove_storage(&ctx, storage.id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }
}
