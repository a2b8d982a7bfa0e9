//! The scan worker: one global loop running at most one scan at a time.
//!
//! Scans are claimed oldest-queued first across every storage. Claiming is a
//! conditional update, so running several worker processes against one
//! database is safe, if pointless.

use crate::error::{ErrorKind, Result};
use crate::{Context, catalog, scan};
use exn::ResultExt;
use geocrawl_cache::{Storage, StorageId};
use geocrawl_storage::Protocol;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Claim the oldest pending scan and run it to completion.
///
/// Returns the storage as the scan left it, or `None` if nothing was queued.
pub async fn run_once(ctx: &Context) -> Result<Option<Storage>> {
    let Some(claimed) = ctx.repo.start_next_scan().await.or_raise(|| ErrorKind::Cache)? else {
        return Ok(None);
    };
    scan::run_scan(ctx, &claimed).await.map(Some)
}

/// HTTP storages the analyzer reads straight from their origin, because no
/// public URL is configured to proxy them through.
async fn unproxied_http_storages(ctx: &Context) -> Result<Vec<StorageId>> {
    if ctx.settings.public_url.is_some() {
        return Ok(Vec::new());
    }
    let storages = catalog::list_storages(ctx).await?;
    Ok(storages
        .into_iter()
        .filter(|storage| storage.remote.protocol() == Protocol::Http)
        .map(|storage| storage.id)
        .collect())
}

/// Run scans until `shutdown` is cancelled.
///
/// Cancellation is only observed between scans: a scan that has started
/// always runs to success or failure.
#[instrument(skip_all)]
pub async fn run(ctx: &Context, shutdown: CancellationToken) {
    tracing::info!(poll_interval = ?ctx.settings.poll_interval, "Worker started");
    match unproxied_http_storages(ctx).await {
        Ok(storages) if !storages.is_empty() => tracing::warn!(
            ?storages,
            "server.public_url is not set; HTTP files are analyzed from their origin URL"
        ),
        Ok(_) => {},
        Err(err) => tracing::warn!(error = ?err, "Unable to list storages"),
    }
    while !shutdown.is_cancelled() {
        match run_once(ctx).await {
            // More may be queued already.
            Ok(Some(_)) => continue,
            Ok(None) => {},
            Err(err) => tracing::error!(error = ?err, "Unable to run scan"),
        }
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(ctx.settings.poll_interval) => {},
        }
    }
    ctx.adapters.disconnect_all().await;
    tracing::info!("Worker stopped");
}
