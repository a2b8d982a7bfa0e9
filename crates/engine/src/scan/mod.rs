//! One complete scan of a claimed storage.
//!
//! 1. List the remote tree and flatten it into fingerprinted items.
//! 2. Store the items under the scan id, carrying over cached metadata for
//!    every data file whose fingerprint is already known.
//! 3. Analyze the data files that are left.
//! 4. Record the result and prune the items of every other scan.
//!
//! If anything but a single file's analysis fails, the scan is recorded as
//! failed and the previous snapshot stays exactly as it was.

pub(crate) mod error;
mod failure;

use self::error::{ErrorKind as ScanErrorKind, cache_failure, storage_failure};
use crate::analyze::pipeline::{self, Outcome};
use crate::error::{ErrorKind, Result};
use crate::{Context, tree};
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use geocrawl_cache::{ScanId, ScanProgress, ScanResult, ScanStep, Storage};
use geocrawl_storage::{AdapterHandle, NodeKind};
use std::time::Instant;
use time::OffsetDateTime;
use tracing::instrument;

/// Run the scan `storage` was claimed for, and move it back to idle.
///
/// Returns the storage as left by the scan: with a fresh result on success,
/// or with `scan.last_error` set on failure. Only failing to record either
/// outcome is an error.
#[instrument(skip_all, fields(storage = storage.id))]
pub async fn run_scan(ctx: &Context, storage: &Storage) -> Result<Storage> {
    let scan = storage
        .scan
        .scan_id
        .ok_or_raise(|| ErrorKind::Conflict(format!("storage {} is not processing a scan", storage.id)))?;
    tracing::info!(%scan, remote = %storage.remote, "Scan started");
    let outcome = match ctx.adapters.get(&storage.remote).await {
        Ok(adapter) => {
            let outcome = scan_inner(ctx, storage, scan, &adapter).await;
            // Sessions don't outlive the scan that opened them.
            adapter.disconnect().await;
            outcome
        },
        Err(err) => Err(storage_failure(err, ScanErrorKind::Adapter)),
    };
    match outcome {
        Ok(counts) => {
            let summary = ScanResult {
                last_successful_scan: scan,
                counts,
                duration: elapsed_seconds(scan),
            };
            let finished = ctx
                .repo
                .finish_scan_with_result(storage.id, scan, &summary)
                .await
                .or_raise(|| ErrorKind::Cache)?;
            let pruned = ctx.repo.drop_previous_tree_items(storage.id, scan).await.or_raise(|| ErrorKind::Cache)?;
            tracing::info!(
                files = counts.files,
                directories = counts.directories,
                data_files = counts.data_files,
                analyzed = counts.analyzed_data_files,
                broken = counts.broken_data_files,
                pruned,
                duration = summary.duration,
                "Scan complete"
            );
            Ok(finished)
        },
        Err(err) => {
            tracing::warn!(error = ?err, "Scan failed");
            let record = failure::record(&err);
            ctx.repo
                .finish_scan_with_error(storage.id, scan, &record)
                .await
                .or_raise(|| ErrorKind::Scan)
        },
    }
}

async fn scan_inner(
    ctx: &Context,
    storage: &Storage,
    scan: ScanId,
    adapter: &AdapterHandle,
) -> error::Result<ScanProgress> {
    let mut progress = ScanProgress::default();
    heartbeat(ctx, storage, scan, ScanStep::Listing, &progress).await?;

    let root = adapter
        .list_tree(adapter.root())
        .await
        .map_err(|e| storage_failure(e, ScanErrorKind::Listing))?;
    let items = tree::flatten(&root);
    let saved = ctx.repo.save_tree_items(storage.id, scan, &items).await.map_err(cache_failure)?;

    progress.files = saved.iter().filter(|i| i.kind == NodeKind::File).count() as u64;
    progress.directories = saved.iter().filter(|i| i.kind == NodeKind::Directory).count() as u64;
    let (data, pending): (Vec<_>, Vec<_>) = saved
        .into_iter()
        .filter(|i| i.data_format.is_some())
        .partition(|i| i.computed_metadata.is_some());
    progress.data_files = (data.len() + pending.len()) as u64;
    progress.not_modified_data_files = data.len() as u64;
    heartbeat(ctx, storage, scan, ScanStep::Analyzing, &progress).await?;
    if pending.is_empty() {
        return Ok(progress);
    }

    let analyzer = ctx.analyzer.as_deref().ok_or_raise(|| ScanErrorKind::NoAnalyzer)?;
    let mut last_beat = Instant::now();
    let outcomes = pipeline::analyze(ctx, analyzer, adapter, storage, pending);
    futures::pin_mut!(outcomes);
    while let Some(outcome) = outcomes.next().await {
        match outcome? {
            Outcome::Analyzed => progress.analyzed_data_files += 1,
            Outcome::Broken => progress.broken_data_files += 1,
        }
        if last_beat.elapsed() >= ctx.settings.heartbeat_interval {
            heartbeat(ctx, storage, scan, ScanStep::Analyzing, &progress).await?;
            last_beat = Instant::now();
        }
    }
    heartbeat(ctx, storage, scan, ScanStep::Analyzing, &progress).await?;
    Ok(progress)
}

async fn heartbeat(ctx: &Context, storage: &Storage, scan: ScanId, step: ScanStep, progress: &ScanProgress) -> error::Result<()> {
    ctx.repo.progress_scan(storage.id, scan, step, progress).await.map_err(cache_failure)?;
    Ok(())
}

fn elapsed_seconds(scan: ScanId) -> u64 {
    match scan.started_at() {
        Ok(started) => (OffsetDateTime::now_utc() - started).as_seconds_f64().round().max(0.0) as u64,
        Err(_) => 0,
    }
}
