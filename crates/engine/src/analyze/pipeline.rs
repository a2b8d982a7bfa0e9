//! Bounded-concurrency analysis of a scan's unanalyzed data items.

use super::{AnalysisFailure, MetadataAnalyzer};
use crate::Context;
use crate::download::proxied_locator;
use crate::scan::error::{Result, cache_failure};
use async_stream::stream;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use geocrawl_cache::{Storage, TreeItem};
use geocrawl_storage::{AdapterHandle, Protocol};

/// What happened to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Metadata computed and stored on both the item and its dataset.
    Analyzed,
    /// The analyzer failed; the failure is stored on the item.
    Broken,
}

/// How many files of `storage` may be analyzed at once.
///
/// The analyzer reads FTP files through sessions of its own, and FTP servers
/// tend to limit concurrent logins per user.
fn concurrency(ctx: &Context, storage: &Storage) -> usize {
    let limit = match storage.remote.protocol() {
        Protocol::Ftp => ctx.settings.ftp_analysis_concurrency,
        Protocol::Sftp | Protocol::Http => ctx.settings.analysis_concurrency,
    };
    limit.max(1)
}

/// Streams one [`Outcome`] per item, in completion order.
///
/// Analysis failures are per item and never end the stream. Failing to store
/// a result does: it yields an error and stops.
pub(crate) fn analyze<'a>(
    ctx: &'a Context,
    analyzer: &'a dyn MetadataAnalyzer,
    adapter: &'a AdapterHandle,
    storage: &'a Storage,
    items: Vec<TreeItem>,
) -> impl Stream<Item = Result<Outcome>> + 'a {
    stream!({
        let concurrency = concurrency(ctx, storage);
        let mut queue = items.into_iter().map(|item| analyze_item(ctx, analyzer, adapter, storage, item));
        let mut processing = FuturesUnordered::new();
        processing.extend(queue.by_ref().take(concurrency));
        while let Some(result) = processing.next().await {
            let failed = result.is_err();
            yield result;
            if failed {
                return;
            }
            // Refill in queue order.
            if let Some(next) = queue.next() {
                processing.push(next);
            }
        }
    })
}

async fn analyze_item(
    ctx: &Context,
    analyzer: &dyn MetadataAnalyzer,
    adapter: &AdapterHandle,
    storage: &Storage,
    item: TreeItem,
) -> Result<Outcome> {
    let analysis = match locator(ctx, adapter, storage, &item) {
        Ok(locator) => {
            tracing::debug!(path = %item.full_path, "Analyzing");
            analyzer.analyze(&locator).await
        },
        Err(err) => Err(AnalysisFailure::Connectivity(err.to_string())),
    };
    match analysis {
        Ok(metadata) => {
            if let Some(dataset) = item.dataset {
                ctx.repo.update_dataset_computed_metadata(dataset, &metadata).await.map_err(cache_failure)?;
            }
            ctx.repo.update_tree_item_computed_metadata(item.id, &metadata).await.map_err(cache_failure)?;
            Ok(Outcome::Analyzed)
        },
        Err(failure) => {
            tracing::warn!(path = %item.full_path, %failure, "Unable to analyze data file");
            ctx.repo.update_tree_item_analyze_error(item.id, &failure.to_record()).await.map_err(cache_failure)?;
            Ok(Outcome::Broken)
        },
    }
}

/// Where the analyzer should read `item` from.
fn locator(
    ctx: &Context,
    adapter: &AdapterHandle,
    storage: &Storage,
    item: &TreeItem,
) -> geocrawl_storage::error::Result<String> {
    match (&ctx.settings.public_url, storage.remote.protocol()) {
        (Some(public_url), Protocol::Http) => Ok(proxied_locator(public_url, storage.id, &item.full_path)),
        _ => adapter.access_locator(&item.full_path),
    }
}
