//! Fixtures shared by the engine's tests.

use crate::analyze::{AnalysisFailure, MetadataAnalyzer};
use crate::{Context, Settings, catalog, scan};
use async_trait::async_trait;
use geocrawl_cache::{Database, Repository, Storage};
use geocrawl_storage::backend::{MockAdapter, StorageAdapter};
use geocrawl_storage::{AdapterOptions, AdapterPool, Protocol, Remote};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Analyzes anything, except locators containing `broken`.
#[derive(Default)]
pub(crate) struct ScriptedAnalyzer {
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl ScriptedAnalyzer {
    /// Every locator analyzed so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetadataAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, locator: &str) -> Result<Value, AnalysisFailure> {
        self.calls.lock().unwrap().push(locator.to_string());
        if self.offline.load(Ordering::SeqCst) {
            return Err(AnalysisFailure::Connectivity("analyzer is offline".into()));
        }
        if locator.contains("broken") {
            return Err(AnalysisFailure::NotRaster(format!("{locator} is not a raster")));
        }
        Ok(json!({ "locator": locator, "bands": 3 }))
    }
}

/// Holds every call until the test lets it through, tracking how many calls
/// are waiting at once.
pub(crate) struct GatedAnalyzer {
    gate: Semaphore,
    released: AtomicUsize,
    passed: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl GatedAnalyzer {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            released: AtomicUsize::new(0),
            passed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Most calls ever in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Let one waiting (or future) call complete.
    pub fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.gate.add_permits(1);
    }

    /// Wait until every released call got through and exactly `count` calls
    /// are held at the gate.
    pub async fn wait_for(&self, count: usize) {
        let settled = || self.passed.load(Ordering::SeqCst) == self.released.load(Ordering::SeqCst);
        let waiting = async {
            while !settled() || self.in_flight() != count {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        };
        if tokio::time::timeout(Duration::from_secs(5), waiting).await.is_err() {
            panic!("expected {count} analyzer calls in flight, found {}", self.in_flight());
        }
    }
}

#[async_trait]
impl MetadataAnalyzer for GatedAnalyzer {
    async fn analyze(&self, locator: &str) -> Result<Value, AnalysisFailure> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(in_flight, Ordering::SeqCst);
        let permit = self.gate.acquire().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.passed.fetch_add(1, Ordering::SeqCst);
        match permit {
            Ok(permit) => {
                permit.forget();
                Ok(json!({ "locator": locator }))
            },
            Err(_) => Err(AnalysisFailure::Connectivity("gate closed".into())),
        }
    }
}

/// A context over a fresh in-memory database, without an analyzer.
pub(crate) async fn context() -> Context {
    let db = Database::connect_in_memory().await.unwrap();
    let settings = Settings {
        poll_interval: std::time::Duration::from_millis(10),
        ..Settings::default()
    };
    Context::new(Repository::from(&db), AdapterPool::new(AdapterOptions::default()), settings)
}

pub(crate) async fn context_with(analyzer: Arc<ScriptedAnalyzer>) -> Context {
    context().await.with_analyzer(analyzer)
}

/// Pool `adapter` as the adapter of the remote at `url`.
pub(crate) async fn register_mock(ctx: &Context, url: &str, adapter: impl Into<Arc<MockAdapter>>) -> Remote {
    let remote = Remote::from_url(url).unwrap();
    let adapter: Arc<MockAdapter> = adapter.into();
    ctx.adapters.insert(&remote, adapter).await.unwrap();
    remote
}

pub(crate) fn mock_url(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Ftp => "ftp://mock.example.org/",
        Protocol::Sftp => "sftp://user@mock.example.org/",
        Protocol::Http => "https://mock.example.org/",
    }
}

/// Claim the oldest pending scan and run it.
pub(crate) async fn run_next(ctx: &Context) -> Storage {
    let claimed = ctx.repo.start_next_scan().await.unwrap().unwrap();
    scan::run_scan(ctx, &claimed).await.unwrap()
}

/// A storage over `adapter` that has been scanned once, successfully.
pub(crate) async fn scanned_storage(adapter: MockAdapter) -> (Context, Storage, Arc<MockAdapter>) {
    let ctx = context_with(Arc::new(ScriptedAnalyzer::default())).await;
    let adapter = Arc::new(adapter);
    let remote = register_mock(&ctx, mock_url(adapter.protocol()), adapter.clone()).await;
    catalog::create_storage(&ctx, &remote).await.unwrap();
    let storage = run_next(&ctx).await;
    assert!(storage.scan.last_error.is_none(), "{:?}", storage.scan.last_error);
    (ctx, storage, adapter)
}
