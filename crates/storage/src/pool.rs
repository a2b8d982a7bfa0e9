//! Adapter reuse across scans and downloads.

use crate::backend::{self, AdapterHandle, AdapterOptions};
use crate::error::Result;
use crate::models::Remote;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Adapters keyed by the hash of their connection parameters.
///
/// Storages that share parameters share an adapter (and so its session and
/// its request limiter). Entries live until [`evict`](Self::evict)ed, which
/// also closes any session the adapter holds.
pub struct AdapterPool {
    options: AdapterOptions,
    adapters: Mutex<HashMap<String, AdapterHandle>>,
}

impl AdapterPool {
    pub fn new(options: AdapterOptions) -> Self {
        Self {
            options,
            adapters: Mutex::new(HashMap::new()),
        }
    }

    /// The pooled adapter for `remote`, building one on first use.
    pub async fn get(&self, remote: &Remote) -> Result<AdapterHandle> {
        let key = remote.hash()?;
        let mut adapters = self.adapters.lock().await;
        if let Some(adapter) = adapters.get(&key) {
            return Ok(adapter.clone());
        }
        let adapter = backend::connect(remote, &self.options)?;
        tracing::debug!(remote = %remote, "Created storage adapter");
        adapters.insert(key, adapter.clone());
        Ok(adapter)
    }

    /// Register a prebuilt adapter for `remote`, replacing any pooled one.
    pub async fn insert(&self, remote: &Remote, adapter: AdapterHandle) -> Result<()> {
        let key = remote.hash()?;
        self.adapters.lock().await.insert(key, adapter);
        Ok(())
    }

    /// Close and forget the adapter for `remote`, if pooled.
    pub async fn evict(&self, remote: &Remote) {
        let Ok(key) = remote.hash() else {
            return;
        };
        let removed = self.adapters.lock().await.remove(&key);
        if let Some(adapter) = removed {
            adapter.disconnect().await;
            tracing::debug!(remote = %remote, "Evicted storage adapter");
        }
    }

    /// Drop every session, but keep the adapters.
    pub async fn disconnect_all(&self) {
        let adapters: Vec<_> = self.adapters.lock().await.values().cloned().collect();
        for adapter in adapters {
            adapter.disconnect().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.adapters.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_same_params_share_adapter() {
        let pool = AdapterPool::new(AdapterOptions::default());
        let a = Remote::from_url("https://data.example.org/pub/").unwrap();
        let b = Remote::from_url("https://data.example.org/pub/").unwrap();
        let c = Remote::from_url("https://data.example.org/other/").unwrap();
        let first = pool.get(&a).await.unwrap();
        assert!(Arc::ptr_eq(&first, &pool.get(&b).await.unwrap()));
        assert!(!Arc::ptr_eq(&first, &pool.get(&c).await.unwrap()));
        assert_eq!(pool.len().await, 2);
        pool.evict(&a).await;
        assert_eq!(pool.len().await, 1);
        assert!(!Arc::ptr_eq(&first, &pool.get(&a).await.unwrap()));
    }
}
