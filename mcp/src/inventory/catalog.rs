//! Per-backend tool catalog cache.
//!
//! Each backend's catalog is fetched at most once per launch signature:
//! from memory if already fetched, else from the disk cache if the persisted
//! signature matches, else live from the backend. A backend that fails to
//! answer is recorded as having no tools until it is refreshed.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    store::DiskCacheStore,
    types::{BackendCatalogCache, CatalogEntry, PersistedCacheRecord},
};
use crate::{
    core::{config::BackendSpec, pool::McpConnectionPool, signature::signature},
    error::McpResult,
};

pub struct CatalogCache {
    caches: DashMap<String, BackendCatalogCache>,
    /// Serializes fetches per backend so a catalog is only fetched once
    gates: DashMap<String, Arc<Mutex<()>>>,
    store: DiskCacheStore,
    pool: Arc<McpConnectionPool>,
    /// Bumped on every catalog change; the name index keys off it
    generation: AtomicU64,
}

impl CatalogCache {
    pub fn new(store: DiskCacheStore, pool: Arc<McpConnectionPool>) -> Self {
        Self {
            caches: DashMap::new(),
            gates: DashMap::new(),
            store,
            pool,
            generation: AtomicU64::new(0),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &DiskCacheStore {
        &self.store
    }

    pub fn is_fetched(&self, name: &str) -> bool {
        self.caches.get(name).is_some_and(|c| c.fetched)
    }

    /// Cached entries for `name` without fetching.
    pub fn snapshot(&self, name: &str) -> Option<Vec<CatalogEntry>> {
        self.caches
            .get(name)
            .filter(|c| c.fetched)
            .map(|c| c.entries.clone())
    }

    pub fn fetched_count(&self) -> usize {
        self.caches.iter().filter(|c| c.fetched).count()
    }

    fn gate(&self, name: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.gates
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    fn fresh_entries(&self, name: &str, signature: &str) -> Option<Vec<CatalogEntry>> {
        self.caches
            .get(name)
            .filter(|c| c.is_fresh(signature))
            .map(|c| c.entries.clone())
    }

    fn install(&self, name: &str, cache: BackendCatalogCache) {
        self.caches.insert(name.to_string(), cache);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Catalog of `name` under its current launch config. Never fails: a
    /// backend that cannot be reached yields an empty catalog.
    pub async fn fetch(&self, name: &str, spec: &BackendSpec) -> Vec<CatalogEntry> {
        let current = signature(Some(spec));
        if let Some(entries) = self.fresh_entries(name, &current) {
            return entries;
        }

        let gate = self.gate(name);
        let _guard = gate.lock().await;
        if let Some(entries) = self.fresh_entries(name, &current) {
            return entries;
        }

        let drifted = self
            .caches
            .get(name)
            .and_then(|c| c.signature.clone())
            .is_some_and(|recorded| recorded != current);
        if drifted {
            info!("Launch config for '{}' changed, discarding its catalog", name);
            self.drop_backend_state(name).await;
        }

        if let Some(record) = self.store.load(name).await {
            if record.is_reusable(&current) {
                debug!(
                    "Loaded {} tools for '{}' from catalog cache",
                    record.entries.len(),
                    name
                );
                let entries = adopt_entries(name, record.entries);
                self.install(
                    name,
                    BackendCatalogCache::fetched_under(current, entries.clone()),
                );
                return entries;
            }
            if record.failed && record.signature == current {
                info!("Last fetch from '{}' failed, retrying live", name);
            } else {
                info!("Persisted catalog for '{}' is stale, discarding", name);
                if let Err(e) = self.store.invalidate(name).await {
                    warn!("Failed to remove stale catalog cache for '{}': {}", name, e);
                }
            }
        }

        let (entries, record) = match self.fetch_live(name, spec).await {
            Ok(entries) => {
                info!("Discovered {} tools from '{}'", entries.len(), name);
                let record = PersistedCacheRecord::new(current.clone(), entries.clone());
                (entries, record)
            }
            Err(e) => {
                warn!(
                    "Failed to list tools from '{}': {} - treating as empty",
                    name, e
                );
                (Vec::new(), PersistedCacheRecord::failed(current.clone()))
            }
        };

        self.install(
            name,
            BackendCatalogCache::fetched_under(current, entries.clone()),
        );
        if let Err(e) = self.store.store(name, &record).await {
            warn!("Failed to persist catalog for '{}': {}", name, e);
        }
        entries
    }

    /// Drop every cached view of `name` and fetch it live again.
    pub async fn refresh(&self, name: &str, spec: &BackendSpec) -> Vec<CatalogEntry> {
        {
            let gate = self.gate(name);
            let _guard = gate.lock().await;
            self.drop_backend_state(name).await;
        }
        self.fetch(name, spec).await
    }

    async fn fetch_live(&self, name: &str, spec: &BackendSpec) -> McpResult<Vec<CatalogEntry>> {
        let session = self.pool.acquire(name, spec).await?;
        let tools = session.list_tools().await?;
        Ok(tools
            .iter()
            .map(|tool| CatalogEntry::from_tool(name, tool))
            .collect())
    }

    /// Close the session, delete the persisted record and forget the catalog.
    async fn drop_backend_state(&self, name: &str) {
        if let Err(e) = self.pool.release(name).await {
            warn!("Failed to close session for '{}': {}", name, e);
        }
        if let Err(e) = self.store.invalidate(name).await {
            warn!("Failed to remove catalog cache for '{}': {}", name, e);
        }
        if self.caches.remove(name).is_some() {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Persisted entries are owned by `name` and carry native names.
fn adopt_entries(name: &str, entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
    entries
        .into_iter()
        .map(|mut entry| {
            entry.name = entry.native_name.clone();
            entry.source = name.to_string();
            entry
        })
        .collect()
}
