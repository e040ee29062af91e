//! Global public-name index with collision resolution.
//!
//! Built from one snapshot of every fetched backend catalog:
//! - Names owned by a single backend are published as-is
//! - Names owned by several backends are all published as `backend__name`
//!
//! The index remembers the catalog generation it was built from and is
//! stale as soon as any backend catalog changes.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::types::{prefixed_name, CatalogEntry};

/// Rename colliding entries in place. Every pass starts from native names,
/// so earlier renames never leak into a later resolution.
pub fn resolve_collisions(entries: &mut [CatalogEntry]) {
    let mut owners: HashMap<&str, HashSet<&str>> = HashMap::new();
    for entry in entries.iter() {
        owners
            .entry(entry.native_name.as_str())
            .or_default()
            .insert(entry.source.as_str());
    }

    let colliding: HashSet<String> = owners
        .into_iter()
        .filter(|(_, sources)| sources.len() > 1)
        .map(|(name, sources)| {
            let mut sources: Vec<&str> = sources.into_iter().collect();
            sources.sort_unstable();
            debug!("Tool name collision: '{}' exposed by {:?}", name, sources);
            name.to_string()
        })
        .collect();

    for entry in entries.iter_mut() {
        entry.name = if colliding.contains(&entry.native_name) {
            prefixed_name(&entry.source, &entry.native_name)
        } else {
            entry.native_name.clone()
        };
    }
}

struct ResolvedCatalog {
    generation: u64,
    entries: Vec<CatalogEntry>,
    /// public name -> position in `entries`
    by_name: HashMap<String, usize>,
    /// (backend, native name) -> public name
    public_names: HashMap<(String, String), String>,
}

impl ResolvedCatalog {
    fn build(mut entries: Vec<CatalogEntry>, generation: u64) -> Self {
        resolve_collisions(&mut entries);

        let mut by_name = HashMap::with_capacity(entries.len());
        let mut public_names = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            // A composed `a__x` can still meet a native `a__x` elsewhere:
            // the entry registered last (backend name order) wins.
            if let Some(previous) = by_name.insert(entry.name.clone(), position) {
                let previous: &CatalogEntry = &entries[previous];
                if previous.source != entry.source {
                    warn!(
                        "Public name '{}' claimed by '{}' and '{}', routing to '{}'",
                        entry.name, previous.source, entry.source, entry.source
                    );
                }
            }
            public_names.insert(
                (entry.source.clone(), entry.native_name.clone()),
                entry.name.clone(),
            );
        }

        Self {
            generation,
            entries,
            by_name,
            public_names,
        }
    }
}

#[derive(Default)]
pub struct GlobalNameIndex {
    inner: RwLock<Option<ResolvedCatalog>>,
}

impl GlobalNameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// True unless the index was built from catalog generation `generation`.
    pub fn is_stale(&self, generation: u64) -> bool {
        self.inner
            .read()
            .as_ref()
            .map_or(true, |resolved| resolved.generation != generation)
    }

    /// Resolve collisions over `snapshot` and replace the index.
    /// Returns the resolved entries.
    pub fn rebuild(&self, snapshot: Vec<CatalogEntry>, generation: u64) -> Vec<CatalogEntry> {
        let resolved = ResolvedCatalog::build(snapshot, generation);
        let entries = resolved.entries.clone();
        debug!(
            "Rebuilt tool index: {} entries, {} public names",
            entries.len(),
            resolved.by_name.len()
        );
        *self.inner.write() = Some(resolved);
        entries
    }

    pub fn invalidate(&self) {
        self.inner.write().take();
    }

    /// Resolved entries if the index is fresh for `generation`.
    pub fn entries(&self, generation: u64) -> Option<Vec<CatalogEntry>> {
        self.fresh(generation, |resolved| resolved.entries.clone())
    }

    /// Entry published under `public_name`, if the index is fresh.
    pub fn entry(&self, public_name: &str, generation: u64) -> Option<CatalogEntry> {
        self.fresh(generation, |resolved| {
            resolved
                .by_name
                .get(public_name)
                .map(|&position| resolved.entries[position].clone())
        })
        .flatten()
    }

    /// Public name of `native_name` on `backend`, if the index is fresh.
    pub fn public_name(&self, backend: &str, native_name: &str, generation: u64) -> Option<String> {
        self.fresh(generation, |resolved| {
            resolved
                .public_names
                .get(&(backend.to_string(), native_name.to_string()))
                .cloned()
        })
        .flatten()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .as_ref()
            .map_or(0, |resolved| resolved.by_name.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fresh<T>(&self, generation: u64, f: impl FnOnce(&ResolvedCatalog) -> T) -> Option<T> {
        let guard = self.inner.read();
        guard
            .as_ref()
            .filter(|resolved| resolved.generation == generation)
            .map(f)
    }
}
