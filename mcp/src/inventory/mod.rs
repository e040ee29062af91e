//! Tool catalogs and indexing.
//!
//! This module provides per-backend catalog storage and lookup with support for:
//! - Fetch-once caching keyed by launch signature
//! - On-disk persistence across restarts
//! - Prefixed public names for tools exposed by more than one backend

pub mod catalog;
pub mod index;
pub mod store;
pub mod types;

pub use catalog::CatalogCache;
pub use index::{resolve_collisions, GlobalNameIndex};
pub use store::{file_stem, sanitize_name, DiskCacheStore};
pub use types::{
    prefixed_name, split_prefixed, BackendCatalogCache, CatalogEntry, PersistedCacheRecord,
    NAME_SEPARATOR,
};
