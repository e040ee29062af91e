//! Core types for the tool catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::config::Tool;

/// Separator between backend and tool name in a prefixed public name.
pub const NAME_SEPARATOR: &str = "__";

/// Compose the prefixed public name `backend__tool`.
pub fn prefixed_name(backend: &str, tool_name: &str) -> String {
    format!("{}{}{}", backend, NAME_SEPARATOR, tool_name)
}

/// Split `backend__tool` at the first separator.
pub fn split_prefixed(public_name: &str) -> Option<(&str, &str)> {
    public_name
        .split_once(NAME_SEPARATOR)
        .filter(|(backend, tool)| !backend.is_empty() && !tool.is_empty())
}

/// One tool as seen through the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Public name; equals `native_name` unless a collision forced a prefix
    pub name: String,
    /// Name the owning backend knows the tool by
    pub native_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
    /// Owning backend name
    pub source: String,
}

impl CatalogEntry {
    pub fn from_tool(source: &str, tool: &Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            native_name: tool.name.to_string(),
            description: tool.description.as_ref().map(|d| d.to_string()),
            input_schema: Value::Object((*tool.input_schema).clone()),
            source: source.to_string(),
        }
    }

    pub fn is_renamed(&self) -> bool {
        self.name != self.native_name
    }

    /// Case-insensitive substring match on name or description.
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.native_name.to_lowercase().contains(needle)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(needle))
    }
}

/// A backend's catalog as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedCacheRecord {
    pub signature: String,
    pub entries: Vec<CatalogEntry>,
    pub fetched_at: DateTime<Utc>,
    /// The live fetch failed; the empty catalog only holds for that run
    #[serde(default)]
    pub failed: bool,
}

impl PersistedCacheRecord {
    pub fn new(signature: impl Into<String>, entries: Vec<CatalogEntry>) -> Self {
        Self {
            signature: signature.into(),
            entries,
            fetched_at: Utc::now(),
            failed: false,
        }
    }

    /// Empty record for a backend whose live fetch failed.
    pub fn failed(signature: impl Into<String>) -> Self {
        Self {
            failed: true,
            ..Self::new(signature, Vec::new())
        }
    }

    /// Whether a later run may use this record instead of fetching live.
    pub fn is_reusable(&self, signature: &str) -> bool {
        !self.failed && self.signature == signature
    }
}

/// In-memory catalog state for one backend.
#[derive(Debug, Clone, Default)]
pub struct BackendCatalogCache {
    pub entries: Vec<CatalogEntry>,
    pub fetched: bool,
    pub signature: Option<String>,
}

impl BackendCatalogCache {
    pub fn fetched_under(signature: impl Into<String>, entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries,
            fetched: true,
            signature: Some(signature.into()),
        }
    }

    pub fn is_fresh(&self, signature: &str) -> bool {
        self.fetched && self.signature.as_deref() == Some(signature)
    }
}
