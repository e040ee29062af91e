//! MCP hub: aggregation and routing over configured backends.
//!
//! Backends are dialed lazily, their catalogs fetched in parallel and merged
//! into one namespace. Tool names exposed by more than one backend are
//! published as `backend__name`; invocations are routed back to the owning
//! backend under the tool's native name.

use std::sync::Arc;

use futures::future::join_all;
use rmcp::model::JsonObject;
use serde::Serialize;
use tracing::{debug, info};

use super::{
    config::{BackendSpec, CallToolResult, HubConfig},
    pool::McpConnectionPool,
    transport::{BackendConnector, StdioConnector},
};
use crate::{
    error::{McpError, McpResult},
    inventory::{
        split_prefixed, CatalogCache, CatalogEntry, DiskCacheStore, GlobalNameIndex,
        NAME_SEPARATOR,
    },
};

/// Backend as listed by the discovery operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct McpSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tool_count: usize,
    /// Whether the catalog has been fetched; `tool_count` is 0 until then
    pub fetched: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct McpDetails {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tool_count: usize,
    pub tools: Vec<ToolSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub backends: usize,
    pub connected: usize,
    pub fetched: usize,
    pub indexed_tools: usize,
}

pub struct McpHub {
    config: HubConfig,
    pool: Arc<McpConnectionPool>,
    catalogs: CatalogCache,
    index: GlobalNameIndex,
}

impl McpHub {
    /// Hub over stdio backends with the persisted cache configured in `config`.
    pub async fn new(config: HubConfig) -> Self {
        Self::with_connector(config, Arc::new(StdioConnector)).await
    }

    pub async fn with_connector(config: HubConfig, connector: Arc<dyn BackendConnector>) -> Self {
        let root = if config.cache.enabled {
            config.cache.resolve_dir()
        } else {
            None
        };
        let store = DiskCacheStore::open(root).await;
        Self::from_parts(config, connector, store)
    }

    pub fn from_parts(
        config: HubConfig,
        connector: Arc<dyn BackendConnector>,
        store: DiskCacheStore,
    ) -> Self {
        info!("MCP hub configured with {} backends", config.servers.len());
        let pool = Arc::new(McpConnectionPool::new(connector));
        let catalogs = CatalogCache::new(store, Arc::clone(&pool));
        Self {
            config,
            pool,
            catalogs,
            index: GlobalNameIndex::new(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn connection_pool(&self) -> Arc<McpConnectionPool> {
        Arc::clone(&self.pool)
    }

    fn spec(&self, name: &str) -> McpResult<&BackendSpec> {
        self.config
            .servers
            .get(name)
            .ok_or_else(|| McpError::ServerNotFound(name.to_string()))
    }

    // ========================================================================
    // Backend discovery
    // ========================================================================

    /// Every configured backend, without fetching anything.
    pub fn list_mcps(&self) -> Vec<McpSummary> {
        self.config
            .servers
            .iter()
            .map(|(name, spec)| {
                let cached = self.catalogs.snapshot(name);
                McpSummary {
                    name: name.clone(),
                    description: spec.description.clone(),
                    tool_count: cached.as_ref().map_or(0, Vec::len),
                    fetched: cached.is_some(),
                }
            })
            .collect()
    }

    /// Backends whose name or description contains `query` (case-insensitive).
    pub fn search_mcps(&self, query: Option<&str>) -> Vec<McpSummary> {
        let Some(needle) = normalize_query(query) else {
            return self.list_mcps();
        };
        self.list_mcps()
            .into_iter()
            .filter(|mcp| {
                mcp.name.to_lowercase().contains(&needle)
                    || mcp
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Details for one backend. Fetches its catalog.
    pub async fn get_mcp_details(&self, name: &str) -> McpResult<McpDetails> {
        let spec = self.spec(name)?;
        let tools: Vec<ToolSummary> = self
            .list_tools(name)
            .await?
            .into_iter()
            .map(|entry| ToolSummary {
                name: entry.name,
                description: entry.description,
            })
            .collect();
        Ok(McpDetails {
            name: name.to_string(),
            description: spec.description.clone(),
            tool_count: tools.len(),
            tools,
        })
    }

    /// Catalog of one backend, under public names when the index is current.
    pub async fn list_tools(&self, name: &str) -> McpResult<Vec<CatalogEntry>> {
        let spec = self.spec(name)?;
        let entries = self.catalogs.fetch(name, spec).await;
        Ok(self.publish(entries))
    }

    // ========================================================================
    // Tool discovery
    // ========================================================================

    /// Fetch every backend in parallel and return the merged catalog.
    pub async fn list_all_tools(&self) -> Vec<CatalogEntry> {
        let names: Vec<&String> = self.config.servers.keys().collect();
        self.fetch_backends(&names).await;
        self.ensure_index()
    }

    /// Search tools by name/description, optionally within one backend.
    pub async fn search_tools(
        &self,
        query: Option<&str>,
        backend: Option<&str>,
    ) -> McpResult<Vec<CatalogEntry>> {
        let needle = normalize_query(query);

        if let Some(backend) = backend {
            let entries = self.list_tools(backend).await?;
            return Ok(match needle {
                Some(needle) => entries.into_iter().filter(|e| e.matches(&needle)).collect(),
                None => entries,
            });
        }

        let Some(needle) = needle else {
            return Ok(self.list_all_tools().await);
        };

        // Backends whose name matches go first.
        let (preferred, rest): (Vec<&String>, Vec<&String>) = self
            .config
            .servers
            .keys()
            .partition(|name| name.to_lowercase().contains(&needle));

        let mut candidates = Vec::new();
        for group in [preferred, rest] {
            candidates.extend(self.fetch_backends(&group).await.into_iter().flatten());
        }

        // Match against published names so `backend__` queries hit renamed tools
        self.ensure_index();
        let matches: Vec<CatalogEntry> = self
            .publish(candidates)
            .into_iter()
            .filter(|e| e.matches(&needle))
            .collect();
        debug!("Tool search '{}' matched {} entries", needle, matches.len());
        Ok(matches)
    }

    /// Full entry for a public tool name.
    pub async fn get_tool_details(&self, public_name: &str) -> McpResult<CatalogEntry> {
        if let Some(entry) = self.index.entry(public_name, self.catalogs.generation()) {
            return Ok(entry);
        }

        if let Some(entry) = self.find_by_prefix(public_name).await {
            return Ok(entry);
        }

        self.list_all_tools()
            .await
            .into_iter()
            .find(|entry| entry.name == public_name)
            .ok_or_else(|| McpError::ToolNotFound(public_name.to_string()))
    }

    /// Guess the backend from a `backend__tool` name and look only there.
    async fn find_by_prefix(&self, public_name: &str) -> Option<CatalogEntry> {
        let (prefix, native) = split_prefixed(public_name)?;
        let spec = self.config.servers.get(prefix)?;
        let entries = self.catalogs.fetch(prefix, spec).await;
        let position = entries
            .iter()
            .position(|entry| entry.native_name == native)
            .or_else(|| {
                entries
                    .iter()
                    .position(|entry| entry.native_name == public_name)
            })?;
        let mut entry = entries.into_iter().nth(position)?;
        entry.name = self
            .index
            .public_name(prefix, &entry.native_name, self.catalogs.generation())
            .unwrap_or_else(|| public_name.to_string());
        Some(entry)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Invoke a tool by public name and return the backend's raw result.
    ///
    /// `backend` pins the target and skips name resolution.
    pub async fn execute_tool(
        &self,
        public_name: &str,
        arguments: Option<JsonObject>,
        backend: Option<&str>,
    ) -> McpResult<CallToolResult> {
        let (backend, native) = match backend {
            Some(backend) => {
                self.spec(backend)?;
                (backend.to_string(), None)
            }
            None => self.resolve(public_name).await?,
        };
        let spec = self.spec(&backend)?;
        let native = native.unwrap_or_else(|| native_name(public_name, &backend).to_string());

        let session = self.pool.acquire(&backend, spec).await?;
        info!("Calling '{}' on '{}'", native, backend);
        session.call_tool(&native, arguments).await
    }

    /// Map a public name to its backend, plus the native name when known.
    async fn resolve(&self, public_name: &str) -> McpResult<(String, Option<String>)> {
        if let Some(entry) = self.index.entry(public_name, self.catalogs.generation()) {
            return Ok((entry.source, Some(entry.native_name)));
        }

        if let Some(entry) = self.find_by_prefix(public_name).await {
            return Ok((entry.source, Some(entry.native_name)));
        }

        self.list_all_tools()
            .await
            .into_iter()
            .find(|entry| entry.name == public_name)
            .map(|entry| (entry.source, Some(entry.native_name)))
            .ok_or_else(|| McpError::ToolNotFound(public_name.to_string()))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Drop the cached catalog and session of one backend and fetch it again.
    pub async fn refresh_backend(&self, name: &str) -> McpResult<Vec<CatalogEntry>> {
        let spec = self.spec(name)?;
        let entries = self.catalogs.refresh(name, spec).await;
        Ok(self.publish(entries))
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            backends: self.config.servers.len(),
            connected: self.pool.len(),
            fetched: self.catalogs.fetched_count(),
            indexed_tools: self.index.len(),
        }
    }

    /// Close every backend session. Returns the number of sessions that
    /// failed to close.
    pub async fn shutdown(&self) -> usize {
        info!("Shutting down {} backend sessions", self.pool.len());
        self.pool.release_all().await
    }

    // ========================================================================
    // Internal Helper Methods
    // ========================================================================

    async fn fetch_backends(&self, names: &[&String]) -> Vec<Vec<CatalogEntry>> {
        join_all(names.iter().filter_map(|name| {
            let spec = self.config.servers.get(name.as_str())?;
            Some(self.catalogs.fetch(name, spec))
        }))
        .await
    }

    /// Resolved catalog, rebuilding the index if any backend changed.
    fn ensure_index(&self) -> Vec<CatalogEntry> {
        let generation = self.catalogs.generation();
        if let Some(entries) = self.index.entries(generation) {
            return entries;
        }

        let snapshot: Vec<CatalogEntry> = self
            .config
            .servers
            .keys()
            .filter_map(|name| self.catalogs.snapshot(name))
            .flatten()
            .collect();
        self.index.rebuild(snapshot, generation)
    }

    /// Apply published names to entries carrying native names.
    fn publish(&self, mut entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
        let generation = self.catalogs.generation();
        for entry in &mut entries {
            if let Some(public) = self
                .index
                .public_name(&entry.source, &entry.native_name, generation)
            {
                entry.name = public;
            }
        }
        entries
    }
}

fn normalize_query(query: Option<&str>) -> Option<String> {
    query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase)
}

/// Strip `backend__` when the public name carries that exact prefix.
fn native_name<'a>(public_name: &'a str, backend: &str) -> &'a str {
    public_name
        .strip_prefix(backend)
        .and_then(|rest| rest.strip_prefix(NAME_SEPARATOR))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(public_name)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;
    use crate::core::test_support::{tool, MockConnector};

    fn hub(connector: Arc<MockConnector>, backends: &[&str]) -> McpHub {
        let mut config = HubConfig::default();
        for name in backends {
            config.servers.insert(
                name.to_string(),
                BackendSpec::new(format!("{}-server", name)),
            );
        }
        McpHub::from_parts(config, connector, DiskCacheStore::disabled())
    }

    #[test]
    fn test_native_name() {
        assert_eq!(native_name("fs__read_file", "fs"), "read_file");
        assert_eq!(native_name("read_file", "fs"), "read_file");
        assert_eq!(native_name("fsx__read_file", "fs"), "fsx__read_file");
        assert_eq!(native_name("db__read_file", "fs"), "db__read_file");
        assert_eq!(native_name("fs__", "fs"), "fs__");
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query(None), None);
        assert_eq!(normalize_query(Some("   ")), None);
        assert_eq!(normalize_query(Some(" Read ")).as_deref(), Some("read"));
    }

    #[tokio::test]
    async fn test_list_mcps_does_not_fetch() {
        let connector = MockConnector::new()
            .with_backend("fs", vec![tool("read_file")])
            .with_backend("db", vec![tool("query")]);
        let hub = hub(connector.clone(), &["fs", "db"]);

        let mcps = hub.list_mcps();
        assert_eq!(mcps.len(), 2);
        assert_eq!(mcps[0].name, "db");
        assert!(mcps.iter().all(|m| !m.fetched && m.tool_count == 0));
        assert_eq!(connector.connects("fs"), 0);

        hub.list_tools("fs").await.unwrap();
        let fs = hub.list_mcps().into_iter().find(|m| m.name == "fs").unwrap();
        assert!(fs.fetched);
        assert_eq!(fs.tool_count, 1);
    }

    #[tokio::test]
    async fn test_search_mcps_matches_description() {
        let connector = MockConnector::new();
        let mut config = HubConfig::default();
        config.servers.insert(
            "fs".into(),
            BackendSpec::new("fs-server").with_description("Local Filesystem"),
        );
        config
            .servers
            .insert("db".into(), BackendSpec::new("db-server"));
        let hub = McpHub::from_parts(config, connector, DiskCacheStore::disabled());

        let found = hub.search_mcps(Some("filesystem"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "fs");
        assert_eq!(hub.search_mcps(Some("DB")).len(), 1);
        assert_eq!(hub.search_mcps(None).len(), 2);
        assert!(hub.search_mcps(Some("nothing")).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_backend_is_not_found() {
        let hub = hub(MockConnector::new(), &[]);
        assert!(matches!(
            hub.get_mcp_details("ghost").await,
            Err(McpError::ServerNotFound(_))
        ));
        assert!(matches!(
            hub.list_tools("ghost").await,
            Err(McpError::ServerNotFound(_))
        ));
        assert!(matches!(
            hub.search_tools(None, Some("ghost")).await,
            Err(McpError::ServerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_all_tools_is_cached() {
        let connector = MockConnector::new()
            .with_backend("fs", vec![tool("read_file")])
            .with_backend("db", vec![tool("query")]);
        let hub = hub(connector.clone(), &["fs", "db"]);

        let first = hub.list_all_tools().await;
        let second = hub.list_all_tools().await;

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(connector.backend("fs").list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(connector.backend("db").list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_search_tools_prefers_matching_backends() {
        let connector = MockConnector::new()
            .with_backend("alpha", vec![tool("search_docs")])
            .with_backend("search", vec![tool("search_web"), tool("fetch")]);
        let hub = hub(connector.clone(), &["alpha", "search"]);

        let results = hub.search_tools(Some("search"), None).await.unwrap();
        let names: Vec<&str> = results.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["search_web", "search_docs"]);
        assert!(!hub.index.is_stale(hub.catalogs.generation()));
    }

    #[tokio::test]
    async fn test_search_tools_within_backend() {
        let connector = MockConnector::new()
            .with_backend("fs", vec![tool("read_file"), tool("write_file")])
            .with_backend("db", vec![tool("read_rows")]);
        let hub = hub(connector.clone(), &["fs", "db"]);

        let results = hub.search_tools(Some("WRITE"), Some("fs")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "write_file");
        assert_eq!(connector.connects("db"), 0);

        let all_fs = hub.search_tools(None, Some("fs")).await.unwrap();
        assert_eq!(all_fs.len(), 2);
    }

    #[tokio::test]
    async fn test_get_tool_details_by_prefix_fetches_one_backend() {
        let connector = MockConnector::new()
            .with_backend("fs", vec![tool("read_file")])
            .with_backend("db", vec![tool("query")]);
        let hub = hub(connector.clone(), &["fs", "db"]);

        let entry = hub.get_tool_details("fs__read_file").await.unwrap();
        assert_eq!(entry.source, "fs");
        assert_eq!(entry.native_name, "read_file");
        assert_eq!(connector.connects("db"), 0);
    }

    #[tokio::test]
    async fn test_get_tool_details_falls_back_to_full_listing() {
        let connector = MockConnector::new()
            .with_backend("fs", vec![tool("read_file")])
            .with_backend("db", vec![tool("query")]);
        let hub = hub(connector.clone(), &["fs", "db"]);

        let entry = hub.get_tool_details("query").await.unwrap();
        assert_eq!(entry.source, "db");
        assert!(matches!(
            hub.get_tool_details("missing").await,
            Err(McpError::ToolNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_with_explicit_backend() {
        let connector = MockConnector::new().with_backend("fs", vec![tool("read_file")]);
        let hub = hub(connector.clone(), &["fs"]);

        let args = json!({"path": "/tmp"}).as_object().cloned();
        hub.execute_tool("read_file", args.clone(), Some("fs"))
            .await
            .unwrap();
        let calls = connector.backend("fs").calls.lock().clone();
        assert_eq!(calls, vec![("read_file".to_string(), args)]);

        assert!(matches!(
            hub.execute_tool("read_file", None, Some("ghost")).await,
            Err(McpError::ServerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_native_name_containing_separator() {
        let connector = MockConnector::new().with_backend("fs", vec![tool("fs__stat")]);
        let hub = hub(connector.clone(), &["fs"]);

        hub.list_all_tools().await;
        hub.execute_tool("fs__stat", None, None).await.unwrap();
        let calls = connector.backend("fs").calls.lock().clone();
        assert_eq!(calls[0].0, "fs__stat");
    }

    #[tokio::test]
    async fn test_execute_separator_name_without_index() {
        let connector = MockConnector::new().with_backend("fs", vec![tool("fs__stat")]);
        let hub = hub(connector.clone(), &["fs"]);

        // Resolved through the prefix heuristic: `stat` does not exist on fs
        hub.execute_tool("fs__stat", None, None).await.unwrap();
        let calls = connector.backend("fs").calls.lock().clone();
        assert_eq!(calls[0].0, "fs__stat");
    }

    #[tokio::test]
    async fn test_execute_prefixed_name_without_index() {
        let connector = MockConnector::new().with_backend("fs", vec![tool("stat")]);
        let hub = hub(connector.clone(), &["fs"]);

        hub.execute_tool("fs__stat", None, None).await.unwrap();
        let calls = connector.backend("fs").calls.lock().clone();
        assert_eq!(calls[0].0, "stat");
    }

    #[tokio::test]
    async fn test_search_tools_matches_published_names() {
        let connector = MockConnector::new()
            .with_backend("fs", vec![tool("read_file")])
            .with_backend("db", vec![tool("read_file")]);
        let hub = hub(connector.clone(), &["fs", "db"]);

        let results = hub.search_tools(Some("FS__read"), None).await.unwrap();
        let names: Vec<&str> = results.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["fs__read_file"]);
    }

    #[tokio::test]
    async fn test_refresh_and_stats() {
        let connector = MockConnector::new().with_backend("fs", vec![tool("a")]);
        let hub = hub(connector.clone(), &["fs"]);

        hub.list_all_tools().await;
        assert_eq!(
            hub.stats(),
            HubStats {
                backends: 1,
                connected: 1,
                fetched: 1,
                indexed_tools: 1,
            }
        );

        connector.backend("fs").tools.lock().push(tool("b"));
        let refreshed = hub.refresh_backend("fs").await.unwrap();
        assert_eq!(refreshed.len(), 2);
        assert_eq!(hub.list_all_tools().await.len(), 2);

        assert_eq!(hub.shutdown().await, 0);
        assert_eq!(hub.stats().connected, 0);
    }
}
