//! Model Context Protocol (MCP) hub.
//!
//! Aggregates any number of stdio MCP servers behind one tool namespace.
//!
//! ## Modules
//!
//! - [`core`]: Hub infrastructure (config, launch signatures, connections, routing)
//! - [`inventory`]: Tool catalogs, persisted cache and name index
//! - [`error`]: Error types shared across the crate

pub mod core;
pub mod error;
pub mod inventory;

// Re-export from core
pub use core::{
    signature, BackendConnector, BackendSession, BackendSpec, CacheConfig, CallToolResult,
    HubConfig, HubStats, McpConnectionPool, McpDetails, McpHub, McpSummary, SessionState,
    StdioConnector, Tool, ToolSummary, ABSENT_SIGNATURE, CACHE_DIR_ENV,
};
pub use error::{McpError, McpResult};
// Re-export from inventory
pub use inventory::{
    BackendCatalogCache, CatalogCache, CatalogEntry, DiskCacheStore, GlobalNameIndex,
    PersistedCacheRecord, NAME_SEPARATOR,
};
// Argument object type for tool calls
pub use rmcp::model::JsonObject;
