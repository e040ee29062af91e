//! Core hub infrastructure.

pub mod config;
pub mod hub;
pub mod pool;
pub mod signature;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{BackendSpec, CacheConfig, CallToolResult, HubConfig, Tool, CACHE_DIR_ENV};
pub use hub::{HubStats, McpDetails, McpHub, McpSummary, ToolSummary};
pub use pool::{McpConnectionPool, SessionState};
pub use signature::{signature, ABSENT_SIGNATURE};
pub use transport::{BackendConnector, BackendSession, StdioConnector};
