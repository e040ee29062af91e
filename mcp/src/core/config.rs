//! MCP hub configuration types and utilities.
//!
//! Defines the backend launch specs and the on-disk cache settings.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::{Path, PathBuf},
};

pub use rmcp::model::{CallToolResult, Tool};
use serde::{Deserialize, Serialize};

use crate::error::{McpError, McpResult};

/// Environment variable that overrides the catalog cache directory.
pub const CACHE_DIR_ENV: &str = "MCP_HUB_CACHE_DIR";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HubConfig {
    /// Backend MCP servers keyed by name. Iteration order is name order.
    #[serde(default, alias = "mcpServers")]
    pub servers: BTreeMap<String, BackendSpec>,

    /// Persisted catalog cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Launch configuration for one stdio backend.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendSpec {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overlay applied on top of the hub's own environment
    #[serde(default, alias = "envs")]
    pub env: HashMap<String, String>,

    /// Human-readable summary shown by the discovery tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BackendSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// Env values may hold secrets; only the keys are printed.
impl fmt::Debug for BackendSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut env_keys: Vec<&String> = self.env.keys().collect();
        env_keys.sort();
        f.debug_struct("BackendSpec")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &env_keys)
            .field("description", &self.description)
            .finish()
    }
}

/// Catalog cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Persist fetched catalogs across restarts
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache root override; falls back to `MCP_HUB_CACHE_DIR`, then the
    /// platform cache directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl CacheConfig {
    /// Resolve the cache root: explicit dir, then env var, then platform default.
    pub fn resolve_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.dir {
            return Some(dir.clone());
        }
        if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(dir));
        }
        dirs::cache_dir().map(|base| base.join("mcp-hub"))
    }
}

impl HubConfig {
    /// Load configuration from a YAML (or JSON) file
    pub async fn from_file(path: impl AsRef<Path>) -> McpResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            McpError::Config(format!("failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_str(&content)
    }

    /// Parse configuration text. JSON parses as well since it is valid YAML.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> McpResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> McpResult<()> {
        for (name, spec) in &self.servers {
            if name.trim().is_empty() {
                return Err(McpError::Config("server name must not be empty".into()));
            }
            if spec.command.trim().is_empty() {
                return Err(McpError::Config(format!(
                    "server '{}' has an empty command",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn server(&self, name: &str) -> Option<&BackendSpec> {
        self.servers.get(name)
    }
}
