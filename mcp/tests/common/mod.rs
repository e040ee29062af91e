//! Common test utilities for hub integration tests

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use hub_mcp::{
    BackendConnector, BackendSession, BackendSpec, CallToolResult, DiskCacheStore, HubConfig,
    JsonObject, McpError, McpHub, McpResult, Tool,
};
use parking_lot::Mutex;
use rmcp::model::Content;

pub fn tool(name: &str, description: &str) -> Tool {
    let mut schema = JsonObject::new();
    schema.insert("type".into(), serde_json::json!("object"));
    Tool::new(name.to_string(), description.to_string(), Arc::new(schema))
}

/// Call log shared by every session of one scripted backend.
#[derive(Default)]
pub struct BackendLog {
    pub connects: AtomicUsize,
    pub lists: AtomicUsize,
    pub closes: AtomicUsize,
    pub calls: Mutex<Vec<(String, Option<JsonObject>)>>,
}

#[allow(dead_code)]
impl BackendLog {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn called(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(name, _)| name.clone()).collect()
    }
}

enum Script {
    Tools(Vec<Tool>),
    FailList,
}

struct ScriptedSession {
    name: String,
    script: Arc<Mutex<Script>>,
    log: Arc<BackendLog>,
}

#[async_trait]
impl BackendSession for ScriptedSession {
    async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        self.log.lists.fetch_add(1, Ordering::SeqCst);
        match &*self.script.lock() {
            Script::Tools(tools) => Ok(tools.clone()),
            Script::FailList => Err(McpError::Transport(format!("{} hung up", self.name))),
        }
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> McpResult<CallToolResult> {
        self.log.calls.lock().push((name.to_string(), arguments));
        if name == "explode" {
            return Ok(CallToolResult::error(vec![Content::text("boom")]));
        }
        Ok(CallToolResult::success(vec![Content::text(format!(
            "{}:{}",
            self.name, name
        ))]))
    }

    async fn close(&self) -> McpResult<()> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector serving scripted in-process backends.
#[derive(Default)]
pub struct ScriptedConnector {
    scripts: Mutex<HashMap<String, Arc<Mutex<Script>>>>,
    logs: Mutex<HashMap<String, Arc<BackendLog>>>,
}

#[allow(dead_code)]
impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(self: Arc<Self>, name: &str, tools: Vec<Tool>) -> Arc<Self> {
        self.scripts
            .lock()
            .insert(name.to_string(), Arc::new(Mutex::new(Script::Tools(tools))));
        self
    }

    pub fn serve_broken(self: Arc<Self>, name: &str) -> Arc<Self> {
        self.scripts
            .lock()
            .insert(name.to_string(), Arc::new(Mutex::new(Script::FailList)));
        self
    }

    /// Replace the tools a backend answers with from now on.
    pub fn set_tools(&self, name: &str, tools: Vec<Tool>) {
        if let Some(script) = self.scripts.lock().get(name) {
            *script.lock() = Script::Tools(tools);
        }
    }

    pub fn log(&self, name: &str) -> Arc<BackendLog> {
        Arc::clone(self.logs.lock().entry(name.to_string()).or_default())
    }
}

#[async_trait]
impl BackendConnector for ScriptedConnector {
    async fn connect(&self, name: &str, _spec: &BackendSpec) -> McpResult<Arc<dyn BackendSession>> {
        let log = self.log(name);
        log.connects.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::ConnectionFailed(format!("spawn {}: not found", name)))?;
        Ok(Arc::new(ScriptedSession {
            name: name.to_string(),
            script,
            log,
        }))
    }
}

pub fn config(backends: &[(&str, &str)]) -> HubConfig {
    let mut config = HubConfig::default();
    for (name, command) in backends {
        config
            .servers
            .insert(name.to_string(), BackendSpec::new(*command));
    }
    config
}

#[allow(dead_code)]
pub fn hub(config: HubConfig, connector: Arc<ScriptedConnector>) -> McpHub {
    McpHub::from_parts(config, connector, DiskCacheStore::disabled())
}

#[allow(dead_code)]
pub async fn hub_with_cache(
    config: HubConfig,
    connector: Arc<ScriptedConnector>,
    dir: &std::path::Path,
) -> McpHub {
    let store = DiskCacheStore::open(Some(dir.to_path_buf())).await;
    McpHub::from_parts(config, connector, store)
}
