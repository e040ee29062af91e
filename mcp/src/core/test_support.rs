//! In-memory backends for unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};

use super::{
    config::BackendSpec,
    transport::{BackendConnector, BackendSession},
};
use crate::error::{McpError, McpResult};

pub(crate) fn tool(name: &str) -> Tool {
    Tool::new(
        name.to_string(),
        format!("{} tool", name),
        Arc::new(JsonObject::new()),
    )
}

#[derive(Default)]
pub(crate) struct MockBackend {
    pub tools: Mutex<Vec<Tool>>,
    pub fail_list: AtomicBool,
    pub fail_close: AtomicBool,
    pub list_calls: AtomicUsize,
    pub closes: AtomicUsize,
    pub calls: Mutex<Vec<(String, Option<JsonObject>)>>,
}

struct MockSession {
    backend: Arc<MockBackend>,
}

#[async_trait]
impl BackendSession for MockSession {
    async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        self.backend.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.backend.fail_list.load(Ordering::SeqCst) {
            return Err(McpError::Transport("tools/list failed".into()));
        }
        Ok(self.backend.tools.lock().clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> McpResult<CallToolResult> {
        self.backend
            .calls
            .lock()
            .push((name.to_string(), arguments));
        Ok(CallToolResult::success(vec![Content::text(format!(
            "called {}",
            name
        ))]))
    }

    async fn close(&self) -> McpResult<()> {
        self.backend.closes.fetch_add(1, Ordering::SeqCst);
        if self.backend.fail_close.load(Ordering::SeqCst) {
            return Err(McpError::Transport("close failed".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MockConnector {
    backends: Mutex<HashMap<String, Arc<MockBackend>>>,
    connects: Mutex<HashMap<String, usize>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_backend(self: Arc<Self>, name: &str, tools: Vec<Tool>) -> Arc<Self> {
        let backend = MockBackend {
            tools: Mutex::new(tools),
            ..Default::default()
        };
        self.backends
            .lock()
            .insert(name.to_string(), Arc::new(backend));
        self
    }

    /// Register a backend whose `list_tools` always fails.
    pub fn with_broken(self: Arc<Self>, name: &str) -> Arc<Self> {
        let connector = self.with_backend(name, vec![]);
        connector.backend(name).fail_list.store(true, Ordering::SeqCst);
        connector
    }

    /// A name with no registered backend fails to connect.
    pub fn with_unreachable(self: Arc<Self>, _name: &str) -> Arc<Self> {
        self
    }

    pub fn backend(&self, name: &str) -> Arc<MockBackend> {
        Arc::clone(
            self.backends
                .lock()
                .get(name)
                .expect("backend registered"),
        )
    }

    pub fn connects(&self, name: &str) -> usize {
        self.connects.lock().get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BackendConnector for MockConnector {
    async fn connect(&self, name: &str, _spec: &BackendSpec) -> McpResult<Arc<dyn BackendSession>> {
        *self.connects.lock().entry(name.to_string()).or_default() += 1;
        let backend = self
            .backends
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::ConnectionFailed(format!("spawn '{}'", name)))?;
        Ok(Arc::new(MockSession { backend }))
    }
}
