//! Backend transport seam.
//!
//! The hub only needs three things from a backend: list its tools, call a
//! tool, and close. [`BackendConnector`] dials a backend into a
//! [`BackendSession`]; [`StdioConnector`] does so by spawning the backend as
//! a child process and running the MCP handshake over its stdin/stdout.

use std::{borrow::Cow, process::Stdio, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use rmcp::{
    model::{CallToolRequestParam, CallToolResult, JsonObject, Tool},
    service::{Peer, RunningService},
    transport::{ConfigureCommandExt, TokioChildProcess},
    RoleClient, ServiceExt,
};
use tracing::{debug, info};

use super::config::BackendSpec;
use crate::error::{McpError, McpResult};

type McpClient = RunningService<RoleClient, ()>;

/// A live, handshaken connection to one backend.
#[async_trait]
pub trait BackendSession: Send + Sync {
    async fn list_tools(&self) -> McpResult<Vec<Tool>>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> McpResult<CallToolResult>;

    /// Close the session. Calling it twice is a no-op.
    async fn close(&self) -> McpResult<()>;
}

/// Opens sessions to backends.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, name: &str, spec: &BackendSpec) -> McpResult<Arc<dyn BackendSession>>;
}

/// Spawns backends as child processes speaking MCP over stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioConnector;

#[async_trait]
impl BackendConnector for StdioConnector {
    async fn connect(&self, name: &str, spec: &BackendSpec) -> McpResult<Arc<dyn BackendSession>> {
        info!(
            "Connecting to MCP server '{}' via stdio: {} {:?}",
            name, spec.command, spec.args
        );

        let transport = TokioChildProcess::new(
            tokio::process::Command::new(&spec.command).configure(|cmd| {
                cmd.args(&spec.args)
                    .envs(spec.env.iter())
                    .stderr(Stdio::inherit());
            }),
        )
        .map_err(|e| McpError::Transport(format!("create stdio transport for '{}': {}", name, e)))?;

        let client = ().serve(transport).await.map_err(|e| {
            McpError::ConnectionFailed(format!("initialize stdio client '{}': {}", name, e))
        })?;

        info!("Connected to stdio server '{}'", name);
        Ok(Arc::new(RmcpSession::new(name, client)))
    }
}

/// `rmcp` client session. Requests go through a cloned [`Peer`]; the running
/// service is kept aside so `close` can cancel it.
pub struct RmcpSession {
    name: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<McpClient>>,
}

impl RmcpSession {
    fn new(name: &str, client: McpClient) -> Self {
        Self {
            name: name.to_string(),
            peer: client.peer().clone(),
            service: Mutex::new(Some(client)),
        }
    }
}

#[async_trait]
impl BackendSession for RmcpSession {
    async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        self.peer
            .list_all_tools()
            .await
            .map_err(|e| McpError::Transport(format!("list tools on '{}': {}", self.name, e)))
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> McpResult<CallToolResult> {
        let request = CallToolRequestParam {
            name: Cow::Owned(name.to_string()),
            arguments,
        };
        self.peer.call_tool(request).await.map_err(|e| {
            McpError::ToolExecution(format!("'{}' on '{}': {}", name, self.name, e))
        })
    }

    async fn close(&self) -> McpResult<()> {
        let Some(service) = self.service.lock().take() else {
            return Ok(());
        };
        let reason = service.cancel().await.map_err(|e| {
            McpError::Transport(format!("shut down '{}': {}", self.name, e))
        })?;
        debug!("Closed MCP server '{}': {:?}", self.name, reason);
        Ok(())
    }
}
