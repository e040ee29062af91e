//! Meta-tool MCP server.
//!
//! Exposes the hub to an MCP client as seven discovery and execution tools.
//! Every result is JSON text; lookups that miss come back as `{"error": ...}`
//! payloads instead of protocol errors.

use std::sync::Arc;

use hub_mcp::{CatalogEntry, JsonObject, McpError, McpHub};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData, ServerHandler,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchMcpsRequest {
    #[schemars(description = "Case-insensitive text matched against MCP names and descriptions")]
    pub query: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct McpNameRequest {
    #[schemars(description = "Name of the MCP server as listed by list_mcps")]
    pub mcp_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchToolsRequest {
    #[schemars(description = "Case-insensitive text matched against tool names and descriptions")]
    pub query: Option<String>,
    #[schemars(description = "Restrict the search to one MCP server")]
    pub mcp_name: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ToolNameRequest {
    #[schemars(description = "Tool name as returned by list_tools or search_tools")]
    pub tool_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteToolRequest {
    #[schemars(description = "Tool name as returned by list_tools or search_tools")]
    pub tool_name: String,
    #[schemars(description = "Arguments object passed to the tool unchanged")]
    pub arguments: Option<JsonObject>,
    #[schemars(description = "Route to this MCP server instead of resolving the tool name")]
    pub mcp_name: Option<String>,
}

/// Tool as shown in listings.
#[derive(Debug, Serialize)]
struct ToolListing<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    source: &'a str,
}

impl<'a> From<&'a CatalogEntry> for ToolListing<'a> {
    fn from(entry: &'a CatalogEntry) -> Self {
        Self {
            name: &entry.name,
            description: entry.description.as_deref(),
            source: &entry.source,
        }
    }
}

#[derive(Clone)]
pub struct HubServer {
    hub: Arc<McpHub>,
    tool_router: ToolRouter<HubServer>,
}

impl HubServer {
    pub fn new(hub: Arc<McpHub>) -> Self {
        Self {
            hub,
            tool_router: Self::tool_router(),
        }
    }

    fn listing(entries: &[CatalogEntry]) -> Value {
        let tools: Vec<ToolListing<'_>> = entries.iter().map(ToolListing::from).collect();
        json!({ "count": tools.len(), "tools": tools })
    }

    fn lookup_error(&self, err: &McpError) -> Value {
        match err {
            McpError::ServerNotFound(name) => json!({
                "error": format!("MCP server '{}' not found", name),
                "available_mcps": self.hub.config().servers.keys().collect::<Vec<_>>(),
            }),
            McpError::ToolNotFound(name) => json!({
                "error": format!("Tool '{}' not found", name),
                "hint": "Use search_tools or list_tools to find available tool names",
            }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

fn json_result(value: &impl Serialize) -> Result<CallToolResult, ErrorData> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

#[tool_router]
impl HubServer {
    #[tool(description = "List all configured MCP servers with their descriptions and known tool counts")]
    async fn list_mcps(&self) -> Result<CallToolResult, ErrorData> {
        let mcps = self.hub.list_mcps();
        json_result(&json!({ "count": mcps.len(), "mcps": mcps }))
    }

    #[tool(description = "Search MCP servers by name or description")]
    async fn search_mcps(
        &self,
        Parameters(SearchMcpsRequest { query }): Parameters<SearchMcpsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let mcps = self.hub.search_mcps(query.as_deref());
        json_result(&json!({ "count": mcps.len(), "mcps": mcps }))
    }

    #[tool(description = "Show one MCP server's description and the tools it provides")]
    async fn get_mcp_details(
        &self,
        Parameters(McpNameRequest { mcp_name }): Parameters<McpNameRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        match self.hub.get_mcp_details(&mcp_name).await {
            Ok(details) => json_result(&details),
            Err(e) => json_result(&self.lookup_error(&e)),
        }
    }

    #[tool(description = "List the tools provided by one MCP server")]
    async fn list_tools(
        &self,
        Parameters(McpNameRequest { mcp_name }): Parameters<McpNameRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        match self.hub.list_tools(&mcp_name).await {
            Ok(entries) if entries.is_empty() => json_result(&json!({
                "count": 0,
                "tools": [],
                "error": format!(
                    "MCP server '{}' exposes no tools or could not be reached",
                    mcp_name
                ),
            })),
            Ok(entries) => json_result(&Self::listing(&entries)),
            Err(e) => json_result(&self.lookup_error(&e)),
        }
    }

    #[tool(description = "Search tools across all MCP servers by name or description. Returns every tool when no query is given")]
    async fn search_tools(
        &self,
        Parameters(SearchToolsRequest { query, mcp_name }): Parameters<SearchToolsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        match self
            .hub
            .search_tools(query.as_deref(), mcp_name.as_deref())
            .await
        {
            Ok(entries) => json_result(&Self::listing(&entries)),
            Err(e) => json_result(&self.lookup_error(&e)),
        }
    }

    #[tool(description = "Show a tool's description, input schema and owning MCP server")]
    async fn get_tool_details(
        &self,
        Parameters(ToolNameRequest { tool_name }): Parameters<ToolNameRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        match self.hub.get_tool_details(&tool_name).await {
            Ok(entry) => json_result(&json!({
                "name": entry.name,
                "description": entry.description,
                "input_schema": entry.input_schema,
                "source": entry.source,
            })),
            Err(e) => json_result(&self.lookup_error(&e)),
        }
    }

    #[tool(description = "Execute a tool on its MCP server and return the server's result unchanged")]
    async fn execute_tool(
        &self,
        Parameters(ExecuteToolRequest {
            tool_name,
            arguments,
            mcp_name,
        }): Parameters<ExecuteToolRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        debug!("execute_tool '{}' via {:?}", tool_name, mcp_name);
        match self
            .hub
            .execute_tool(&tool_name, arguments, mcp_name.as_deref())
            .await
        {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!("Execution of '{}' failed: {}", tool_name, e);
                let payload = if e.is_not_found() {
                    self.lookup_error(&e)
                } else {
                    json!({ "error": format!("Failed to execute '{}': {}", tool_name, e) })
                };
                let text = serde_json::to_string_pretty(&payload)
                    .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
                Ok(CallToolResult::error(vec![Content::text(text)]))
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for HubServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Aggregates several MCP servers. Discover servers with list_mcps or \
                 search_mcps, find tools with search_tools or list_tools, inspect one \
                 with get_tool_details, then run it with execute_tool."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}
