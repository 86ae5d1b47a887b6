//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.

use std::sync::Arc;

use crate::tools::cache::{CachePurgeParams, purge_impl};
use crate::tools::sw_fetch::{SwFetchParams, fetch_impl};
use crate::tools::sw_message::{SwMessageParams, message_impl};
use crate::tools::sw_status::status_impl;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use swcache_core::engine::Registration;
use swcache_core::{CacheDb, Network};
use url::Url;

/// The main MCP server handler for swcache.
#[derive(Clone)]
pub struct SwCacheServer {
    registration: Arc<Registration>,
    cache: CacheDb,
    network: Arc<dyn Network>,
    origin: Url,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl SwCacheServer {
    /// Create a new server handler.
    pub fn new(registration: Arc<Registration>, cache: CacheDb, network: Arc<dyn Network>, origin: Url) -> Self {
        Self { registration, cache, network, origin, tool_router: Self::tool_router() }
    }

    /// Intercept a request as if a controlled page had fetched it.
    #[tool(
        description = "Fetch a URL through the offline cache engine. Returns status, source (network, cache or fallback), strategy, headers and body. Requests outside the engine's scope go straight to the network."
    )]
    async fn sw_fetch(&self, params: Parameters<SwFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.registration, self.network.as_ref(), &self.origin, params.0).await
    }

    /// Post a control message to a registered engine.
    #[tool(
        description = "Post a control message (SKIP_WAITING, GET_VERSION, CLEAR_CACHE) to the active or waiting engine. Returns the reply, or null when there is none."
    )]
    async fn sw_message(&self, params: Parameters<SwMessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.registration, params.0).await
    }

    #[tool(description = "Show active and waiting engine versions, their lifecycle states, and every cache partition with its entry count.")]
    async fn sw_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.registration, &self.cache).await
    }

    /// Purge expired entries.
    #[tool(description = "Delete cache entries older than their partition's max age. Optionally limit to one partition kind.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.registration, params.0).await
    }
}

impl ServerHandler for SwCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "swcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
