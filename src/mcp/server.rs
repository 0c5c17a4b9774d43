// file: src/mcp/server.rs
// description: MCP server exposing blood bank search as agent tools
// reference: https://docs.rs/rmcp

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::tool::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use std::sync::Arc;
use tracing::info;

use crate::error::SearchError;
use crate::models::SearchRequest;
use crate::pipeline::SearchContext;

#[derive(Clone)]
pub struct BloodBankMcp {
    service: Arc<SearchContext>,
    tool_router: ToolRouter<Self>,
}

fn to_mcp_error(err: SearchError) -> McpError {
    match err {
        SearchError::Validation(msg) => McpError::invalid_params(msg, None),
        other => McpError::internal_error(other.public_message(), None),
    }
}

fn json_content<T: serde::Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

#[tool_router]
impl BloodBankMcp {
    pub fn new(service: Arc<SearchContext>) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Search donors, hospitals and blood requests in natural language. Returns ranked records with a short grounded summary."
    )]
    async fn search_records(
        &self,
        Parameters(request): Parameters<SearchRequest>,
    ) -> Result<CallToolResult, McpError> {
        info!("MCP: search {:?} (k: {:?})", request.query, request.k);
        let response = self
            .service
            .search(&request)
            .await
            .map_err(to_mcp_error)?;
        json_content(&response)
    }

    #[tool(description = "Count live records per entity type in the search index")]
    async fn index_stats(&self) -> Result<CallToolResult, McpError> {
        info!("MCP: index stats");
        let stats = self.service.stats().map_err(to_mcp_error)?;
        json_content(&stats)
    }

    #[tool(description = "Probe the embedding service, record store and summary generator")]
    async fn health(&self) -> Result<CallToolResult, McpError> {
        let report = self.service.health().await;
        Ok(CallToolResult::success(vec![Content::text(report.format())]))
    }
}

#[tool_handler]
impl ServerHandler for BloodBankMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Natural-language search over blood bank donors, hospitals and blood requests."
                    .to_string(),
            ),
        }
    }
}
