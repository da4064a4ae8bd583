//! Key Vault MCP Server implementation

use std::sync::Arc;

use anyhow::Result;
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo},
    tool, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use tracing::{info, warn};

use crate::azure::{
    KeyVaultClient, LogAnalyticsClient, LogQuery, SecretStore, TokenCredential,
};
use crate::core::config::Config;

use super::helpers::{
    backend_error, json_result, log_query_json, logs_not_configured_json, secret_json,
    secret_list_json,
};
use super::params::{GetSecretParams, QueryLogsParams};

pub const SERVER_NAME: &str = "keyvault-mcp-server";
/// Streamable HTTP endpoint path
pub const MCP_PATH: &str = "/mcp";

/// Whether this process can answer log queries. Decided once at startup.
#[derive(Clone)]
pub enum LogsCapability {
    Available(Arc<dyn LogQuery>),
    NotConfigured,
}

impl LogsCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, LogsCapability::Available(_))
    }
}

/// Key Vault MCP Service
#[derive(Clone)]
pub struct KeyVaultService {
    secrets: Arc<dyn SecretStore>,
    logs: LogsCapability,
    tool_router: ToolRouter<Self>,
}

impl KeyVaultService {
    pub fn new(secrets: Arc<dyn SecretStore>, logs: LogsCapability) -> Self {
        Self {
            secrets,
            logs,
            tool_router: Self::tool_router(),
        }
    }

    /// Wire both Azure clients to one shared credential.
    pub fn from_config(config: &Config, credential: Arc<dyn TokenCredential>) -> Self {
        let secrets = KeyVaultClient::new(config.keyvault_url.clone(), credential.clone());
        let logs = match &config.workspace_id {
            Some(workspace_id) => LogsCapability::Available(Arc::new(LogAnalyticsClient::new(
                config.log_analytics_endpoint.clone(),
                workspace_id.clone(),
                credential,
            ))),
            None => LogsCapability::NotConfigured,
        };
        Self::new(Arc::new(secrets), logs)
    }

    pub fn logs_capability(&self) -> &LogsCapability {
        &self.logs
    }
}

#[tool_router]
impl KeyVaultService {
    #[tool(
        name = "getSecret",
        description = "Retrieve a secret value from Azure Key Vault."
    )]
    async fn get_secret(
        &self,
        params: Parameters<GetSecretParams>,
    ) -> Result<CallToolResult, McpError> {
        let secret_name = params.0.secret_name;
        info!(secret = %secret_name, "getSecret");

        let secret = self.secrets.get_secret(&secret_name).await.map_err(|e| {
            warn!(secret = %secret_name, "getSecret failed: {}", e);
            backend_error(&format!("Failed to get secret '{}'", secret_name), e)
        })?;

        json_result(&secret_json(secret))
    }

    #[tool(
        name = "listSecrets",
        description = "List the names of secrets in Azure Key Vault (not values)."
    )]
    async fn list_secrets(&self) -> Result<CallToolResult, McpError> {
        let names = self.secrets.list_secret_names().await.map_err(|e| {
            warn!("listSecrets failed: {}", e);
            backend_error("Failed to list secrets", e)
        })?;
        info!(count = names.len(), "listSecrets");

        json_result(&secret_list_json(names))
    }

    #[tool(
        name = "queryKeyVaultLogs",
        description = "Query Key Vault audit logs in Azure Log Analytics using KQL. Returns result rows keyed by column name and the total row count."
    )]
    async fn query_key_vault_logs(
        &self,
        params: Parameters<QueryLogsParams>,
    ) -> Result<CallToolResult, McpError> {
        let logs = match &self.logs {
            LogsCapability::Available(logs) => logs,
            LogsCapability::NotConfigured => {
                info!("queryKeyVaultLogs called without a workspace");
                return json_result(&logs_not_configured_json());
            }
        };

        let QueryLogsParams {
            query,
            time_span_hours,
        } = params.0;
        info!(hours = time_span_hours, "queryKeyVaultLogs");

        let result = logs.query_logs(&query, time_span_hours).await.map_err(|e| {
            warn!("queryKeyVaultLogs failed: {}", e);
            backend_error("Log query failed", e)
        })?;

        json_result(&log_query_json(result))
    }
}

#[rmcp::tool_handler]
impl ServerHandler for KeyVaultService {
    fn get_info(&self) -> ServerInfo {
        let instructions = if self.logs.is_available() {
            "Azure Key Vault MCP Server. Fetch secrets, list secret names and query Key Vault audit logs."
        } else {
            "Azure Key Vault MCP Server. Fetch secrets and list secret names. Log queries are not configured for this deployment."
        };

        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            instructions: Some(instructions.to_string()),
            ..Default::default()
        }
    }
}

/// Run the MCP server over stdin/stdout
pub async fn run_stdio_server(service: KeyVaultService) -> Result<()> {
    use tokio::io::{stdin, stdout};

    let transport = (stdin(), stdout());
    let server = service.serve(transport).await?;
    server.waiting().await?;

    Ok(())
}
