//! Helper functions for MCP tools

use rmcp::{
    model::{CallToolResult, Content},
    ErrorData as McpError,
};
use serde::Serialize;

use crate::azure::{AzureError, LogQueryResult, Secret};

use super::types::{LogQueryJson, SecretJson, SecretListJson, LOGS_NOT_CONFIGURED};

pub fn secret_json(secret: Secret) -> SecretJson {
    SecretJson {
        name: secret.name,
        value: secret.value,
        content_type: secret.content_type,
        created_on: secret.created_on.map(|t| t.to_rfc3339()),
        updated_on: secret.updated_on.map(|t| t.to_rfc3339()),
    }
}

pub fn secret_list_json(names: Vec<String>) -> SecretListJson {
    SecretListJson { secrets: names }
}

pub fn log_query_json(result: LogQueryResult) -> LogQueryJson {
    let count = result.count();
    LogQueryJson::Results {
        results: result.rows,
        count,
    }
}

pub fn logs_not_configured_json() -> LogQueryJson {
    LogQueryJson::Unavailable {
        error: LOGS_NOT_CONFIGURED.to_string(),
    }
}

/// Backend failure -> protocol-level tool error, message kept intact.
pub fn backend_error(context: &str, err: AzureError) -> McpError {
    McpError::internal_error(format!("{}: {}", context, err), None)
}

/// Serialize a tool payload into a successful result.
pub fn json_result<T: Serialize>(payload: &T) -> Result<CallToolResult, McpError> {
    let output = serde_json::to_string_pretty(payload).map_err(|e| {
        McpError::internal_error(format!("JSON serialization failed: {}", e), None)
    })?;
    Ok(CallToolResult::success(vec![Content::text(output)]))
}
