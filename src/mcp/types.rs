//! JSON output types for MCP tools

use serde::Serialize;
use serde_json::{Map, Value};

pub const LOGS_NOT_CONFIGURED: &str =
    "Log Analytics not configured. Set LOG_ANALYTICS_WORKSPACE_ID environment variable.";

/// getSecret output. Optional fields are always present, `null` when unknown.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretJson {
    pub name: String,
    pub value: String,
    pub content_type: Option<String>,
    pub created_on: Option<String>,
    pub updated_on: Option<String>,
}

/// listSecrets output: names only
#[derive(Debug, Serialize, PartialEq)]
pub struct SecretListJson {
    pub secrets: Vec<String>,
}

/// queryKeyVaultLogs output
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum LogQueryJson {
    Results {
        results: Vec<Map<String, Value>>,
        count: usize,
    },
    /// Successful reply for a deployment without a workspace
    Unavailable { error: String },
}
