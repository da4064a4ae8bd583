//! Parameter structures for MCP tools

use schemars::JsonSchema;
use serde::Deserialize;

use crate::azure::logs::default_time_span_hours;

/// Parameters for getSecret tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetSecretParams {
    /// Name of the secret in the vault (e.g., "db-password")
    #[schemars(description = "Name of the secret to retrieve")]
    #[serde(rename = "secretName")]
    pub secret_name: String,
}

/// Parameters for queryKeyVaultLogs tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryLogsParams {
    /// KQL query, passed to the workspace unchanged
    #[schemars(
        description = "KQL query to run against the Log Analytics workspace (e.g., \"AzureDiagnostics | where ResourceProvider == 'MICROSOFT.KEYVAULT' | take 50\")"
    )]
    pub query: String,
    /// Trailing window in hours, ending now (default: 24)
    #[schemars(description = "Time span in hours to query, ending now (default: 24)")]
    #[serde(rename = "timeSpanHours", default = "default_time_span_hours")]
    pub time_span_hours: i64,
}
