//! MCP Server for Azure Key Vault
//!
//! Exposes secret retrieval, secret listing and audit-log queries as tools.

mod helpers;
mod http;
mod params;
mod server;
mod types;

pub use http::{router, run_http_server};
pub use server::{run_stdio_server, KeyVaultService, LogsCapability, MCP_PATH, SERVER_NAME};
pub use types::LOGS_NOT_CONFIGURED;
