//! Azure Key Vault tools over the Model Context Protocol.

pub mod azure;
pub mod core;
pub mod mcp;
