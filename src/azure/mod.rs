//! Azure service clients
//!
//! Key Vault secrets and Log Analytics queries, both authenticated through a
//! shared [`TokenCredential`].

pub mod credential;
pub mod error;
pub mod keyvault;
pub mod logs;

pub use credential::{DefaultAzureCredential, TokenCredential};
pub use error::{AzureError, AzureResult};
pub use keyvault::{KeyVaultClient, Secret, SecretStore};
pub use logs::{LogAnalyticsClient, LogQuery, LogQueryResult};
