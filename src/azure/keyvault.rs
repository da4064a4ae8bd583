//! Azure Key Vault secrets client
//!
//! Thin REST wrapper over the data-plane secrets API. Every call is a single
//! authenticated request (or page walk); nothing is cached between calls.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use super::credential::TokenCredential;
use super::error::{check_response, AzureError, AzureResult};

pub const KEYVAULT_SCOPE: &str = "https://vault.azure.net/.default";
pub const KEYVAULT_API_VERSION: &str = "7.4";

/// Latest version of a secret, value included.
#[derive(Debug, Clone, PartialEq)]
pub struct Secret {
    pub name: String,
    pub value: String,
    pub content_type: Option<String>,
    pub created_on: Option<DateTime<Utc>>,
    pub updated_on: Option<DateTime<Utc>>,
}

/// Read access to a secrets backend.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, secret_name: &str) -> AzureResult<Secret>;

    /// Names of every secret visible to the caller, in backend order.
    async fn list_secret_names(&self) -> AzureResult<Vec<String>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretBundle {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    attributes: Option<SecretAttributes>,
}

#[derive(Debug, Deserialize)]
struct SecretAttributes {
    /// Unix seconds
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    updated: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SecretItem {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretListPage {
    #[serde(default)]
    value: Vec<SecretItem>,
    #[serde(default)]
    next_link: Option<String>,
}

/// Secret name from an identifier like `https://v.vault.azure.net/secrets/{name}[/{version}]`
fn name_from_id(id: &str) -> Option<String> {
    let url = Url::parse(id).ok()?;
    let mut segments = url.path_segments()?;
    match (segments.next(), segments.next()) {
        (Some("secrets"), Some(name)) if !name.is_empty() => Some(name.to_string()),
        _ => None,
    }
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

pub struct KeyVaultClient {
    client: Client,
    vault_url: Url,
    credential: Arc<dyn TokenCredential>,
}

impl KeyVaultClient {
    pub fn new(vault_url: Url, credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            client: Client::new(),
            vault_url,
            credential,
        }
    }

    /// `{vault}/secrets[/{name}]` with the name percent-encoded as one segment.
    fn secrets_url(&self, secret_name: Option<&str>) -> AzureResult<Url> {
        let mut url = self.vault_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                AzureError::InvalidResponse(format!("vault URL cannot be a base: {}", self.vault_url))
            })?;
            segments.pop_if_empty().push("secrets");
            if let Some(name) = secret_name {
                segments.push(name);
            }
        }
        url.query_pairs_mut()
            .append_pair("api-version", KEYVAULT_API_VERSION);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> AzureResult<T> {
        let token = self.credential.get_token(KEYVAULT_SCOPE).await?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(&token.token)
            .send()
            .await?;
        Ok(check_response(resp).await?.json().await?)
    }
}

#[async_trait]
impl SecretStore for KeyVaultClient {
    async fn get_secret(&self, secret_name: &str) -> AzureResult<Secret> {
        let url = self.secrets_url(Some(secret_name))?;
        let bundle: SecretBundle = self.get_json(url).await?;

        let value = bundle.value.ok_or_else(|| {
            AzureError::InvalidResponse(format!("secret '{}' has no value", secret_name))
        })?;
        let attributes = bundle.attributes.unwrap_or(SecretAttributes {
            created: None,
            updated: None,
        });

        Ok(Secret {
            name: bundle
                .id
                .as_deref()
                .and_then(name_from_id)
                .unwrap_or_else(|| secret_name.to_string()),
            value,
            content_type: bundle.content_type,
            created_on: timestamp(attributes.created),
            updated_on: timestamp(attributes.updated),
        })
    }

    async fn list_secret_names(&self) -> AzureResult<Vec<String>> {
        let mut names = Vec::new();
        let mut next = Some(self.secrets_url(None)?);
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            let page: SecretListPage = self.get_json(url).await?;
            pages += 1;

            for item in page.value {
                let name = name_from_id(&item.id).ok_or_else(|| {
                    AzureError::InvalidResponse(format!("unexpected secret id: {}", item.id))
                })?;
                names.push(name);
            }

            next = match page.next_link.filter(|link| !link.is_empty()) {
                Some(link) => Some(Url::parse(&link).map_err(|e| {
                    AzureError::InvalidResponse(format!("bad nextLink '{}': {}", link, e))
                })?),
                None => None,
            };
        }

        debug!(pages, count = names.len(), "Listed secrets");
        Ok(names)
    }
}
