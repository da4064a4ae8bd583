//! Bearer-token credentials for Azure services
//!
//! Credential selection mirrors the usual Azure "default credential" chain,
//! reduced to the two sources that matter for a hosted service:
//! 1. Service principal from `AZURE_TENANT_ID` / `AZURE_CLIENT_ID` / `AZURE_CLIENT_SECRET`
//! 2. Managed identity (App Service / Container Apps endpoint, then IMDS)

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::{check_response, AzureError, AzureResult};

pub const AZURE_TENANT_ID_ENV: &str = "AZURE_TENANT_ID";
pub const AZURE_CLIENT_ID_ENV: &str = "AZURE_CLIENT_ID";
pub const AZURE_CLIENT_SECRET_ENV: &str = "AZURE_CLIENT_SECRET";
pub const AZURE_AUTHORITY_HOST_ENV: &str = "AZURE_AUTHORITY_HOST";
pub const IDENTITY_ENDPOINT_ENV: &str = "IDENTITY_ENDPOINT";
pub const IDENTITY_HEADER_ENV: &str = "IDENTITY_HEADER";

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const IMDS_API_VERSION: &str = "2018-02-01";
/// IMDS is link-local; off Azure the address never answers.
const IMDS_TIMEOUT_SECS: u64 = 5;

/// Tokens this close to expiry are refreshed instead of reused.
const REFRESH_MARGIN_MINUTES: i64 = 5;

#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_on - margin <= Utc::now()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scope: &str) -> AzureResult<AccessToken>;
}

/// `https://vault.azure.net/.default` -> `https://vault.azure.net`
pub fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ===== Service principal =====

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64,
}

/// OAuth2 client-credentials flow against Microsoft Entra ID.
pub struct ClientSecretCredential {
    client: Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl ClientSecretCredential {
    pub fn new(
        authority_host: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            authority_host: authority_host.into().trim_end_matches('/').to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Build from environment lookups. Returns `None` unless tenant, client
    /// id and secret are all present.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let tenant_id = non_empty(lookup(AZURE_TENANT_ID_ENV))?;
        let client_id = non_empty(lookup(AZURE_CLIENT_ID_ENV))?;
        let client_secret = non_empty(lookup(AZURE_CLIENT_SECRET_ENV))?;
        let authority_host = non_empty(lookup(AZURE_AUTHORITY_HOST_ENV))
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());

        Some(Self::new(authority_host, tenant_id, client_id, client_secret))
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scope: &str) -> AzureResult<AccessToken> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        );
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
        ];

        let resp = self.client.post(url).form(&form).send().await?;
        let parsed: OAuthTokenResponse = check_response(resp).await?.json().await?;

        Ok(AccessToken {
            token: parsed.access_token,
            expires_on: Utc::now() + Duration::seconds(parsed.expires_in),
        })
    }
}

// ===== Managed identity =====

#[derive(Debug, Deserialize)]
struct ManagedIdentityTokenResponse {
    access_token: String,
    /// Unix seconds; App Service sends a string, IMDS sometimes a number.
    expires_on: serde_json::Value,
}

fn parse_expires_on(value: &serde_json::Value) -> AzureResult<DateTime<Utc>> {
    let secs = match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    secs.and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| AzureError::InvalidResponse(format!("unrecognized expires_on: {}", value)))
}

#[derive(Debug, Clone)]
enum IdentitySource {
    /// App Service, Functions and Container Apps
    AppService { endpoint: String, secret: String },
    /// Azure VM instance metadata service
    Imds { endpoint: String },
}

pub struct ManagedIdentityCredential {
    client: Client,
    source: IdentitySource,
    /// Selects a user-assigned identity; system-assigned when absent
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    pub fn app_service(
        endpoint: impl Into<String>,
        secret: impl Into<String>,
        client_id: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            source: IdentitySource::AppService {
                endpoint: endpoint.into(),
                secret: secret.into(),
            },
            client_id,
        }
    }

    pub fn imds(endpoint: impl Into<String>, client_id: Option<String>) -> Self {
        Self {
            client: Client::new(),
            source: IdentitySource::Imds {
                endpoint: endpoint.into(),
            },
            client_id,
        }
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let client_id = non_empty(lookup(AZURE_CLIENT_ID_ENV));
        match (
            non_empty(lookup(IDENTITY_ENDPOINT_ENV)),
            non_empty(lookup(IDENTITY_HEADER_ENV)),
        ) {
            (Some(endpoint), Some(secret)) => Self::app_service(endpoint, secret, client_id),
            _ => Self::imds(IMDS_ENDPOINT, client_id),
        }
    }

    fn source_name(&self) -> &'static str {
        match self.source {
            IdentitySource::AppService { .. } => "app service identity endpoint",
            IdentitySource::Imds { .. } => "instance metadata service",
        }
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scope: &str) -> AzureResult<AccessToken> {
        let resource = scope_to_resource(scope);

        let mut request = match &self.source {
            IdentitySource::AppService { endpoint, secret } => self
                .client
                .get(endpoint)
                .header("X-IDENTITY-HEADER", secret)
                .query(&[("api-version", APP_SERVICE_API_VERSION), ("resource", resource)]),
            IdentitySource::Imds { endpoint } => self
                .client
                .get(endpoint)
                .header("Metadata", "true")
                .timeout(StdDuration::from_secs(IMDS_TIMEOUT_SECS))
                .query(&[("api-version", IMDS_API_VERSION), ("resource", resource)]),
        };
        if let Some(client_id) = &self.client_id {
            request = request.query(&[("client_id", client_id.as_str())]);
        }

        debug!(source = self.source_name(), resource, "Requesting managed identity token");

        let resp = request.send().await?;
        let parsed: ManagedIdentityTokenResponse = check_response(resp).await?.json().await?;

        Ok(AccessToken {
            token: parsed.access_token,
            expires_on: parse_expires_on(&parsed.expires_on)?,
        })
    }
}

// ===== Default chain =====

/// Tries each configured source in order and caches the winning token per scope.
pub struct DefaultAzureCredential {
    sources: Vec<(&'static str, Box<dyn TokenCredential>)>,
    cache: Mutex<HashMap<String, AccessToken>>,
}

impl DefaultAzureCredential {
    pub fn new(sources: Vec<(&'static str, Box<dyn TokenCredential>)>) -> Self {
        Self {
            sources,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut sources: Vec<(&'static str, Box<dyn TokenCredential>)> = Vec::new();
        if let Some(env_credential) = ClientSecretCredential::from_lookup(&lookup) {
            sources.push(("EnvironmentCredential", Box::new(env_credential)));
        }
        sources.push((
            "ManagedIdentityCredential",
            Box::new(ManagedIdentityCredential::from_lookup(&lookup)),
        ));
        Self::new(sources)
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|(name, _)| *name).collect()
    }
}

#[async_trait]
impl TokenCredential for DefaultAzureCredential {
    async fn get_token(&self, scope: &str) -> AzureResult<AccessToken> {
        let margin = Duration::minutes(REFRESH_MARGIN_MINUTES);

        let cached = self.cache.lock().await.get(scope).cloned();
        if let Some(token) = cached.filter(|t| !t.expires_within(margin)) {
            return Ok(token);
        }

        let mut failures = Vec::new();
        for (name, source) in &self.sources {
            match source.get_token(scope).await {
                Ok(token) => {
                    debug!(credential = name, scope, expires_on = %token.expires_on, "Acquired token");
                    self.cache
                        .lock()
                        .await
                        .insert(scope.to_string(), token.clone());
                    return Ok(token);
                }
                Err(e) => {
                    warn!(credential = name, scope, "Token acquisition failed: {}", e);
                    failures.push(format!("{}: {}", name, e));
                }
            }
        }

        Err(AzureError::Credential(if failures.is_empty() {
            "no credential sources configured".to_string()
        } else {
            failures.join("; ")
        }))
    }
}
