//! Process configuration
//!
//! Read once from the environment before the server accepts requests and
//! shared read-only afterwards:
//! 1. `KEYVAULT_URL` (required) - startup fails without it
//! 2. `LOG_ANALYTICS_WORKSPACE_ID` (optional) - disables the logs tool when absent
//! 3. `LOG_ANALYTICS_ENDPOINT`, `MCP_HOST`, `MCP_PORT` - deployment overrides

use reqwest::Url;
use thiserror::Error;

use crate::azure::logs::DEFAULT_LOG_ANALYTICS_ENDPOINT;

pub const KEYVAULT_URL_ENV: &str = "KEYVAULT_URL";
pub const WORKSPACE_ID_ENV: &str = "LOG_ANALYTICS_WORKSPACE_ID";
pub const LOG_ANALYTICS_ENDPOINT_ENV: &str = "LOG_ANALYTICS_ENDPOINT";
pub const HOST_ENV: &str = "MCP_HOST";
pub const PORT_ENV: &str = "MCP_PORT";

/// Listen on all interfaces; TLS and host checks belong to the reverse proxy.
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{name} is not a valid URL ({value}): {reason}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{name} must be a port number, got '{value}'")]
    InvalidPort { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub keyvault_url: Url,
    /// `None` keeps the logs tool disabled for the whole process lifetime
    pub workspace_id: Option<String>,
    pub log_analytics_endpoint: Url,
    pub host: String,
    pub port: u16,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_http_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        name,
        value: value.to_string(),
        reason,
    };

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "https" | "http" if url.has_host() => Ok(url),
        "https" | "http" => Err(invalid("missing host".to_string())),
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map here).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let keyvault_url = non_empty(lookup(KEYVAULT_URL_ENV))
            .ok_or(ConfigError::Missing(KEYVAULT_URL_ENV))?;
        let keyvault_url = parse_http_url(KEYVAULT_URL_ENV, &keyvault_url)?;

        let log_analytics_endpoint = non_empty(lookup(LOG_ANALYTICS_ENDPOINT_ENV))
            .unwrap_or_else(|| DEFAULT_LOG_ANALYTICS_ENDPOINT.to_string());
        let log_analytics_endpoint =
            parse_http_url(LOG_ANALYTICS_ENDPOINT_ENV, &log_analytics_endpoint)?;

        let port = match non_empty(lookup(PORT_ENV)) {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::InvalidPort {
                name: PORT_ENV,
                value,
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            keyvault_url,
            workspace_id: non_empty(lookup(WORKSPACE_ID_ENV)),
            log_analytics_endpoint,
            host: non_empty(lookup(HOST_ENV)).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
        })
    }

    pub fn logs_enabled(&self) -> bool {
        self.workspace_id.is_some()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_minimal_config() {
        let config = Config::from_lookup(lookup(&[(
            KEYVAULT_URL_ENV,
            "https://myvault.vault.azure.net/",
        )]))
        .unwrap();

        assert_eq!(config.keyvault_url.host_str(), Some("myvault.vault.azure.net"));
        assert!(!config.logs_enabled());
        assert_eq!(config.log_analytics_endpoint.as_str(), "https://api.loganalytics.io/");
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_missing_vault_url_fails() {
        assert_eq!(
            Config::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::Missing(KEYVAULT_URL_ENV)
        );
        assert_eq!(
            Config::from_lookup(lookup(&[(KEYVAULT_URL_ENV, "   ")])).unwrap_err(),
            ConfigError::Missing(KEYVAULT_URL_ENV)
        );
    }

    #[test]
    fn test_invalid_vault_url_fails() {
        let err = Config::from_lookup(lookup(&[(KEYVAULT_URL_ENV, "myvault")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { name: KEYVAULT_URL_ENV, .. }));

        let err =
            Config::from_lookup(lookup(&[(KEYVAULT_URL_ENV, "ftp://myvault.example")])).unwrap_err();
        assert!(err.to_string().contains("unsupported scheme 'ftp'"));
    }

    #[test]
    fn test_workspace_enables_logs() {
        let config = Config::from_lookup(lookup(&[
            (KEYVAULT_URL_ENV, "https://myvault.vault.azure.net"),
            (WORKSPACE_ID_ENV, "  0f3c6b1e-aaaa-bbbb-cccc-123456789abc "),
        ]))
        .unwrap();
        assert!(config.logs_enabled());
        assert_eq!(
            config.workspace_id.as_deref(),
            Some("0f3c6b1e-aaaa-bbbb-cccc-123456789abc")
        );
    }

    #[test]
    fn test_empty_workspace_is_absent() {
        let config = Config::from_lookup(lookup(&[
            (KEYVAULT_URL_ENV, "https://myvault.vault.azure.net"),
            (WORKSPACE_ID_ENV, ""),
        ]))
        .unwrap();
        assert!(!config.logs_enabled());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            (KEYVAULT_URL_ENV, "https://myvault.vault.azure.net"),
            (HOST_ENV, "127.0.0.1"),
            (PORT_ENV, "8080"),
            (LOG_ANALYTICS_ENDPOINT_ENV, "https://api.loganalytics.azure.cn"),
        ]))
        .unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(
            config.log_analytics_endpoint.host_str(),
            Some("api.loganalytics.azure.cn")
        );

        let err = Config::from_lookup(lookup(&[
            (KEYVAULT_URL_ENV, "https://myvault.vault.azure.net"),
            (PORT_ENV, "http"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidPort {
                name: PORT_ENV,
                value: "http".to_string()
            }
        );
    }
}
