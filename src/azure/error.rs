//! Errors raised while talking to Azure endpoints

use reqwest::{Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success reply from a service, with the code/message from its error body
    #[error("{code} ({status}): {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("Credential unavailable: {0}")]
    Credential(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl AzureError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AzureError::Api { status, .. } => Some(*status),
            AzureError::Http(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

pub type AzureResult<T> = Result<T, AzureError>;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Pass a successful response through; turn anything else into `AzureError::Api`.
///
/// Key Vault and Log Analytics both answer failures with
/// `{"error": {"code": ..., "message": ...}}`. Bodies that don't match are
/// reported verbatim.
pub async fn check_response(resp: Response) -> AzureResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(api_error(status, &body))
}

pub(crate) fn api_error(status: StatusCode, body: &str) -> AzureError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => AzureError::Api {
            status,
            code: envelope
                .error
                .code
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Error").to_string()),
            message: envelope.error.message.unwrap_or_default(),
        },
        Err(_) => AzureError::Api {
            status,
            code: status.canonical_reason().unwrap_or("Error").to_string(),
            message: body.trim().to_string(),
        },
    }
}
