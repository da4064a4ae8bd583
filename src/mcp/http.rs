//! Streamable HTTP transport
//!
//! rmcp's stateless service answers every POST with a one-shot SSE stream.
//! Clients of this server expect plain JSON-RPC replies, so `json_replies`
//! collects that stream and returns its final message as `application/json`.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use serde_json::Value;
use tracing::{info, warn};

use super::server::{KeyVaultService, MCP_PATH};

const JSON: &str = "application/json";
const EVENT_STREAM: &str = "text/event-stream";
/// rmcp rejects POSTs that do not accept both encodings.
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// Axum router serving the MCP endpoint at [`MCP_PATH`].
pub fn router(service: KeyVaultService) -> Router {
    let http_service = StreamableHttpService::new(
        move || Ok(service.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig {
            stateful_mode: false,
            ..Default::default()
        },
    );

    Router::new()
        .nest_service(MCP_PATH, http_service)
        .layer(middleware::from_fn(json_replies))
}

/// Turn the SSE reply to a POST into a single JSON body.
///
/// Use with `axum::middleware::from_fn(json_replies)`.
async fn json_replies(mut req: Request, next: Next) -> Response {
    if req.method() != Method::POST {
        return next.run(req).await;
    }
    req.headers_mut()
        .insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_BOTH));

    let resp = next.run(req).await;
    let is_stream = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with(EVENT_STREAM));
    if !is_stream {
        return resp;
    }

    let (mut parts, body) = resp.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read MCP reply stream: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    match final_reply(&String::from_utf8_lossy(&bytes)) {
        Some(message) => {
            parts
                .headers
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON));
            Response::from_parts(parts, Body::from(message.to_string()))
        }
        None => {
            parts.headers.remove(header::CONTENT_TYPE);
            Response::from_parts(parts, Body::empty())
        }
    }
}

/// Last JSON-RPC response (`result` or `error`) carried by an SSE body.
fn final_reply(stream: &str) -> Option<Value> {
    stream
        .replace("\r\n", "\n")
        .split("\n\n")
        .filter_map(|event| {
            let data: Vec<&str> = event
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|d| d.strip_prefix(' ').unwrap_or(d))
                .collect();
            if data.is_empty() {
                return None;
            }
            serde_json::from_str::<Value>(&data.join("\n")).ok()
        })
        .filter(|message| message.get("result").is_some() || message.get("error").is_some())
        .last()
}

/// Run the MCP server over Streamable HTTP in stateless mode
pub async fn run_http_server(service: KeyVaultService, bind_address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!(
        "Listening on http://{}{}",
        listener.local_addr()?,
        MCP_PATH
    );

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::server::tests::vault_with;
    use crate::mcp::server::LogsCapability;
    use serde_json::json;

    async fn spawn_server(service: KeyVaultService) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(service)).await.unwrap();
        });
        format!("http://{}{}", addr, MCP_PATH)
    }

    async fn post(url: &str, accept: &str, message: Value) -> (String, Value) {
        let resp = reqwest::Client::new()
            .post(url)
            .header("Accept", accept)
            .json(&message)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        (content_type, resp.json().await.unwrap())
    }

    async fn call_tool(url: &str, id: u64, name: &str, arguments: Value) -> (String, Value) {
        post(
            url,
            ACCEPT_BOTH,
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "tools/call",
                "params": {"name": name, "arguments": arguments}
            }),
        )
        .await
    }

    fn tool_payload(reply: &Value) -> Value {
        let text = reply["result"]["content"][0]["text"]
            .as_str()
            .expect("text content");
        serde_json::from_str(text).expect("tool output is JSON")
    }

    #[test]
    fn test_final_reply_picks_last_response() {
        let stream = "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{}}\n\n\
                      id: 0\r\ndata: {\"jsonrpc\":\"2.0\",\"id\":7,\r\ndata: \"result\":{\"ok\":true}}\r\n\r\n";
        assert_eq!(
            final_reply(stream),
            Some(json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}}))
        );
    }

    #[test]
    fn test_final_reply_ignores_streams_without_response() {
        assert_eq!(final_reply(""), None);
        assert_eq!(final_reply(": keep-alive\n\ndata: not json\n\n"), None);
    }

    #[tokio::test]
    async fn test_tools_list_over_http() {
        let url = spawn_server(KeyVaultService::new(
            vault_with(&[]),
            LogsCapability::NotConfigured,
        ))
        .await;

        let (content_type, reply) = post(
            &url,
            ACCEPT_BOTH,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {}}),
        )
        .await;

        assert!(content_type.starts_with(JSON));
        assert_eq!(reply["id"], 1);
        let mut names: Vec<&str> = reply["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        names.sort();
        assert_eq!(names, vec!["getSecret", "listSecrets", "queryKeyVaultLogs"]);
    }

    #[tokio::test]
    async fn test_tool_calls_reply_with_json() {
        let url = spawn_server(KeyVaultService::new(
            vault_with(&["api-key", "db-password"]),
            LogsCapability::NotConfigured,
        ))
        .await;

        let (content_type, reply) = call_tool(&url, 2, "listSecrets", json!({})).await;
        assert!(content_type.starts_with(JSON));
        assert_eq!(
            tool_payload(&reply),
            json!({"secrets": ["api-key", "db-password"]})
        );

        let (_, reply) = call_tool(&url, 3, "getSecret", json!({"secretName": "db-password"})).await;
        assert_eq!(reply["id"], 3);
        assert_eq!(
            tool_payload(&reply),
            json!({
                "name": "db-password",
                "value": "value-of-db-password",
                "contentType": "text/plain",
                "createdOn": null,
                "updatedOn": null
            })
        );

        let (_, reply) = call_tool(
            &url,
            4,
            "queryKeyVaultLogs",
            json!({"query": "AzureDiagnostics | take 1"}),
        )
        .await;
        assert!(reply.get("error").is_none());
        assert_eq!(
            tool_payload(&reply),
            json!({
                "error": "Log Analytics not configured. Set LOG_ANALYTICS_WORKSPACE_ID environment variable."
            })
        );
    }

    #[tokio::test]
    async fn test_missing_secret_is_json_rpc_error() {
        let url = spawn_server(KeyVaultService::new(
            vault_with(&["a"]),
            LogsCapability::NotConfigured,
        ))
        .await;

        let (content_type, reply) =
            call_tool(&url, 5, "getSecret", json!({"secretName": "does-not-exist"})).await;

        assert!(content_type.starts_with(JSON));
        assert_eq!(reply["id"], 5);
        assert!(reply.get("result").is_none());
        assert!(reply["error"]["message"]
            .as_str()
            .unwrap()
            .contains("does-not-exist"));
    }

    #[tokio::test]
    async fn test_json_only_client_is_accepted() {
        let url = spawn_server(KeyVaultService::new(
            vault_with(&["a"]),
            LogsCapability::NotConfigured,
        ))
        .await;

        let (content_type, reply) = post(
            &url,
            JSON,
            json!({
                "jsonrpc": "2.0",
                "id": 6,
                "method": "tools/call",
                "params": {"name": "listSecrets", "arguments": {}}
            }),
        )
        .await;

        assert!(content_type.starts_with(JSON));
        assert_eq!(tool_payload(&reply), json!({"secrets": ["a"]}));
    }
}
