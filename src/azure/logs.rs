//! Azure Monitor Log Analytics query client

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::credential::TokenCredential;
use super::error::{api_error, check_response, AzureError, AzureResult};

pub const LOG_ANALYTICS_SCOPE: &str = "https://api.loganalytics.io/.default";
pub const DEFAULT_LOG_ANALYTICS_ENDPOINT: &str = "https://api.loganalytics.io";

pub fn default_time_span_hours() -> i64 {
    24
}

/// One row per result-table row, keyed by that table's column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogQueryResult {
    pub rows: Vec<Map<String, Value>>,
}

impl LogQueryResult {
    pub fn count(&self) -> usize {
        self.rows.len()
    }
}

/// Query access to a log workspace.
#[async_trait]
pub trait LogQuery: Send + Sync {
    async fn query_logs(&self, query: &str, time_span_hours: i64) -> AzureResult<LogQueryResult>;
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    timespan: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    tables: Vec<QueryTable>,
    /// Present on partial failures alongside whatever tables did complete
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct QueryTable {
    #[serde(default)]
    columns: Vec<QueryColumn>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct QueryColumn {
    name: String,
}

/// ISO 8601 duration for a trailing window ending now.
pub fn timespan(hours: i64) -> String {
    format!("PT{}H", hours)
}

fn flatten_tables(tables: Vec<QueryTable>) -> AzureResult<LogQueryResult> {
    let mut rows = Vec::new();
    for (index, table) in tables.into_iter().enumerate() {
        let columns: Vec<String> = table.columns.into_iter().map(|c| c.name).collect();
        for row in table.rows {
            if row.len() != columns.len() {
                return Err(AzureError::InvalidResponse(format!(
                    "table {} row has {} values for {} columns",
                    index,
                    row.len(),
                    columns.len()
                )));
            }
            rows.push(columns.iter().cloned().zip(row).collect());
        }
    }
    Ok(LogQueryResult { rows })
}

pub struct LogAnalyticsClient {
    client: Client,
    endpoint: Url,
    workspace_id: String,
    credential: Arc<dyn TokenCredential>,
}

impl LogAnalyticsClient {
    pub fn new(endpoint: Url, workspace_id: String, credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            workspace_id,
            credential,
        }
    }

    fn query_url(&self) -> AzureResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                AzureError::InvalidResponse(format!("endpoint cannot be a base: {}", self.endpoint))
            })?
            .pop_if_empty()
            .extend(["v1", "workspaces", self.workspace_id.as_str(), "query"]);
        Ok(url)
    }
}

#[async_trait]
impl LogQuery for LogAnalyticsClient {
    async fn query_logs(&self, query: &str, time_span_hours: i64) -> AzureResult<LogQueryResult> {
        let token = self.credential.get_token(LOG_ANALYTICS_SCOPE).await?;
        let body = QueryBody {
            query,
            timespan: timespan(time_span_hours),
        };

        let resp = self
            .client
            .post(self.query_url()?)
            .bearer_auth(&token.token)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let parsed: QueryResponse = check_response(resp).await?.json().await?;

        if let Some(error) = parsed.error {
            return Err(api_error(
                status,
                &serde_json::json!({ "error": error }).to_string(),
            ));
        }

        let result = flatten_tables(parsed.tables)?;
        debug!(
            workspace = %self.workspace_id,
            hours = time_span_hours,
            rows = result.count(),
            "Log query complete"
        );
        Ok(result)
    }
}
