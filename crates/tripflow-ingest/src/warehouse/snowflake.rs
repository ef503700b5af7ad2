//! Snowflake SQL API session
//!
//! Statements are submitted to `POST /api/v2/statements`. A `202 Accepted`
//! reply means the statement is still running; its handle is polled until
//! the warehouse returns the final result. No overall deadline is applied,
//! so long bulk loads block the caller until the warehouse answers.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use super::{StatementContext, StatementResult, Warehouse, WarehouseError};
use crate::config::WarehouseConfig;

const STATEMENTS_PATH: &str = "/api/v2/statements";

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    warehouse: &'a str,
    database: &'a str,
    schema: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    bindings: BTreeMap<String, Binding>,
}

#[derive(Debug, Serialize)]
struct Binding {
    #[serde(rename = "type")]
    kind: &'static str,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    code: Option<String>,
    message: Option<String>,
    sql_state: Option<String>,
    statement_handle: Option<String>,
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
    stats: Option<DmlStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<ColumnType>,
}

#[derive(Debug, Deserialize)]
struct ColumnType {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DmlStats {
    #[serde(default)]
    num_rows_inserted: u64,
    #[serde(default)]
    num_rows_updated: u64,
    #[serde(default)]
    num_rows_deleted: u64,
}

impl From<StatementResponse> for StatementResult {
    fn from(response: StatementResponse) -> Self {
        let columns = response
            .result_set_meta_data
            .map(|meta| meta.row_type.into_iter().map(|c| c.name).collect())
            .unwrap_or_default();

        let rows_affected = response
            .stats
            .map(|s| s.num_rows_inserted + s.num_rows_updated + s.num_rows_deleted);

        StatementResult {
            columns,
            rows: response.data,
            rows_affected,
        }
    }
}

/// Session over the Snowflake SQL REST API
pub struct SnowflakeClient {
    client: Client,
    config: WarehouseConfig,
    base_url: String,
}

impl SnowflakeClient {
    pub fn new(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(concat!("tripflow-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: config.base_url(),
            client,
            config,
        })
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.config.token)
            .header("X-Snowflake-Authorization-Token-Type", &self.config.token_type)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn submit(
        &self,
        context: &StatementContext,
        sql: &str,
        bindings: &[String],
    ) -> Result<(StatusCode, StatementResponse), WarehouseError> {
        let body = StatementRequest {
            statement: sql,
            warehouse: context.warehouse.as_deref().unwrap_or(&self.config.warehouse),
            database: context.database.as_deref().unwrap_or(&self.config.database),
            schema: context.schema.as_deref().unwrap_or(&self.config.schema),
            role: context.role.as_deref().or(self.config.role.as_deref()),
            bindings: bindings
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    (
                        (i + 1).to_string(),
                        Binding {
                            kind: "TEXT",
                            value: value.clone(),
                        },
                    )
                })
                .collect(),
        };

        let request_id = Uuid::new_v4().to_string();
        let response = self
            .authorized(self.client.post(format!("{}{}", self.base_url, STATEMENTS_PATH)))
            .query(&[("requestId", request_id.as_str())])
            .json(&body)
            .send()
            .await?;

        read_response(response).await
    }

    async fn poll(&self, handle: &str) -> Result<(StatusCode, StatementResponse), WarehouseError> {
        let response = self
            .authorized(
                self.client
                    .get(format!("{}{}/{}", self.base_url, STATEMENTS_PATH, handle)),
            )
            .send()
            .await?;

        read_response(response).await
    }

    async fn wait_for_completion(
        &self,
        mut status: StatusCode,
        mut body: StatementResponse,
    ) -> Result<StatementResponse, WarehouseError> {
        let interval = self.config.poll_interval().max(Duration::from_millis(1));

        while status == StatusCode::ACCEPTED {
            let handle = body.statement_handle.clone().ok_or_else(|| {
                WarehouseError::Protocol("statement still running but no handle returned".into())
            })?;
            trace!(handle = %handle, "Statement still running");
            tokio::time::sleep(interval).await;
            (status, body) = self.poll(&handle).await?;
        }

        if status.is_success() {
            Ok(body)
        } else {
            Err(WarehouseError::Rejected {
                code: body.code.unwrap_or_else(|| status.as_u16().to_string()),
                sql_state: body.sql_state,
                message: body
                    .message
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string()),
            })
        }
    }
}

async fn read_response(
    response: reqwest::Response,
) -> Result<(StatusCode, StatementResponse), WarehouseError> {
    let status = response.status();
    let text = response.text().await?;

    if text.trim().is_empty() {
        return Ok((status, StatementResponse::default()));
    }

    match serde_json::from_str::<StatementResponse>(&text) {
        Ok(body) => Ok((status, body)),
        Err(_) if !status.is_success() => Ok((
            status,
            StatementResponse {
                message: Some(text),
                ..Default::default()
            },
        )),
        Err(e) => Err(WarehouseError::Protocol(format!("malformed statement response: {}", e))),
    }
}

#[async_trait]
impl Warehouse for SnowflakeClient {
    #[instrument(
        skip(self, context, sql, bindings),
        fields(role = context.role.as_deref(), bindings = bindings.len())
    )]
    async fn execute_in(
        &self,
        context: &StatementContext,
        sql: &str,
        bindings: &[String],
    ) -> Result<StatementResult, WarehouseError> {
        debug!(statement = %first_line(sql), "Submitting statement");
        let (status, body) = self.submit(context, sql, bindings).await?;
        let body = self.wait_for_completion(status, body).await?;
        Ok(body.into())
    }
}

fn first_line(sql: &str) -> &str {
    sql.trim().lines().next().unwrap_or_default()
}
