// BigQuery backend over the v2 REST API
use crate::api::middleware::AppError;
use crate::config::WarehouseConfig;
use crate::models::{ColumnDescriptor, Row, TableDescriptor, TableKind};
use crate::services::database::adapter::WarehouseBackend;
use chrono::{DateTime, Utc};
use reqwest::{Client as HttpClient, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Server-side wait per `jobs.query` / `getQueryResults` round trip
const QUERY_POLL_TIMEOUT_MS: u64 = 10_000;

pub struct BigQueryBackend {
    http_client: HttpClient,
    base_url: String,
    project_id: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetList {
    #[serde(default)]
    datasets: Vec<DatasetEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetEntry {
    dataset_reference: DatasetReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    dataset_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableList {
    #[serde(default)]
    tables: Vec<TableEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableEntry {
    table_reference: TableReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    table_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    #[serde(rename = "type")]
    table_type: Option<String>,
    description: Option<String>,
    num_rows: Option<String>,
    creation_time: Option<String>,
    last_modified_time: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    schema: Option<TableSchema>,
}

#[derive(Debug, Default, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    mode: Option<String>,
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

impl FieldSchema {
    fn is_repeated(&self) -> bool {
        self.mode.as_deref() == Some("REPEATED")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    #[serde(default)]
    v: Value,
}

impl BigQueryBackend {
    pub fn new(config: &WarehouseConfig) -> Result<Self, AppError> {
        let project_id = config
            .project_id
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::Configuration("BIGQUERY_PROJECT_ID is not set".to_string()))?;
        let access_token = config
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Configuration("BIGQUERY_ACCESS_TOKEN is not set".to_string()))?;

        Ok(Self {
            http_client: HttpClient::new(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            project_id,
            access_token,
        })
    }

    fn project_url(&self) -> String {
        format!("{}/projects/{}", self.base_url, self.project_id)
    }

    /// Send an authorized request; API rejections are mapped through `rejected`
    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
        rejected: fn(String) -> AppError,
    ) -> Result<T, AppError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to reach BigQuery: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body["error"]["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("BigQuery returned status {}", status));
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(AppError::Connection(message));
            }
            return Err(rejected(message));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse BigQuery response: {}", e)))
    }

    fn millis_to_datetime(raw: Option<&str>) -> Option<DateTime<Utc>> {
        raw.and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
    }

    fn rows_to_json(schema: &TableSchema, rows: Vec<TableRow>) -> Vec<Row> {
        rows.into_iter()
            .map(|row| Self::record_to_json(&schema.fields, row.f))
            .collect()
    }

    fn record_to_json(fields: &[FieldSchema], cells: Vec<Cell>) -> Row {
        let mut row_obj = Row::new();
        for (field, cell) in fields.iter().zip(cells) {
            row_obj.insert(field.name.clone(), Self::cell_to_json(field, cell.v));
        }
        row_obj
    }

    fn cell_to_json(field: &FieldSchema, raw: Value) -> Value {
        if raw.is_null() {
            return Value::Null;
        }

        if field.is_repeated() {
            let items = match raw {
                Value::Array(items) => items,
                other => return other,
            };
            return Value::Array(
                items
                    .into_iter()
                    .map(|item| Self::scalar_or_record(field, item.get("v").cloned().unwrap_or(Value::Null)))
                    .collect(),
            );
        }

        Self::scalar_or_record(field, raw)
    }

    fn scalar_or_record(field: &FieldSchema, raw: Value) -> Value {
        if raw.is_null() {
            return Value::Null;
        }

        match field.field_type.to_uppercase().as_str() {
            "RECORD" | "STRUCT" => {
                let cells: Vec<Cell> = raw
                    .get("f")
                    .cloned()
                    .and_then(|f| serde_json::from_value(f).ok())
                    .unwrap_or_default();
                Value::Object(Self::record_to_json(&field.fields, cells))
            }
            other => {
                let text = match raw {
                    Value::String(s) => s,
                    other_value => return other_value,
                };
                match other {
                    "INTEGER" | "INT64" => text.parse::<i64>().map(|v| json!(v)).unwrap_or(Value::String(text)),
                    "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => text
                        .parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .map(|v| json!(v))
                        .unwrap_or(Value::String(text)),
                    "BOOLEAN" | "BOOL" => match text.as_str() {
                        "true" => Value::Bool(true),
                        "false" => Value::Bool(false),
                        _ => Value::String(text),
                    },
                    // Timestamps arrive as fractional epoch seconds
                    "TIMESTAMP" => text
                        .parse::<f64>()
                        .ok()
                        .and_then(|secs| DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64))
                        .map(|ts| json!(ts.to_rfc3339()))
                        .unwrap_or(Value::String(text)),
                    "JSON" => serde_json::from_str(&text).unwrap_or(Value::String(text)),
                    _ => Value::String(text),
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl WarehouseBackend for BigQueryBackend {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn list_containers(&self) -> Result<Vec<String>, AppError> {
        let mut datasets = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.http_client.get(format!("{}/datasets", self.project_url()));
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: DatasetList = self.call(request, AppError::Introspection).await?;
            datasets.extend(page.datasets.into_iter().map(|d| d.dataset_reference.dataset_id));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(datasets)
    }

    async fn list_tables(&self, container_id: &str) -> Result<Vec<String>, AppError> {
        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(format!("{}/datasets/{}/tables", self.project_url(), container_id));
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: TableList = self.call(request, AppError::Introspection).await?;
            tables.extend(page.tables.into_iter().map(|t| t.table_reference.table_id));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(tables)
    }

    async fn describe_table(&self, container_id: &str, table: &str) -> Result<TableDescriptor, AppError> {
        let request = self.http_client.get(format!(
            "{}/datasets/{}/tables/{}",
            self.project_url(),
            container_id,
            table
        ));
        let resource: TableResource = self.call(request, AppError::Introspection).await?;

        let columns = resource
            .schema
            .unwrap_or_default()
            .fields
            .into_iter()
            .map(|field| {
                let declared = if field.is_repeated() {
                    "ARRAY".to_string()
                } else {
                    field.field_type
                };
                ColumnDescriptor::new(field.name, declared)
            })
            .collect();

        let kind = TableKind::from_backend(resource.table_type.as_deref().unwrap_or("TABLE"));
        let mut descriptor = TableDescriptor::new(container_id, table, kind)
            .with_columns(columns)
            .with_row_count(resource.num_rows.as_deref().and_then(|n| n.parse::<u64>().ok()))
            .with_description(resource.description);
        descriptor.created_at = Self::millis_to_datetime(resource.creation_time.as_deref());
        descriptor.modified_at = Self::millis_to_datetime(resource.last_modified_time.as_deref());
        descriptor.labels = (!resource.labels.is_empty()).then_some(resource.labels);

        Ok(descriptor)
    }

    async fn execute(&self, sql: &str, row_cap: usize) -> Result<Vec<Row>, AppError> {
        let request = self
            .http_client
            .post(format!("{}/queries", self.project_url()))
            .json(&json!({
                "query": sql,
                "useLegacySql": false,
                "maxResults": row_cap,
                "timeoutMs": QUERY_POLL_TIMEOUT_MS,
            }));
        let mut response: QueryResponse = self.call(request, AppError::Execution).await?;

        // Long-running jobs come back incomplete; poll until the first page is ready
        while !response.job_complete {
            let job = response
                .job_reference
                .as_ref()
                .ok_or_else(|| AppError::Execution("Query job did not return a job reference".to_string()))?;
            tracing::debug!("Waiting for BigQuery job {}", job.job_id);

            let mut request = self
                .http_client
                .get(format!("{}/queries/{}", self.project_url(), job.job_id))
                .query(&[
                    ("maxResults", row_cap.to_string()),
                    ("timeoutMs", QUERY_POLL_TIMEOUT_MS.to_string()),
                ]);
            if let Some(location) = &job.location {
                request = request.query(&[("location", location.as_str())]);
            }
            response = self.call(request, AppError::Execution).await?;
        }

        let schema = response.schema.unwrap_or_default();
        let mut rows = Self::rows_to_json(&schema, response.rows);
        rows.truncate(row_cap);
        Ok(rows)
    }
}
