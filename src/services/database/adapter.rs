// Backend capability traits consumed by the schema introspectors
use crate::api::middleware::AppError;
use crate::models::{ColumnDescriptor, Row, TableDescriptor, TableKind};
use crate::services::database::BackendKind;

/// Catalog facts a relational backend reports for one table
#[derive(Debug, Clone)]
pub struct RelationalTableInfo {
    pub kind: TableKind,
    pub columns: Vec<ColumnDescriptor>,
    pub row_estimate: Option<u64>,
    pub description: Option<String>,
}

/// Relational database reached through its catalog views
/// (`information_schema` and friends).
#[async_trait::async_trait]
pub trait RelationalBackend: Send + Sync {
    fn backend_kind(&self) -> BackendKind;

    /// Non-system schemas
    async fn list_schemas(&self) -> Result<Vec<String>, AppError>;

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>, AppError>;

    async fn describe_table(&self, schema: &str, table: &str) -> Result<RelationalTableInfo, AppError>;

    /// Execute SQL and return rows in projection order.
    /// Rejections carry the database's own message.
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, AppError>;
}

/// Columnar warehouse reached through its management API
#[async_trait::async_trait]
pub trait WarehouseBackend: Send + Sync {
    fn project_id(&self) -> &str;

    async fn list_containers(&self) -> Result<Vec<String>, AppError>;

    async fn list_tables(&self, container_id: &str) -> Result<Vec<String>, AppError>;

    async fn describe_table(&self, container_id: &str, table: &str) -> Result<TableDescriptor, AppError>;

    /// Execute SQL returning at most `row_cap` rows
    async fn execute(&self, sql: &str, row_cap: usize) -> Result<Vec<Row>, AppError>;
}
