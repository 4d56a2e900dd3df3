// Schema introspection over relational catalogs and warehouse APIs
use crate::api::middleware::AppError;
use crate::models::{Row, SchemaSnapshot, TableDescriptor};
use crate::services::database::{BackendKind, RelationalBackend, WarehouseBackend};
use crate::validation::SqlValidator;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// Uniform view of a backend's containers and tables.
#[async_trait::async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// Backend kind, which is also the SQL dialect
    fn dialect(&self) -> BackendKind;

    /// Project that scopes system-catalog references. Warehouses only.
    fn catalog_project(&self) -> Option<&str> {
        None
    }

    async fn list_containers(&self) -> Result<Vec<String>, AppError>;

    async fn list_tables(&self, container_id: &str) -> Result<Vec<String>, AppError>;

    async fn describe_table(&self, container_id: &str, table_name: &str) -> Result<TableDescriptor, AppError>;

    /// Execute SQL and return at most `row_cap` rows in projection order
    async fn run_query(&self, sql: &str, row_cap: usize) -> Result<Vec<Row>, AppError>;
}

/// Introspector over a relational database's catalog views.
///
/// Enumeration is unbounded apart from the optional schema allow-list.
pub struct RelationalIntrospector {
    backend: Arc<dyn RelationalBackend>,
    schemas: Vec<String>,
}

impl RelationalIntrospector {
    /// `schemas` restricts enumeration; empty means every non-system schema.
    pub fn new(backend: Arc<dyn RelationalBackend>, schemas: Vec<String>) -> Self {
        Self { backend, schemas }
    }
}

#[async_trait::async_trait]
impl SchemaIntrospector for RelationalIntrospector {
    fn dialect(&self) -> BackendKind {
        self.backend.backend_kind()
    }

    async fn list_containers(&self) -> Result<Vec<String>, AppError> {
        let schemas = self.backend.list_schemas().await?;
        if self.schemas.is_empty() {
            return Ok(schemas);
        }

        Ok(schemas
            .into_iter()
            .filter(|s| self.schemas.iter().any(|allowed| allowed == s))
            .collect())
    }

    async fn list_tables(&self, container_id: &str) -> Result<Vec<String>, AppError> {
        self.backend.list_tables(container_id).await
    }

    async fn describe_table(&self, container_id: &str, table_name: &str) -> Result<TableDescriptor, AppError> {
        let info = self.backend.describe_table(container_id, table_name).await?;
        Ok(TableDescriptor::new(container_id, table_name, info.kind)
            .with_columns(info.columns)
            .with_row_count(info.row_estimate)
            .with_description(info.description))
    }

    async fn run_query(&self, sql: &str, row_cap: usize) -> Result<Vec<Row>, AppError> {
        let capped = SqlValidator::ensure_limit(sql, row_cap as u64, self.dialect());
        let mut rows = self.backend.execute(&capped).await?;
        rows.truncate(row_cap);
        Ok(rows)
    }
}

/// Introspector over a warehouse management API.
///
/// Enumeration is capped: at most `max_containers` datasets and at most
/// `max_tables` tables in each.
pub struct WarehouseIntrospector {
    backend: Arc<dyn WarehouseBackend>,
    max_containers: usize,
    max_tables: usize,
}

impl WarehouseIntrospector {
    pub fn new(backend: Arc<dyn WarehouseBackend>, max_containers: usize, max_tables: usize) -> Self {
        Self {
            backend,
            max_containers,
            max_tables,
        }
    }
}

#[async_trait::async_trait]
impl SchemaIntrospector for WarehouseIntrospector {
    fn dialect(&self) -> BackendKind {
        BackendKind::BigQuery
    }

    fn catalog_project(&self) -> Option<&str> {
        Some(self.backend.project_id())
    }

    async fn list_containers(&self) -> Result<Vec<String>, AppError> {
        let mut containers = self.backend.list_containers().await?;
        if containers.len() > self.max_containers {
            tracing::info!(
                "Limiting introspection to {} of {} datasets",
                self.max_containers,
                containers.len()
            );
            containers.truncate(self.max_containers);
        }
        Ok(containers)
    }

    async fn list_tables(&self, container_id: &str) -> Result<Vec<String>, AppError> {
        let mut tables = self.backend.list_tables(container_id).await?;
        tables.truncate(self.max_tables);
        Ok(tables)
    }

    async fn describe_table(&self, container_id: &str, table_name: &str) -> Result<TableDescriptor, AppError> {
        self.backend.describe_table(container_id, table_name).await
    }

    async fn run_query(&self, sql: &str, row_cap: usize) -> Result<Vec<Row>, AppError> {
        let mut rows = self.backend.execute(sql, row_cap).await?;
        rows.truncate(row_cap);
        Ok(rows)
    }
}

/// Enumerate and describe every reachable table.
///
/// Failing to list containers is fatal, as is a lost connection at any
/// step. A container whose tables cannot be listed, or a table that cannot be
/// described, is otherwise logged and skipped. Tables are described
/// `concurrency` at a time and the snapshot keeps enumeration order.
pub async fn build_snapshot(
    introspector: &dyn SchemaIntrospector,
    concurrency: usize,
) -> Result<SchemaSnapshot, AppError> {
    let concurrency = concurrency.max(1);

    let containers = introspector.list_containers().await.map_err(fatal)?;
    tracing::info!("Introspecting {} containers", containers.len());

    let listings: Vec<(String, Result<Vec<String>, AppError>)> = stream::iter(containers)
        .map(move |container| async move {
            let tables = introspector.list_tables(&container).await;
            (container, tables)
        })
        .buffered(concurrency)
        .collect()
        .await;

    let mut targets = Vec::new();
    for (container, tables) in listings {
        match tables {
            Ok(tables) => targets.extend(tables.into_iter().map(|t| (container.clone(), t))),
            Err(e @ AppError::Connection(_)) => return Err(fatal(e)),
            Err(e) => tracing::warn!("Skipping container {}: {}", container, e),
        }
    }

    let described: Vec<(String, String, Result<TableDescriptor, AppError>)> = stream::iter(targets)
        .map(move |(container, table)| async move {
            let result = introspector.describe_table(&container, &table).await;
            (container, table, result)
        })
        .buffered(concurrency)
        .collect()
        .await;

    let mut tables = Vec::with_capacity(described.len());
    for (container, table, result) in described {
        match result {
            Ok(descriptor) => tables.push(descriptor),
            Err(e @ AppError::Connection(_)) => return Err(fatal(e)),
            Err(e) => tracing::warn!("Skipping table {}.{}: {}", container, table, e),
        }
    }

    let snapshot = SchemaSnapshot::new(tables);
    tracing::info!(
        "Schema snapshot captured: {} tables across {} containers",
        snapshot.len(),
        snapshot.containers().len()
    );
    Ok(snapshot)
}

fn fatal(e: AppError) -> AppError {
    match e {
        AppError::Introspection(_) => e,
        other => AppError::Introspection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDescriptor, TableKind};
    use crate::services::database::{default_schemas, RelationalTableInfo};
    use crate::services::testing::MockIntrospector;
    use serde_json::json;
    use std::sync::Mutex;

    fn table(container: &str, name: &str) -> TableDescriptor {
        TableDescriptor::new(container, name, TableKind::Table)
            .with_columns(vec![ColumnDescriptor::new("id", "integer")])
    }

    #[tokio::test]
    async fn test_one_failing_table_is_skipped() {
        let introspector = MockIntrospector::new(
            BackendKind::PostgreSQL,
            vec![
                table("public", "accounts"),
                table("public", "costs"),
                table("public", "broken"),
                table("billing", "invoices"),
            ],
        )
        .with_failing_table("public.broken");

        let snapshot = build_snapshot(&introspector, 2).await.unwrap();
        let names: Vec<&str> = snapshot.tables().iter().map(|t| t.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["public.accounts", "public.costs", "billing.invoices"]);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_fatal() {
        let introspector = MockIntrospector::new(BackendKind::BigQuery, vec![table("d", "t")]).unreachable();
        let err = build_snapshot(&introspector, 4).await.unwrap_err();
        assert!(matches!(err, AppError::Introspection(_)));
    }

    #[tokio::test]
    async fn test_failing_container_is_skipped() {
        let introspector = MockIntrospector::new(
            BackendKind::PostgreSQL,
            vec![table("public", "accounts"), table("locked", "secrets"), table("billing", "invoices")],
        )
        .with_failing_container("locked");

        let snapshot = tokio_test::assert_ok!(build_snapshot(&introspector, 2).await);
        let names: Vec<&str> = snapshot.tables().iter().map(|t| t.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["public.accounts", "billing.invoices"]);
    }

    #[tokio::test]
    async fn test_connection_loss_while_describing_is_fatal() {
        let introspector = MockIntrospector::new(
            BackendKind::PostgreSQL,
            vec![table("public", "a"), table("public", "b")],
        )
        .with_connection_loss();

        let err = build_snapshot(&introspector, 2).await.unwrap_err();
        assert!(matches!(err, AppError::Introspection(_)));
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_snapshot_order_is_independent_of_concurrency() {
        let tables: Vec<TableDescriptor> = (0..12).map(|i| table("ds", &format!("t{:02}", i))).collect();
        let introspector = MockIntrospector::new(BackendKind::BigQuery, tables);

        let serial = build_snapshot(&introspector, 1).await.unwrap();
        let parallel = build_snapshot(&introspector, 8).await.unwrap();
        let serial_names: Vec<_> = serial.tables().iter().map(|t| t.qualified_name.clone()).collect();
        let parallel_names: Vec<_> = parallel.tables().iter().map(|t| t.qualified_name.clone()).collect();
        assert_eq!(serial_names, parallel_names);
        assert_eq!(serial_names.first().map(String::as_str), Some("ds.t00"));
    }

    struct FakeRelational {
        executed: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl RelationalBackend for FakeRelational {
        fn backend_kind(&self) -> BackendKind {
            BackendKind::PostgreSQL
        }

        async fn list_schemas(&self) -> Result<Vec<String>, AppError> {
            Ok(vec!["analytics".into(), "public".into(), "scratch".into()])
        }

        async fn list_tables(&self, _schema: &str) -> Result<Vec<String>, AppError> {
            Ok(vec!["events".into()])
        }

        async fn describe_table(&self, _schema: &str, _table: &str) -> Result<RelationalTableInfo, AppError> {
            Ok(RelationalTableInfo {
                kind: TableKind::View,
                columns: vec![ColumnDescriptor::new("event_date", "date")],
                row_estimate: None,
                description: Some("daily events".into()),
            })
        }

        async fn execute(&self, sql: &str) -> Result<Vec<Row>, AppError> {
            self.executed.lock().unwrap().push(sql.to_string());
            let mut rows = Vec::new();
            for i in 0..5 {
                let mut row = Row::new();
                row.insert("n".into(), json!(i));
                rows.push(row);
            }
            Ok(rows)
        }
    }

    #[tokio::test]
    async fn test_relational_schema_allow_list() {
        let backend = Arc::new(FakeRelational { executed: Mutex::new(Vec::new()) });
        let introspector = RelationalIntrospector::new(backend.clone(), vec!["public".into(), "analytics".into()]);
        assert_eq!(introspector.list_containers().await.unwrap(), vec!["analytics", "public"]);

        let open = RelationalIntrospector::new(backend, Vec::new());
        assert_eq!(open.list_containers().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_relational_describe_and_capped_query() {
        let backend = Arc::new(FakeRelational { executed: Mutex::new(Vec::new()) });
        let introspector = RelationalIntrospector::new(backend.clone(), Vec::new());

        let descriptor = introspector.describe_table("public", "events").await.unwrap();
        assert_eq!(descriptor.qualified_name, "public.events");
        assert_eq!(descriptor.kind, TableKind::View);
        assert_eq!(descriptor.description.as_deref(), Some("daily events"));

        let rows = introspector.run_query("SELECT n FROM public.events", 3).await.unwrap();
        assert_eq!(rows.len(), 3);
        let executed = backend.executed.lock().unwrap();
        assert_eq!(executed[0], "SELECT n FROM public.events LIMIT 3");
    }

    struct FakeMySql;

    #[async_trait::async_trait]
    impl RelationalBackend for FakeMySql {
        fn backend_kind(&self) -> BackendKind {
            BackendKind::MySQL
        }

        async fn list_schemas(&self) -> Result<Vec<String>, AppError> {
            Ok(vec!["appdb".into()])
        }

        async fn list_tables(&self, _schema: &str) -> Result<Vec<String>, AppError> {
            Ok(vec!["customers".into()])
        }

        async fn describe_table(&self, _schema: &str, _table: &str) -> Result<RelationalTableInfo, AppError> {
            Ok(RelationalTableInfo {
                kind: TableKind::Table,
                columns: vec![ColumnDescriptor::new("id", "int")],
                row_estimate: Some(3),
                description: None,
            })
        }

        async fn execute(&self, _sql: &str) -> Result<Vec<Row>, AppError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_mysql_default_schemas_find_the_database() {
        let schemas = default_schemas(BackendKind::MySQL, Some("mysql://root:pw@db:3306/appdb"));
        let introspector = RelationalIntrospector::new(Arc::new(FakeMySql), schemas);
        let snapshot = build_snapshot(&introspector, 2).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("appdb.customers").is_some());

        let open = RelationalIntrospector::new(Arc::new(FakeMySql), default_schemas(BackendKind::MySQL, None));
        assert_eq!(build_snapshot(&open, 2).await.unwrap().len(), 1);
    }

    struct FakeWarehouse;

    #[async_trait::async_trait]
    impl WarehouseBackend for FakeWarehouse {
        fn project_id(&self) -> &str {
            "analytics-prod"
        }

        async fn list_containers(&self) -> Result<Vec<String>, AppError> {
            Ok((0..15).map(|i| format!("ds{}", i)).collect())
        }

        async fn list_tables(&self, _container_id: &str) -> Result<Vec<String>, AppError> {
            Ok((0..30).map(|i| format!("t{}", i)).collect())
        }

        async fn describe_table(&self, container_id: &str, table: &str) -> Result<TableDescriptor, AppError> {
            Ok(TableDescriptor::new(container_id, table, TableKind::Table))
        }

        async fn execute(&self, _sql: &str, _row_cap: usize) -> Result<Vec<Row>, AppError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_warehouse_enumeration_is_capped() {
        let introspector = WarehouseIntrospector::new(Arc::new(FakeWarehouse), 10, 10);
        assert_eq!(introspector.catalog_project(), Some("analytics-prod"));
        assert_eq!(introspector.dialect(), BackendKind::BigQuery);

        let snapshot = build_snapshot(&introspector, 4).await.unwrap();
        assert_eq!(snapshot.containers().len(), 10);
        assert_eq!(snapshot.len(), 100);
    }
}
