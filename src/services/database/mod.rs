// Backend drivers behind the relational and warehouse capability traits
pub mod adapter;
pub mod bigquery;
pub mod mysql;
pub mod postgresql;

pub use adapter::{RelationalBackend, RelationalTableInfo, WarehouseBackend};
pub use bigquery::BigQueryBackend;
pub use mysql::MySQLBackend;
pub use postgresql::PostgreSQLBackend;

use crate::api::middleware::AppError;
use crate::config::Config;
use crate::services::introspector::{RelationalIntrospector, SchemaIntrospector, WarehouseIntrospector};
use std::sync::Arc;

/// Backend kind, which doubles as the SQL dialect flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    PostgreSQL,
    MySQL,
    BigQuery,
}

impl BackendKind {
    pub fn from_str(s: &str) -> Result<Self, AppError> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(BackendKind::PostgreSQL),
            "mysql" | "mariadb" => Ok(BackendKind::MySQL),
            "bigquery" | "bq" => Ok(BackendKind::BigQuery),
            _ => Err(AppError::Validation(format!("Unsupported backend type: {}", s))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::PostgreSQL => "postgresql",
            BackendKind::MySQL => "mysql",
            BackendKind::BigQuery => "bigquery",
        }
    }

    /// Name used when talking to the generative backend about the dialect
    pub fn display_name(&self) -> &'static str {
        match self {
            BackendKind::PostgreSQL => "PostgreSQL",
            BackendKind::MySQL => "MySQL",
            BackendKind::BigQuery => "BigQuery",
        }
    }

    pub fn is_warehouse(&self) -> bool {
        matches!(self, BackendKind::BigQuery)
    }

    /// Warehouse queries fail on bare table names; relational ones resolve
    /// them through the search path.
    pub fn requires_qualified_names(&self) -> bool {
        self.is_warehouse()
    }
}

/// Factory function to create the introspector for the configured backend
pub async fn create_introspector(config: &Config) -> Result<Arc<dyn SchemaIntrospector>, AppError> {
    let kind = BackendKind::from_str(&config.backend.kind)?;
    tracing::info!("Creating {} introspector", kind.display_name());

    match kind {
        BackendKind::PostgreSQL => {
            let url = required_database_url(config)?;
            let backend = PostgreSQLBackend::connect(url, config.database.max_pool_size)?;
            Ok(Arc::new(RelationalIntrospector::new(
                Arc::new(backend),
                config.schema_allowlist(kind),
            )))
        }
        BackendKind::MySQL => {
            let url = required_database_url(config)?;
            let backend = MySQLBackend::new(url)?;
            Ok(Arc::new(RelationalIntrospector::new(
                Arc::new(backend),
                config.schema_allowlist(kind),
            )))
        }
        BackendKind::BigQuery => {
            let backend = BigQueryBackend::new(&config.warehouse)?;
            Ok(Arc::new(WarehouseIntrospector::new(
                Arc::new(backend),
                config.warehouse.max_containers,
                config.warehouse.max_tables_per_container,
            )))
        }
    }
}

/// Schemas introspected when none are configured. PostgreSQL keeps to
/// `public`; a MySQL schema is a database, so it is the one named in the URL
/// path, or every non-system database when the URL names none.
pub fn default_schemas(kind: BackendKind, database_url: Option<&str>) -> Vec<String> {
    match kind {
        BackendKind::PostgreSQL => vec!["public".to_string()],
        BackendKind::MySQL => database_url
            .and_then(|url| url::Url::parse(url).ok())
            .map(|url| url.path().trim_start_matches('/').to_string())
            .filter(|database| !database.is_empty())
            .into_iter()
            .collect(),
        BackendKind::BigQuery => Vec::new(),
    }
}

fn required_database_url(config: &Config) -> Result<&str, AppError> {
    config
        .database
        .url
        .as_deref()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| AppError::Configuration("DATABASE_URL is not set".to_string()))
}

/// Mask credentials in connection URL for safe logging
pub(crate) fn mask_credentials(url: &str) -> String {
    if let Ok(parsed_url) = url::Url::parse(url) {
        let mut masked = parsed_url.clone();
        if parsed_url.password().is_some() {
            let _ = masked.set_password(Some("***"));
        }
        masked.to_string()
    } else {
        "[invalid-url]".to_string()
    }
}
