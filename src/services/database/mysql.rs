// MySQL backend using connection pooling
use crate::api::middleware::AppError;
use crate::models::{ColumnDescriptor, Row, TableKind};
use crate::services::database::adapter::{RelationalBackend, RelationalTableInfo};
use crate::services::database::{mask_credentials, BackendKind};
use mysql_async::{prelude::*, Conn, Opts, Pool, Row as MySqlRow, Value as MySqlValue};
use serde_json::{json, Value};
use url::Url;

const SYSTEM_SCHEMAS: &str = "('information_schema', 'mysql', 'performance_schema', 'sys')";

pub struct MySQLBackend {
    pool: Pool,
}

impl MySQLBackend {
    pub fn new(connection_url: &str) -> Result<Self, AppError> {
        // Validate MySQL URL format
        let url = Url::parse(connection_url)
            .map_err(|e| AppError::Configuration(format!("Invalid MySQL URL: {}", e)))?;

        if url.scheme() != "mysql" && url.scheme() != "mariadb" {
            return Err(AppError::Configuration("URL must use mysql:// or mariadb:// scheme".to_string()));
        }

        // mysql_async only understands the mysql:// scheme
        let normalized = connection_url.replacen("mariadb://", "mysql://", 1);
        let opts = Opts::from_url(&normalized)
            .map_err(|e| AppError::Configuration(format!("Invalid MySQL URL: {}", e)))?;

        tracing::info!("Creating MySQL pool for: {}", mask_credentials(connection_url));

        Ok(Self {
            pool: Pool::new(opts),
        })
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<Conn, AppError> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to get MySQL connection from pool: {}", e)))
    }
}

#[async_trait::async_trait]
impl RelationalBackend for MySQLBackend {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::MySQL
    }

    async fn list_schemas(&self) -> Result<Vec<String>, AppError> {
        let mut conn = self.get_conn().await?;
        let query = format!(
            "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA \
             WHERE SCHEMA_NAME NOT IN {} ORDER BY SCHEMA_NAME",
            SYSTEM_SCHEMAS
        );
        conn.query(query)
            .await
            .map_err(|e| AppError::Introspection(format!("Failed to get schemas: {}", e)))
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>, AppError> {
        let mut conn = self.get_conn().await?;
        conn.exec(
            "SELECT TABLE_NAME FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = ? ORDER BY TABLE_NAME",
            (schema,),
        )
        .await
        .map_err(|e| AppError::Introspection(format!("Failed to list tables in {}: {}", schema, e)))
    }

    async fn describe_table(&self, schema: &str, table: &str) -> Result<RelationalTableInfo, AppError> {
        let mut conn = self.get_conn().await?;

        let meta: Option<(String, Option<u64>, Option<String>)> = conn
            .exec_first(
                "SELECT TABLE_TYPE, TABLE_ROWS, TABLE_COMMENT FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
                (schema, table),
            )
            .await
            .map_err(|e| AppError::Introspection(format!("Failed to describe {}.{}: {}", schema, table, e)))?;
        let (table_type, row_estimate, comment) =
            meta.ok_or_else(|| AppError::NotFound(format!("Table {}.{} not found", schema, table)))?;

        let columns: Vec<(String, String)> = conn
            .exec(
                "SELECT COLUMN_NAME, DATA_TYPE FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION",
                (schema, table),
            )
            .await
            .map_err(|e| AppError::Introspection(format!("Failed to get columns of {}.{}: {}", schema, table, e)))?;

        let kind = TableKind::from_backend(&table_type);
        Ok(RelationalTableInfo {
            kind,
            columns: columns
                .into_iter()
                .map(|(name, data_type)| ColumnDescriptor::new(name, data_type))
                .collect(),
            row_estimate: if kind == TableKind::Table { row_estimate } else { None },
            description: comment.filter(|c| !c.is_empty()),
        })
    }

    async fn execute(&self, sql: &str) -> Result<Vec<Row>, AppError> {
        let mut conn = self.get_conn().await?;

        let rows: Vec<MySqlRow> = conn
            .query(sql)
            .await
            .map_err(|e| AppError::Execution(e.to_string()))?;

        let mut json_rows = Vec::with_capacity(rows.len());
        for row in rows {
            let mut row_obj = Row::new();
            let columns = row.columns_ref();
            for (idx, column) in columns.iter().enumerate() {
                let value = match row.as_ref(idx) {
                    Some(mysql_val) => Self::mysql_value_to_json(mysql_val.clone()),
                    None => Value::Null,
                };
                row_obj.insert(column.name_str().to_string(), value);
            }
            json_rows.push(row_obj);
        }

        Ok(json_rows)
    }
}

impl MySQLBackend {
    /// Helper function to convert MySQL Value to JSON Value
    fn mysql_value_to_json(mysql_val: MySqlValue) -> Value {
        match mysql_val {
            MySqlValue::NULL => Value::Null,
            MySqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(s) => json!(s),
                Err(_) => Value::Null,
            },
            MySqlValue::Int(i) => json!(i),
            MySqlValue::UInt(u) => json!(u),
            MySqlValue::Float(f) => json!(f),
            MySqlValue::Double(d) => json!(d),
            MySqlValue::Date(y, m, d, h, min, s, _) => {
                json!(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, h, min, s))
            }
            MySqlValue::Time(is_neg, d, h, m, s, _) => {
                let sign = if is_neg { "-" } else { "" };
                let total_hours = d * 24 + h as u32;
                json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
            }
        }
    }
}
