// PostgreSQL backend using connection pooling
use crate::api::middleware::AppError;
use crate::models::{ColumnDescriptor, Row, TableKind};
use crate::services::database::adapter::{RelationalBackend, RelationalTableInfo};
use crate::services::database::{mask_credentials, BackendKind};
use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, PoolConfig as PoolSize, RecyclingMethod, Runtime};
use serde_json::{json, Value};
use std::error::Error;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::NoTls;
use url::Url;

pub struct PostgreSQLBackend {
    pool: Pool,
}

impl PostgreSQLBackend {
    /// Build a pooled backend. No connection is opened until first use, so an
    /// unreachable server shows up as a connection error during introspection.
    pub fn connect(connection_url: &str, max_pool_size: usize) -> Result<Self, AppError> {
        // Validate PostgreSQL URL format
        let url = Url::parse(connection_url)
            .map_err(|e| AppError::Configuration(format!("Invalid PostgreSQL URL: {}", e)))?;

        if url.scheme() != "postgresql" && url.scheme() != "postgres" {
            return Err(AppError::Configuration(
                "URL must use postgresql:// or postgres:// scheme".to_string(),
            ));
        }

        tracing::info!(
            "Creating connection pool for: {} (max_size: {})",
            mask_credentials(connection_url),
            max_pool_size
        );

        let mut cfg = PoolConfig::new();
        cfg.url = Some(connection_url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolSize::new(max_pool_size.max(1)));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| {
                tracing::error!("Failed to create connection pool: {}", e);
                AppError::Connection(format!("Failed to create connection pool: {}", e))
            })?;

        Ok(Self { pool })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, AppError> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to get connection from pool: {}", e)))
    }
}

#[async_trait::async_trait]
impl RelationalBackend for PostgreSQLBackend {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::PostgreSQL
    }

    async fn list_schemas(&self) -> Result<Vec<String>, AppError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT schema_name::text FROM information_schema.schemata \
                 WHERE schema_name NOT IN ('pg_catalog', 'information_schema', 'pg_toast') \
                 AND schema_name NOT LIKE 'pg_temp_%' \
                 ORDER BY schema_name",
                &[],
            )
            .await
            .map_err(|e| AppError::Introspection(format!("Failed to get schemas: {}", e)))?;

        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>, AppError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = $1 \
                 AND table_type IN ('BASE TABLE', 'VIEW', 'FOREIGN') \
                 ORDER BY table_name",
                &[&schema],
            )
            .await
            .map_err(|e| AppError::Introspection(format!("Failed to list tables in {}: {}", schema, e)))?;

        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    async fn describe_table(&self, schema: &str, table: &str) -> Result<RelationalTableInfo, AppError> {
        let client = self.client().await?;

        let kind_row = client
            .query_opt(
                "SELECT table_type::text FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2",
                &[&schema, &table],
            )
            .await
            .map_err(|e| AppError::Introspection(format!("Failed to describe {}.{}: {}", schema, table, e)))?
            .ok_or_else(|| AppError::NotFound(format!("Table {}.{} not found", schema, table)))?;
        let kind = TableKind::from_backend(&kind_row.get::<_, String>(0));

        let columns = client
            .query(
                "SELECT column_name::text, data_type::text FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 \
                 ORDER BY ordinal_position",
                &[&schema, &table],
            )
            .await
            .map_err(|e| AppError::Introspection(format!("Failed to get columns of {}.{}: {}", schema, table, e)))?
            .iter()
            .map(|row| ColumnDescriptor::new(row.get::<_, String>(0), row.get::<_, String>(1)))
            .collect();

        // reltuples is an estimate and is -1 for never-analyzed tables
        let stats = client
            .query_opt(
                "SELECT c.reltuples::bigint, obj_description(c.oid, 'pg_class') \
                 FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = $1 AND c.relname = $2",
                &[&schema, &table],
            )
            .await
            .map_err(|e| AppError::Introspection(format!("Failed to get statistics of {}.{}: {}", schema, table, e)))?;

        let (row_estimate, description) = match stats {
            Some(row) => {
                let estimate: Option<i64> = row.get(0);
                let description: Option<String> = row.get(1);
                let estimate = match kind {
                    TableKind::Table => estimate.filter(|n| *n >= 0).map(|n| n as u64),
                    _ => None,
                };
                (estimate, description)
            }
            None => (None, None),
        };

        Ok(RelationalTableInfo {
            kind,
            columns,
            row_estimate,
            description,
        })
    }

    async fn execute(&self, sql: &str) -> Result<Vec<Row>, AppError> {
        let client = self.client().await?;

        let rows = client.query(sql, &[]).await.map_err(|e| {
            let message = match e.as_db_error() {
                Some(db_error) => db_error.message().to_string(),
                None => e.to_string(),
            };
            AppError::Execution(message)
        })?;

        Ok(rows.iter().map(Self::row_to_json).collect())
    }
}

impl PostgreSQLBackend {
    fn row_to_json(row: &tokio_postgres::Row) -> Row {
        let mut row_obj = Row::new();
        for (idx, column) in row.columns().iter().enumerate() {
            row_obj.insert(column.name().to_string(), Self::cell_to_json(row, idx, column.type_()));
        }
        row_obj
    }

    fn cell_to_json(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Value {
        fn opt<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize) -> Option<T> {
            row.try_get::<_, Option<T>>(idx).ok().flatten()
        }

        match *ty {
            Type::BOOL => opt::<bool>(row, idx).map(Value::Bool),
            Type::INT2 => opt::<i16>(row, idx).map(|v| json!(v)),
            Type::INT4 => opt::<i32>(row, idx).map(|v| json!(v)),
            Type::INT8 => opt::<i64>(row, idx).map(|v| json!(v)),
            Type::OID => opt::<u32>(row, idx).map(|v| json!(v)),
            Type::FLOAT4 => opt::<f32>(row, idx).map(|v| json!(v)),
            Type::FLOAT8 => opt::<f64>(row, idx).map(|v| json!(v)),
            Type::NUMERIC => opt::<NumericText>(row, idx).map(|v| v.into_json()),
            Type::TIMESTAMP => opt::<chrono::NaiveDateTime>(row, idx).map(|v| json!(v.to_string())),
            Type::TIMESTAMPTZ => {
                opt::<chrono::DateTime<chrono::Utc>>(row, idx).map(|v| json!(v.to_rfc3339()))
            }
            Type::DATE => opt::<chrono::NaiveDate>(row, idx).map(|v| json!(v.to_string())),
            Type::TIME => opt::<chrono::NaiveTime>(row, idx).map(|v| json!(v.to_string())),
            Type::JSON | Type::JSONB => opt::<Value>(row, idx),
            _ => match row.try_get::<_, Option<String>>(idx) {
                Ok(v) => v.map(Value::String),
                // Types without a text mapping are shown by name
                Err(_) => Some(json!(format!("<{}>", ty.name()))),
            },
        }
        .unwrap_or(Value::Null)
    }
}

/// NUMERIC decoded from the binary wire format into its decimal text
struct NumericText(String);

impl NumericText {
    fn into_json(self) -> Value {
        if let Ok(v) = self.0.parse::<i64>() {
            return json!(v);
        }
        match self.0.parse::<f64>() {
            Ok(v) if v.is_finite() => json!(v),
            _ => Value::String(self.0),
        }
    }
}

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        decode_numeric(raw).map(NumericText)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

// Layout: ndigits, weight, sign, dscale (all i16/u16), then ndigits base-10000 digits
fn decode_numeric(raw: &[u8]) -> Result<String, Box<dyn Error + Sync + Send>> {
    if raw.len() < 8 {
        return Err("numeric value too short".into());
    }
    let read = |i: usize| u16::from_be_bytes([raw[i], raw[i + 1]]);
    let ndigits = read(0) as usize;
    let weight = read(2) as i16 as i32;
    let sign = read(4);
    let dscale = read(6) as usize;

    if sign == 0xC000 {
        return Ok("NaN".to_string());
    }
    if raw.len() < 8 + ndigits * 2 {
        return Err("numeric value truncated".into());
    }

    let digits: Vec<u16> = (0..ndigits).map(|i| read(8 + i * 2)).collect();
    let digit_at = |pos: i32| -> u16 {
        if pos >= 0 && (pos as usize) < digits.len() {
            digits[pos as usize]
        } else {
            0
        }
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for pos in 0..=weight {
            if pos == 0 {
                out.push_str(&digit_at(pos).to_string());
            } else {
                out.push_str(&format!("{:04}", digit_at(pos)));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::new();
        let mut pos = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit_at(pos)));
            pos += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}
