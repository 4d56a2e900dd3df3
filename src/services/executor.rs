use crate::api::middleware::AppError;
use crate::models::ExecutionResult;
use crate::services::introspector::SchemaIntrospector;
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_ROW_CAP: usize = 1000;

/// Runs qualified SQL against the configured backend with a row cap
pub struct QueryExecutor {
    introspector: Arc<dyn SchemaIntrospector>,
    row_cap: usize,
}

impl QueryExecutor {
    pub fn new(introspector: Arc<dyn SchemaIntrospector>, row_cap: usize) -> Self {
        Self {
            introspector,
            row_cap: row_cap.max(1),
        }
    }

    /// Execute once. A backend rejection comes back as
    /// `AppError::Execution` with the backend's own message.
    pub async fn execute(&self, sql: &str) -> Result<ExecutionResult, AppError> {
        let start = Instant::now();
        let rows = self
            .introspector
            .run_query(sql, self.row_cap)
            .await
            .inspect_err(|e| tracing::error!("Query execution failed: {}", e))?;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let row_count = rows.len();
        let truncated = row_count >= self.row_cap;
        tracing::info!(
            "Query returned {} rows in {}ms{}",
            row_count,
            execution_time_ms,
            if truncated { " (row cap reached)" } else { "" }
        );

        Ok(ExecutionResult {
            rows,
            row_count,
            execution_time_ms,
            truncated,
        })
    }
}
