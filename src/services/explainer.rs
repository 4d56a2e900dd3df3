use crate::models::ExecutionResult;
use crate::services::llm_service::GenerativeBackend;
use std::sync::Arc;

const EXPLAIN_MAX_TOKENS: u32 = 800;
const PREVIEW_ROWS: usize = 5;

/// Plain-language explanation of a query result
pub struct ResultExplainer {
    llm: Arc<dyn GenerativeBackend>,
}

impl ResultExplainer {
    pub fn new(llm: Arc<dyn GenerativeBackend>) -> Self {
        Self { llm }
    }

    /// Never fails: a failed call yields a degraded explanation that
    /// embeds the error.
    pub async fn explain(&self, sql: &str, result: &ExecutionResult, schema_context: &str) -> String {
        let prompt = Self::prompt(sql, result, schema_context);
        match self.llm.complete(&prompt, EXPLAIN_MAX_TOKENS).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!("Explanation degraded: {}", e);
                format!("Error explaining results: {}", e)
            }
        }
    }

    fn prompt(sql: &str, result: &ExecutionResult, schema_context: &str) -> String {
        let rows = &result.rows;
        let preview = &rows[..rows.len().min(PREVIEW_ROWS)];
        let preview_text = serde_json::to_string_pretty(preview).unwrap_or_else(|_| "[]".to_string());
        let cap_note = if result.truncated {
            "\nThe result hit the row limit, so more matching rows may exist. Mention this."
        } else {
            ""
        };

        format!(
            r#"Given this database schema context:
{schema_context}

And this SQL query:
{sql}

Which returned these results in {elapsed} ms (showing first {shown} rows):
{preview_text}{cap_note}

Please provide a clear, human-friendly explanation of:
1. What the query is doing
2. What the results mean
3. Any interesting insights from the data
4. Total number of results: {total}

Keep it conversational and accessible to non-technical users."#,
            schema_context = schema_context,
            sql = sql,
            elapsed = result.execution_time_ms,
            shown = preview.len(),
            preview_text = preview_text,
            cap_note = cap_note,
            total = result.row_count,
        )
    }
}
