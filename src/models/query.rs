use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One result row, column name -> value, in the query's projection order.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

/// Externally visible outcome of one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineResponse {
    pub sql: String,
    pub rows: Vec<Row>,
    pub explanation: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineResponse {
    pub fn succeeded(sql: String, rows: Vec<Row>, explanation: String) -> Self {
        Self {
            sql,
            rows,
            explanation,
            success: true,
            error: None,
        }
    }

    pub fn failed(sql: String, explanation: String, error: String) -> Self {
        Self {
            sql,
            rows: Vec::new(),
            explanation,
            success: false,
            error: Some(error),
        }
    }
}

/// Result of asking the generative backend for SQL: either usable SQL text
/// or the reason none was produced. Never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationResult {
    Sql(String),
    Failure(String),
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    /// True when the row cap was reached, so more rows may exist
    pub truncated: bool,
}

// ============================================================================
// Table relevance
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelevanceScore {
    pub table: String,
    pub score: u32,
    pub matched_keywords: BTreeSet<String>,
}

#[derive(Debug, Serialize)]
pub struct TableSuggestionResponse {
    pub keywords: Vec<String>,
    pub tables: Vec<RelevanceScore>,
    pub suggestions: String,
}
