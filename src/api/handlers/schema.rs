use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::{QuestionRequest, TableSuggestionResponse};

/// Schema context used for prompting, building it on first request
pub async fn get_schema(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let context = state.pipeline.schema_context().await?;

    Ok(Json(json!({
        "dialect": context.dialect.as_str(),
        "captured_at": context.snapshot.captured_at().to_rfc3339(),
        "table_count": context.snapshot.len(),
        "containers": context.snapshot.containers(),
        "tables": context.snapshot.tables(),
        "context": context.text,
    })))
}

/// Rank tables for a question without generating SQL
pub async fn suggest_tables(
    State(state): State<AppState>,
    Json(payload): Json<QuestionRequest>,
) -> Result<Json<TableSuggestionResponse>, AppError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("Question cannot be empty".to_string()));
    }

    let suggestions = state.pipeline.suggest_tables(question).await?;
    Ok(Json(suggestions))
}
