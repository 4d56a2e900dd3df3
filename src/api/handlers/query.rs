use axum::{extract::State, Json};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::{PipelineResponse, QuestionRequest};

/// Answer a natural-language question (or run SQL given directly).
///
/// Pipeline failures still return 200 with `success: false`; only an empty
/// question is rejected up front.
pub async fn answer_question(
    State(state): State<AppState>,
    Json(payload): Json<QuestionRequest>,
) -> Result<Json<PipelineResponse>, AppError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("Question cannot be empty".to_string()));
    }

    tracing::info!("Answering question: {}", question);
    let response = state.pipeline.run(question).await;
    Ok(Json(response))
}
