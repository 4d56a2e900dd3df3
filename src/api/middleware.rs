use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Introspection error: {0}")]
    Introspection(String),

    #[error("Translation failed: {0}")]
    Translation(String),

    /// Carries the backend's rejection message verbatim.
    #[error("{0}")]
    Execution(String),

    #[error("Timeout")]
    Timeout,

    #[error("LLM service error: {0}")]
    LlmService(String),

    #[error("Invalid SQL: {0}")]
    InvalidSql(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code used in error bodies and logs
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::Introspection(_) => "INTROSPECTION_ERROR",
            AppError::Translation(_) => "TRANSLATION_FAILURE",
            AppError::Execution(_) => "EXECUTION_ERROR",
            AppError::Timeout => "TIMEOUT",
            AppError::LlmService(_) => "LLM_SERVICE_ERROR",
            AppError::InvalidSql(_) => "INVALID_SQL",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error_detail) = match self {
            AppError::Introspection(msg) | AppError::Connection(msg) => {
                // The schema could not be loaded, so nothing can be answered yet
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorDetail::new(code, msg)
                        .with_details("Check that the configured backend is reachable."),
                )
            }
            AppError::Validation(msg) | AppError::InvalidSql(msg) => {
                (StatusCode::BAD_REQUEST, ErrorDetail::new(code, msg))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorDetail::new(code, msg)),
            AppError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorDetail::new(code, "Timeout"),
            ),
            AppError::LlmService(msg) => {
                let enhanced_msg = if msg.contains("not configured") {
                    format!("{} Please configure LLM_API_KEY to use natural language queries.", msg)
                } else {
                    msg
                };
                (StatusCode::BAD_GATEWAY, ErrorDetail::new(code, enhanced_msg))
            }
            AppError::Configuration(msg)
            | AppError::Translation(msg)
            | AppError::Execution(msg)
            | AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorDetail::new(code, msg))
            }
        };

        let body = Json(ErrorResponse {
            error: error_detail,
        });

        (status, body).into_response()
    }
}

/// Convert anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}
