use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::{query, schema, AppState};

/// Create router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/query", post(query::answer_question))
        .route("/schema", get(schema::get_schema))
        .route("/tables/suggest", post(schema::suggest_tables))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "schema_ready": state.pipeline.is_context_ready(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDescriptor, Row, TableDescriptor, TableKind};
    use crate::services::database::BackendKind;
    use crate::services::testing::{MockIntrospector, ScriptedLlm};
    use crate::services::{PipelineSettings, QueryPipeline};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router(introspector: MockIntrospector, llm: ScriptedLlm) -> Router {
        let pipeline = QueryPipeline::new(Arc::new(introspector), Arc::new(llm), PipelineSettings::default());
        create_router(AppState {
            pipeline: Arc::new(pipeline),
        })
    }

    fn introspector() -> MockIntrospector {
        let mut row = Row::new();
        row.insert("?column?".into(), json!(1));
        MockIntrospector::new(
            BackendKind::BigQuery,
            vec![TableDescriptor::new("billing", "daily_costs", TableKind::Table)
                .with_columns(vec![ColumnDescriptor::new("daily_cost", "FLOAT64")])],
        )
        .with_rows(vec![row])
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(introspector(), ScriptedLlm::replying(&[]));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "OK");
        assert_eq!(body["schema_ready"], false);
    }

    #[tokio::test]
    async fn test_query_endpoint_runs_sql() {
        let app = router(introspector(), ScriptedLlm::replying(&["It returns one."]));
        let response = app
            .oneshot(post_json("/query", json!({"question": "SELECT 1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["sql"], "SELECT 1");
        assert_eq!(body["rows"], json!([{"?column?": 1}]));
        assert_eq!(body["explanation"], "It returns one.");
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_empty_question_is_bad_request() {
        let app = router(introspector(), ScriptedLlm::replying(&[]));
        let response = app
            .oneshot(post_json("/query", json!({"question": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_schema_endpoint() {
        let app = router(introspector(), ScriptedLlm::replying(&[]));
        let response = app
            .oneshot(Request::builder().uri("/schema").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["dialect"], "bigquery");
        assert_eq!(body["table_count"], 1);
        assert!(body["context"].as_str().unwrap().contains("**billing.daily_costs**"));
    }

    #[tokio::test]
    async fn test_schema_unavailable_when_backend_unreachable() {
        let app = router(introspector().unreachable(), ScriptedLlm::replying(&[]));
        let response = app
            .oneshot(Request::builder().uri("/schema").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INTROSPECTION_ERROR");
    }

    #[tokio::test]
    async fn test_suggest_tables_endpoint() {
        let app = router(introspector(), ScriptedLlm::replying(&[]));
        let response = app
            .oneshot(post_json("/tables/suggest", json!({"question": "show daily costs"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["tables"][0]["table"], "billing.daily_costs");
        assert!(body["suggestions"].as_str().unwrap().contains("Relevance:"));
    }
}
