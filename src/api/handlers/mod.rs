pub mod query;
pub mod schema;

use crate::services::QueryPipeline;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<QueryPipeline>,
}
