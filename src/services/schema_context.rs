use crate::models::SchemaSnapshot;
use crate::services::database::BackendKind;
use crate::services::summarizer::SchemaSummarizer;
use std::collections::HashMap;

/// Everything derived once from a snapshot and shared read-only by every
/// request: the snapshot itself, its prompt text and the lookup used to
/// qualify bare table names.
#[derive(Debug)]
pub struct SchemaContext {
    pub snapshot: SchemaSnapshot,
    pub dialect: BackendKind,
    /// Overview followed by the full summary
    pub text: String,
    /// Lower-cased bare table name -> qualified name
    pub known_tables: HashMap<String, String>,
    pub catalog_project: Option<String>,
}

impl SchemaContext {
    pub fn new(snapshot: SchemaSnapshot, dialect: BackendKind, catalog_project: Option<String>) -> Self {
        let text = SchemaSummarizer::new(dialect).schema_context(&snapshot);
        let known_tables = snapshot.known_tables();
        Self {
            snapshot,
            dialect,
            text,
            known_tables,
            catalog_project,
        }
    }
}
