use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A single column as reported by the backend. Column order inside a table is
/// the backend's ordinal order and is never re-sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TableKind {
    Table,
    View,
    External,
}

impl TableKind {
    /// Map a backend's table type string (`BASE TABLE`, `VIEW`,
    /// `MATERIALIZED_VIEW`, `EXTERNAL`, ...) onto the uniform kinds.
    pub fn from_backend(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        match upper.as_str() {
            "VIEW" | "MATERIALIZED_VIEW" | "MATERIALIZED VIEW" | "SYSTEM VIEW" => TableKind::View,
            "EXTERNAL" | "FOREIGN" | "FOREIGN TABLE" => TableKind::External,
            _ => TableKind::Table,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Table => "TABLE",
            TableKind::View => "VIEW",
            TableKind::External => "EXTERNAL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// `container.table`, unique within a snapshot
    pub qualified_name: String,
    pub container_id: String,
    pub table_name: String,
    pub kind: TableKind,
    pub row_count: Option<u64>,
    pub description: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub labels: Option<BTreeMap<String, String>>,
}

impl TableDescriptor {
    pub fn new(container_id: impl Into<String>, table_name: impl Into<String>, kind: TableKind) -> Self {
        let container_id = container_id.into();
        let table_name = table_name.into();
        Self {
            qualified_name: format!("{}.{}", container_id, table_name),
            container_id,
            table_name,
            kind,
            row_count: None,
            description: None,
            columns: Vec::new(),
            created_at: None,
            modified_at: None,
            labels: None,
        }
    }

    pub fn with_columns(mut self, columns: Vec<ColumnDescriptor>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_row_count(mut self, row_count: Option<u64>) -> Self {
        self.row_count = row_count;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.trim().is_empty());
        self
    }
}

/// Point-in-time capture of every introspected table.
///
/// A snapshot is never mutated after construction; answering a new question
/// reads it through a shared reference.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSnapshot {
    tables: Vec<TableDescriptor>,
    captured_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    /// Build a snapshot from tables in enumeration order. A repeated
    /// qualified name keeps its first occurrence.
    pub fn new(tables: Vec<TableDescriptor>) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(tables.len());
        for table in tables {
            if seen.insert(table.qualified_name.clone()) {
                unique.push(table);
            } else {
                tracing::warn!("Duplicate table {} dropped from snapshot", table.qualified_name);
            }
        }

        Self {
            tables: unique,
            captured_at: Utc::now(),
        }
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn get(&self, qualified_name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.qualified_name == qualified_name)
    }

    /// Container ids in order of first appearance.
    pub fn containers(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.tables
            .iter()
            .map(|t| t.container_id.as_str())
            .filter(|c| seen.insert(*c))
            .collect()
    }

    /// Lower-cased bare table name -> qualified name. When two containers
    /// hold a table of the same name, the first one in snapshot order wins.
    pub fn known_tables(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for table in &self.tables {
            map.entry(table.table_name.to_lowercase())
                .or_insert_with(|| table.qualified_name.clone());
        }
        map
    }
}
