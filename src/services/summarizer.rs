// Human-readable schema text used for prompting and for the /schema endpoint
use crate::models::{SchemaSnapshot, TableDescriptor, TableKind};
use crate::services::database::BackendKind;
use std::collections::BTreeSet;

const LARGE_TABLE_ROWS: u64 = 1_000_000;
const MEDIUM_TABLE_ROWS: u64 = 10_000;
const LARGEST_TABLES_SHOWN: usize = 5;

const RELATIONAL_TYPES: &[(&str, &str)] = &[
    ("integer", "whole number"),
    ("int", "whole number"),
    ("bigint", "large whole number"),
    ("smallint", "small whole number"),
    ("tinyint", "small whole number"),
    ("numeric", "decimal number"),
    ("decimal", "decimal number"),
    ("real", "decimal number"),
    ("double precision", "decimal number"),
    ("double", "decimal number"),
    ("float", "decimal number"),
    ("character varying", "text"),
    ("varchar", "text"),
    ("text", "text"),
    ("char", "single character"),
    ("character", "single character"),
    ("boolean", "true/false"),
    ("bool", "true/false"),
    ("date", "date"),
    ("timestamp", "date and time"),
    ("timestamp without time zone", "date and time"),
    ("datetime", "date and time"),
    ("timestamp with time zone", "date and time with timezone"),
    ("time", "time"),
    ("uuid", "unique identifier"),
    ("json", "JSON data"),
    ("jsonb", "JSON data"),
];

const WAREHOUSE_TYPES: &[(&str, &str)] = &[
    ("STRING", "text"),
    ("INTEGER", "whole number"),
    ("INT64", "whole number"),
    ("FLOAT", "decimal number"),
    ("FLOAT64", "decimal number"),
    ("NUMERIC", "decimal number"),
    ("BOOLEAN", "true/false"),
    ("BOOL", "true/false"),
    ("TIMESTAMP", "timestamp"),
    ("DATETIME", "date and time"),
    ("DATE", "date"),
    ("TIME", "time"),
    ("BYTES", "binary data"),
    ("ARRAY", "array/list"),
    ("STRUCT", "structured object"),
    ("RECORD", "structured record"),
    ("GEOGRAPHY", "geographic data"),
    ("JSON", "JSON data"),
];

/// Renders snapshots as text. Pure; the same snapshot always renders the
/// same way, and the layout does not depend on the backend.
#[derive(Debug, Clone, Copy)]
pub struct SchemaSummarizer {
    dialect: BackendKind,
}

impl SchemaSummarizer {
    pub fn new(dialect: BackendKind) -> Self {
        Self { dialect }
    }

    /// Map a declared column type onto a readable name.
    /// Unrecognized types pass through lower-cased.
    pub fn normalize_type(&self, declared: &str) -> String {
        let declared = declared.trim();
        let lookup = |key: &str| {
            if self.dialect.is_warehouse() {
                let key = key.to_uppercase();
                WAREHOUSE_TYPES.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
            } else {
                let key = key.to_lowercase();
                RELATIONAL_TYPES.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
            }
        };

        // `varchar(255)` resolves through its base type
        let base = declared.split('(').next().unwrap_or(declared).trim();
        lookup(declared)
            .or_else(|| lookup(base))
            .map(str::to_string)
            .unwrap_or_else(|| declared.to_lowercase())
    }

    fn container_label(&self) -> &'static str {
        if self.dialect.is_warehouse() {
            "Dataset"
        } else {
            "Schema"
        }
    }

    pub fn size_bucket(row_count: u64) -> &'static str {
        if row_count > LARGE_TABLE_ROWS {
            "large"
        } else if row_count > MEDIUM_TABLE_ROWS {
            "medium"
        } else {
            "small"
        }
    }

    /// One table block: header line, columns, labels and creation date.
    pub fn summarize_table(&self, table: &TableDescriptor) -> String {
        let mut summary = format!("**{}**", table.qualified_name);

        if let Some(description) = &table.description {
            summary.push_str(&format!(" - {}", description));
        }

        summary.push_str(&format!(" ({})", table.kind.as_str().to_lowercase()));

        if let Some(rows) = table.row_count {
            summary.push_str(&format!(
                " - {} rows ({} table)",
                group_thousands(rows),
                Self::size_bucket(rows)
            ));
        }
        summary.push('\n');

        if !table.columns.is_empty() {
            summary.push_str("  Columns:\n");
            for column in &table.columns {
                summary.push_str(&format!(
                    "    - {}: {}\n",
                    column.name,
                    self.normalize_type(&column.declared_type)
                ));
            }
        }

        if let Some(labels) = table.labels.as_ref().filter(|l| !l.is_empty()) {
            let rendered: Vec<String> = labels.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
            summary.push_str(&format!("  Labels: {}\n", rendered.join(", ")));
        }

        if let Some(created) = table.created_at {
            summary.push_str(&format!("  Created: {}\n", created.format("%Y-%m-%d")));
        }

        summary
    }

    /// Every table, grouped by container in snapshot order; within a
    /// container the largest tables come first.
    pub fn summarize_schema(&self, snapshot: &SchemaSnapshot) -> String {
        if snapshot.is_empty() {
            return "No tables found.".to_string();
        }

        let containers = snapshot.containers();
        let mut summary = format!(
            "Schema contains {} tables across {} {}s:\n\n",
            snapshot.len(),
            containers.len(),
            self.container_label().to_lowercase()
        );

        for container in containers {
            let mut tables: Vec<&TableDescriptor> = snapshot
                .tables()
                .iter()
                .filter(|t| t.container_id == container)
                .collect();
            // Stable: equal row counts keep snapshot order
            tables.sort_by(|a, b| b.row_count.unwrap_or(0).cmp(&a.row_count.unwrap_or(0)));

            summary.push_str(&format!(
                "{}: {} ({} tables)\n",
                self.container_label(),
                container,
                tables.len()
            ));
            for table in tables {
                for line in self.summarize_table(table).lines() {
                    summary.push_str("  ");
                    summary.push_str(line);
                    summary.push('\n');
                }
            }
            summary.push('\n');
        }

        summary.trim_end().to_string()
    }

    /// Aggregate statistics over the whole snapshot.
    pub fn overview(&self, snapshot: &SchemaSnapshot) -> String {
        if snapshot.is_empty() {
            return "No tables available for analysis.".to_string();
        }

        let container_names: BTreeSet<&str> = snapshot.containers().into_iter().collect();

        let mut kind_counts: Vec<(TableKind, usize)> = Vec::new();
        for table in snapshot.tables() {
            match kind_counts.iter_mut().find(|(kind, _)| *kind == table.kind) {
                Some((_, count)) => *count += 1,
                None => kind_counts.push((table.kind, 1)),
            }
        }
        let kinds: Vec<String> = kind_counts
            .iter()
            .map(|(kind, count)| {
                let name = kind.as_str().to_lowercase();
                if *count == 1 {
                    format!("1 {}", name)
                } else {
                    format!("{} {}s", count, name)
                }
            })
            .collect();

        let total_rows: u64 = snapshot.tables().iter().filter_map(|t| t.row_count).sum();

        let mut largest: Vec<&TableDescriptor> = snapshot
            .tables()
            .iter()
            .filter(|t| t.row_count.unwrap_or(0) > 0)
            .collect();
        largest.sort_by(|a, b| b.row_count.cmp(&a.row_count));

        let mut overview = format!(
            "{} Overview:\n\
             - Total tables: {}\n\
             - {}s: {} ({})\n\
             - Table kinds: {}\n\
             - Total rows across all tables: {}\n",
            self.dialect.display_name(),
            snapshot.len(),
            self.container_label(),
            container_names.len(),
            container_names.into_iter().collect::<Vec<_>>().join(", "),
            kinds.join(", "),
            group_thousands(total_rows)
        );

        if !largest.is_empty() {
            overview.push_str("\nLargest tables (by row count):\n");
            for (i, table) in largest.iter().take(LARGEST_TABLES_SHOWN).enumerate() {
                overview.push_str(&format!(
                    "  {}. {} - {} rows\n",
                    i + 1,
                    table.qualified_name,
                    group_thousands(table.row_count.unwrap_or(0))
                ));
            }
        }

        overview
    }

    /// Text handed to the generative backend: overview followed by the
    /// full summary.
    pub fn schema_context(&self, snapshot: &SchemaSnapshot) -> String {
        format!("{}\n{}", self.overview(snapshot), self.summarize_schema(snapshot))
    }
}

/// `1234567` -> `1,234,567`
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
