//! Best-effort textual repair of generated SQL.
//!
//! This is a regex heuristic, not a parser. It can misfire on text inside
//! string literals or comments (a `FROM orders` inside a quoted string is
//! rewritten like any other), and quoted identifiers are never qualified.
//! Names bound by a `WITH name AS (...)` clause are left as they are, so a
//! CTE that shadows a known table still refers to the CTE.

use crate::services::database::BackendKind;
use crate::services::schema_context::SchemaContext;
use crate::services::translator::is_sql_query;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Returned in place of text that holds no recognizable SQL
pub const DIAGNOSTIC_QUERY: &str = "SELECT 'Invalid SQL query provided' as error_message";

static SQL_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(SELECT|WITH|INSERT|UPDATE|DELETE)\b").expect("static regex"));

// Identifier after FROM/JOIN: backtick-quoted, double-quoted or bare
// (possibly dotted). The whole identifier is captured so a dotted name is
// never qualified a second time.
static TABLE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(FROM|JOIN)(\s+)(`[^`]*`|"[^"]*"|[A-Za-z_][\w.$]*)"#).expect("static regex")
});

// `WITH [RECURSIVE] name AS (` and each following `, name AS (`
static CTE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bWITH(?:\s+RECURSIVE)?|,)\s*([A-Za-z_]\w*)\s+AS\s*\(").expect("static regex")
});

// The preceding character is captured so scoped references such as
// `proj.INFORMATION_SCHEMA.TABLES` are left alone.
static CATALOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|[^\w.`])information_schema\.(tables|schemata)\b").expect("static regex")
});

pub struct SqlQualifier<'a> {
    known_tables: &'a HashMap<String, String>,
    dialect: BackendKind,
    catalog_project: Option<&'a str>,
}

impl<'a> SqlQualifier<'a> {
    /// `known_tables` maps lower-cased bare table names to qualified names.
    pub fn new(
        known_tables: &'a HashMap<String, String>,
        dialect: BackendKind,
        catalog_project: Option<&'a str>,
    ) -> Self {
        Self {
            known_tables,
            dialect,
            catalog_project,
        }
    }

    pub fn from_context(context: &'a SchemaContext) -> Self {
        Self::new(&context.known_tables, context.dialect, context.catalog_project.as_deref())
    }

    /// Extract the SQL, qualify bare table names and, for warehouses,
    /// scope system-catalog references to the project.
    pub fn qualify(&self, text: &str) -> String {
        let sql = match Self::extract_sql(text) {
            Some(sql) => sql,
            None => {
                tracing::debug!("No SQL keyword found, substituting diagnostic query");
                return DIAGNOSTIC_QUERY.to_string();
            }
        };

        let qualified = self.qualify_tables(sql);
        if self.dialect.is_warehouse() {
            self.rewrite_catalog(&qualified)
        } else {
            qualified
        }
    }

    /// Drop everything before the first SQL keyword. Text that already
    /// starts like SQL is kept whole.
    pub fn extract_sql(text: &str) -> Option<&str> {
        let trimmed = text.trim();
        if is_sql_query(trimmed) {
            return Some(trimmed);
        }
        SQL_START_RE.find(trimmed).map(|m| &trimmed[m.start()..])
    }

    fn cte_names(sql: &str) -> HashSet<String> {
        if !SQL_START_RE.find_iter(sql).any(|m| m.as_str().eq_ignore_ascii_case("with")) {
            return HashSet::new();
        }
        CTE_NAME_RE
            .captures_iter(sql)
            .map(|caps| caps[1].to_lowercase())
            .collect()
    }

    fn qualify_tables(&self, sql: &str) -> String {
        let ctes = Self::cte_names(sql);
        TABLE_REF_RE
            .replace_all(sql, |caps: &Captures| {
                let whole = &caps[0];
                let ident = &caps[3];

                if ident.contains('.') || ident.starts_with('`') || ident.starts_with('"') {
                    return whole.to_string();
                }
                // `FROM UNNEST(...)` and other table functions
                let end = caps.get(0).map_or(sql.len(), |m| m.end());
                if sql[end..].trim_start().starts_with('(') {
                    return whole.to_string();
                }

                let key = ident.to_lowercase();
                if ctes.contains(&key) {
                    return whole.to_string();
                }

                match self.known_tables.get(&key) {
                    Some(qualified) => {
                        tracing::debug!("Qualified table {} as {}", ident, qualified);
                        format!("{}{}{}", &caps[1], &caps[2], qualified)
                    }
                    None => whole.to_string(),
                }
            })
            .into_owned()
    }

    fn rewrite_catalog(&self, sql: &str) -> String {
        let Some(project) = self.catalog_project else {
            return sql.to_string();
        };

        CATALOG_RE
            .replace_all(sql, |caps: &Captures| {
                format!(
                    "{}`{}.INFORMATION_SCHEMA.{}`",
                    &caps[1],
                    project,
                    caps[2].to_uppercase()
                )
            })
            .into_owned()
    }
}
