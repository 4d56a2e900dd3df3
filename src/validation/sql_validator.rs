use crate::services::database::BackendKind;
use sqlparser::ast::Statement;
use sqlparser::dialect::{BigQueryDialect, Dialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

/// AST checks applied to generated SQL before it reaches a backend
pub struct SqlValidator;

impl SqlValidator {
    fn dialect_for(kind: BackendKind) -> Box<dyn Dialect> {
        match kind {
            BackendKind::PostgreSQL => Box::new(PostgreSqlDialect {}),
            BackendKind::MySQL => Box::new(MySqlDialect {}),
            BackendKind::BigQuery => Box::new(BigQueryDialect {}),
        }
    }

    /// Append `LIMIT n` to a single query statement that has no row limit.
    ///
    /// Best effort: SQL the parser rejects, multi-statement input and
    /// non-query statements come back unchanged and are left to the backend.
    pub fn ensure_limit(sql: &str, limit: u64, kind: BackendKind) -> String {
        let dialect = Self::dialect_for(kind);
        let statements = match Parser::parse_sql(dialect.as_ref(), sql) {
            Ok(statements) => statements,
            Err(e) => {
                tracing::debug!("Row cap not pushed into unparseable SQL: {}", e);
                return sql.to_string();
            }
        };

        if statements.len() != 1 || Self::has_row_limit(&statements[0]) {
            return sql.to_string();
        }
        if !matches!(statements[0], Statement::Query(_)) {
            return sql.to_string();
        }

        let trimmed = sql.trim().trim_end_matches(';').trim_end();
        // A trailing line comment would swallow a same-line LIMIT
        let ends_in_line_comment = trimmed.lines().last().is_some_and(|line| line.contains("--"));
        if ends_in_line_comment {
            format!("{}\nLIMIT {}", trimmed, limit)
        } else {
            format!("{} LIMIT {}", trimmed, limit)
        }
    }

    /// Check if a statement has a LIMIT or FETCH clause using AST analysis
    fn has_row_limit(stmt: &Statement) -> bool {
        match stmt {
            Statement::Query(query) => query.limit_clause.is_some() || query.fetch.is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PG: BackendKind = BackendKind::PostgreSQL;

    #[test]
    fn test_ensure_limit() {
        // Query without LIMIT
        let result = SqlValidator::ensure_limit("SELECT * FROM users", 1000, PG);
        assert_eq!(result, "SELECT * FROM users LIMIT 1000");

        // Query with LIMIT
        let sql = "SELECT * FROM users LIMIT 100";
        assert_eq!(SqlValidator::ensure_limit(sql, 1000, PG), sql);

        // Trailing semicolon is dropped before appending
        let result = SqlValidator::ensure_limit("SELECT 1;", 10, PG);
        assert_eq!(result, "SELECT 1 LIMIT 10");
    }

    #[test]
    fn test_limit_detection_with_ast() {
        // Table name contains "limit"
        let result = SqlValidator::ensure_limit("SELECT * FROM table_limit", 1000, PG);
        assert!(result.ends_with("LIMIT 1000"));

        // Column name contains "limit"
        let result = SqlValidator::ensure_limit("SELECT limit_value FROM users", 1000, PG);
        assert!(result.ends_with("LIMIT 1000"));

        // Comment contains "LIMIT"
        let result = SqlValidator::ensure_limit("SELECT * FROM users /* LIMIT */", 1000, PG);
        assert!(result.ends_with("LIMIT 1000"));

        // LIMIT with OFFSET
        let sql = "SELECT * FROM users LIMIT 100 OFFSET 10";
        assert_eq!(SqlValidator::ensure_limit(sql, 1000, PG), sql);
    }

    #[test]
    fn test_line_comment_does_not_swallow_limit() {
        let result = SqlValidator::ensure_limit("SELECT * FROM users -- all of them", 5, PG);
        assert_eq!(result, "SELECT * FROM users -- all of them\nLIMIT 5");
    }

    #[test]
    fn test_non_queries_and_unparseable_sql_pass_through() {
        let sql = "DELETE FROM users";
        assert_eq!(SqlValidator::ensure_limit(sql, 10, PG), sql);

        let sql = "SELEKT nonsense FROM";
        assert_eq!(SqlValidator::ensure_limit(sql, 10, PG), sql);

        let sql = "SELECT 1; SELECT 2";
        assert_eq!(SqlValidator::ensure_limit(sql, 10, PG), sql);
    }

    #[test]
    fn test_dialect_specific_parsing() {
        let sql = "SELECT `name` FROM `users`";
        assert_eq!(
            SqlValidator::ensure_limit(sql, 10, BackendKind::MySQL),
            "SELECT `name` FROM `users` LIMIT 10"
        );
        assert_eq!(
            SqlValidator::ensure_limit("SELECT 1 LIMIT 1", 10, BackendKind::BigQuery),
            "SELECT 1 LIMIT 1"
        );
    }

    #[test]
    fn test_limit_detection_ignores_lookalike_names() {
        let sql = "SELECT * FROM users LIMIT 10";
        assert_eq!(SqlValidator::ensure_limit(sql, 5, PG), sql);
        assert_eq!(
            SqlValidator::ensure_limit("SELECT * FROM table_limit", 5, PG),
            "SELECT * FROM table_limit LIMIT 5"
        );
        assert_eq!(
            SqlValidator::ensure_limit("SELECT limit_value FROM users", 5, PG),
            "SELECT limit_value FROM users LIMIT 5"
        );
    }
}
