// Natural-language question -> SQL through the generative backend
use crate::models::TranslationResult;
use crate::services::llm_service::GenerativeBackend;
use crate::services::ranker::{RankingWeights, TableRelevanceRanker};
use crate::services::schema_context::SchemaContext;
use serde::Deserialize;
use std::sync::Arc;

const DIRECT_MAX_TOKENS: u32 = 500;
const SUGGEST_MAX_TOKENS: u32 = 1000;

const SUGGESTIONS_MARKER: &str = "TABLE_SUGGESTIONS:";
const SQL_MARKER: &str = "SQL_QUERY:";

/// Statements accepted as the start of generated SQL
const GENERATED_SQL_KEYWORDS: &[&str] = &["select", "with", "insert", "update", "delete"];

/// Prefixes that mark user input as SQL already
const SQL_INPUT_PREFIXES: &[&str] = &["select", "insert", "update", "delete", "create", "drop", "alter", "with"];

/// True when the input already reads as SQL (case-insensitive prefix match)
/// and should skip translation.
pub fn is_sql_query(input: &str) -> bool {
    let lowered = input.trim_start().to_lowercase();
    SQL_INPUT_PREFIXES.iter().any(|p| lowered.starts_with(p))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStrategyKind {
    /// One prompt, SQL only
    Direct,
    /// Rank tables locally, ask for table suggestions and SQL in one call
    SuggestThenTranslate,
}

pub struct SqlTranslator {
    llm: Arc<dyn GenerativeBackend>,
    strategy: TranslationStrategyKind,
    ranker: TableRelevanceRanker,
}

impl SqlTranslator {
    pub fn new(llm: Arc<dyn GenerativeBackend>, strategy: TranslationStrategyKind, weights: RankingWeights) -> Self {
        Self {
            llm,
            strategy,
            ranker: TableRelevanceRanker::new(weights),
        }
    }

    /// Translate the question. A failed call or a reply that does not start
    /// with a SQL keyword is a failure; there is no retry.
    pub async fn translate(&self, question: &str, context: &SchemaContext) -> TranslationResult {
        let (prompt, max_tokens) = match self.strategy {
            TranslationStrategyKind::Direct => (Self::direct_prompt(question, context), DIRECT_MAX_TOKENS),
            TranslationStrategyKind::SuggestThenTranslate => (self.suggest_prompt(question, context), SUGGEST_MAX_TOKENS),
        };

        let reply = match self.llm.complete(&prompt, max_tokens).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Translation call failed: {}", e);
                return TranslationResult::Failure(format!("Error converting query: {}", e));
            }
        };

        let sql_text = match self.strategy {
            TranslationStrategyKind::Direct => reply.as_str(),
            TranslationStrategyKind::SuggestThenTranslate => Self::sql_section(&reply),
        };

        let sql = clean_sql(sql_text);
        if starts_with_sql_keyword(&sql) {
            TranslationResult::Sql(sql)
        } else {
            let preview: String = sql.chars().take(80).collect();
            TranslationResult::Failure(format!("Generated text is not a SQL query: {}", preview))
        }
    }

    fn qualification_rule(context: &SchemaContext) -> String {
        if context.dialect.requires_qualified_names() {
            format!(
                "CRITICAL: This is {} - you MUST use fully qualified table names in the format \
                 dataset_name.table_name, exactly as listed in the schema",
                context.dialect.display_name()
            )
        } else {
            "Use table names exactly as listed in the schema".to_string()
        }
    }

    fn direct_prompt(question: &str, context: &SchemaContext) -> String {
        format!(
            r#"Given this database schema context:
{schema}

User query: "{question}"

STEP 1: First, identify which tables from the schema are most relevant for this query.

STEP 2: Then generate a SQL query using the most appropriate table.

Important guidelines:
1. Generate a valid {dialect} query that answers the question
2. {qualification}
3. Use proper table and column names from the schema
4. For COUNT, SUM, AVG and other aggregations, always use GROUP BY appropriately
5. Include appropriate JOINs if multiple tables are needed
6. Order results by count/sum descending when showing aggregations

CRITICAL INSTRUCTIONS:
- Return ONLY the SQL query
- Do NOT include any explanations, introductions, or text before/after the SQL
- Start your response with SELECT, WITH, or other SQL keywords
- NEVER start with "Here is", "Based on", "The following", etc."#,
            schema = context.text,
            question = question,
            dialect = context.dialect.display_name(),
            qualification = Self::qualification_rule(context),
        )
    }

    fn suggest_prompt(&self, question: &str, context: &SchemaContext) -> String {
        let candidates = self.ranker.rank(question, &context.snapshot);
        let candidate_lines = if candidates.is_empty() {
            "(no candidates found by keyword search)".to_string()
        } else {
            candidates
                .iter()
                .map(|c| {
                    let matches: Vec<&str> = c.matched_keywords.iter().map(String::as_str).collect();
                    format!("- {} (matches: {})", c.table, matches.join(", "))
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        tracing::debug!("Keyword search proposed {} candidate tables", candidates.len());

        format!(
            r#"Given this {dialect} database schema:
{schema}

Keyword search suggests these candidate tables:
{candidates}

And this user query: "{question}"

Please identify the 3 most relevant tables for this query. For each table give the
table name in dataset.table format, why it is relevant, and key columns that would be useful.

{qualification}.

Format your response as:
{suggestions_marker}
1. dataset.table_name - reason - columns: col1, col2, col3
2. dataset.table_name - reason - columns: col1, col2, col3
3. dataset.table_name - reason - columns: col1, col2, col3

Then generate SQL for the MOST relevant table:
{sql_marker}
<your SQL here>"#,
            dialect = context.dialect.display_name(),
            schema = context.text,
            candidates = candidate_lines,
            question = question,
            qualification = Self::qualification_rule(context),
            suggestions_marker = SUGGESTIONS_MARKER,
            sql_marker = SQL_MARKER,
        )
    }

    /// Text after the SQL marker, or the whole reply when the marker is missing
    fn sql_section(reply: &str) -> &str {
        match reply.split_once(SQL_MARKER) {
            Some((_, sql)) => sql,
            None => reply,
        }
    }
}

/// Trim whitespace and markdown code fences
fn clean_sql(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```SQL"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.trim_end().trim_end_matches("```").trim().to_string()
}

fn starts_with_sql_keyword(sql: &str) -> bool {
    let lowered = sql.to_lowercase();
    GENERATED_SQL_KEYWORDS.iter().any(|kw| {
        lowered.starts_with(kw)
            && lowered[kw.len()..]
                .chars()
                .next()
                .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDescriptor, SchemaSnapshot, TableDescriptor, TableKind};
    use crate::services::database::BackendKind;
    use crate::services::testing::ScriptedLlm;

    fn context(dialect: BackendKind) -> SchemaContext {
        let snapshot = SchemaSnapshot::new(vec![TableDescriptor::new("billing", "daily_costs", TableKind::Table)
            .with_columns(vec![ColumnDescriptor::new("daily_cost", "FLOAT64")])]);
        SchemaContext::new(snapshot, dialect, None)
    }

    fn translator(llm: Arc<ScriptedLlm>, strategy: TranslationStrategyKind) -> SqlTranslator {
        SqlTranslator::new(llm, strategy, RankingWeights::default())
    }

    #[test]
    fn test_is_sql_query() {
        assert!(is_sql_query("SELECT 1"));
        assert!(is_sql_query("  with t as (select 1) select * from t"));
        assert!(is_sql_query("Drop table x"));
        assert!(!is_sql_query("show me daily costs"));
        assert!(!is_sql_query(""));
    }

    #[test]
    fn test_clean_sql_strips_fences() {
        assert_eq!(clean_sql("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(clean_sql("  SELECT 2  "), "SELECT 2");
        assert_eq!(clean_sql("```\nWITH x AS (SELECT 1) SELECT * FROM x\n```"), "WITH x AS (SELECT 1) SELECT * FROM x");
    }

    #[test]
    fn test_shape_check_is_word_bounded() {
        assert!(starts_with_sql_keyword("select * from t"));
        assert!(starts_with_sql_keyword("DELETE FROM t"));
        assert!(starts_with_sql_keyword("SELECT\n1"));
        assert!(!starts_with_sql_keyword("Selection of tables"));
        assert!(!starts_with_sql_keyword("Here is the query: SELECT 1"));
        assert!(!starts_with_sql_keyword("CREATE TABLE t (a int)"));
    }

    #[tokio::test]
    async fn test_direct_translation() {
        let llm = Arc::new(ScriptedLlm::replying(&["```sql\nSELECT SUM(daily_cost) FROM billing.daily_costs\n```"]));
        let translator = translator(llm.clone(), TranslationStrategyKind::Direct);

        let result = translator.translate("total cost", &context(BackendKind::BigQuery)).await;
        assert_eq!(
            result,
            TranslationResult::Sql("SELECT SUM(daily_cost) FROM billing.daily_costs".to_string())
        );

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("STEP 1"));
        assert!(prompts[0].contains("MUST use fully qualified table names"));
        assert!(prompts[0].contains("**billing.daily_costs**"));
    }

    #[tokio::test]
    async fn test_relational_prompt_does_not_demand_qualification() {
        let llm = Arc::new(ScriptedLlm::replying(&["SELECT 1"]));
        let translator = translator(llm.clone(), TranslationStrategyKind::Direct);
        translator.translate("anything", &context(BackendKind::PostgreSQL)).await;
        assert!(!llm.prompts()[0].contains("MUST use fully qualified"));
    }

    #[tokio::test]
    async fn test_prose_reply_is_a_failure() {
        let llm = Arc::new(ScriptedLlm::replying(&["Here is the query you asked for"]));
        let translator = translator(llm.clone(), TranslationStrategyKind::Direct);

        let result = translator.translate("total cost", &context(BackendKind::BigQuery)).await;
        assert!(matches!(result, TranslationResult::Failure(reason) if reason.contains("not a SQL query")));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_call_error_is_a_failure_without_retry() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err("overloaded"), Ok("SELECT 1")]));
        let translator = translator(llm.clone(), TranslationStrategyKind::Direct);

        let result = translator.translate("total cost", &context(BackendKind::BigQuery)).await;
        assert!(matches!(result, TranslationResult::Failure(reason) if reason.contains("overloaded")));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_suggest_then_translate_extracts_sql_section() {
        let reply = "TABLE_SUGGESTIONS:\n\
                     1. billing.daily_costs - has costs - columns: daily_cost\n\
                     \n\
                     SQL_QUERY:\n\
                     ```sql\nSELECT SUM(daily_cost) FROM billing.daily_costs\n```";
        let llm = Arc::new(ScriptedLlm::replying(&[reply]));
        let translator = translator(llm.clone(), TranslationStrategyKind::SuggestThenTranslate);

        let result = translator.translate("show daily costs", &context(BackendKind::BigQuery)).await;
        assert_eq!(
            result,
            TranslationResult::Sql("SELECT SUM(daily_cost) FROM billing.daily_costs".to_string())
        );
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("TABLE_SUGGESTIONS:"));
        assert!(prompt.contains("- billing.daily_costs (matches:"));
    }

    #[tokio::test]
    async fn test_suggest_then_translate_without_marker_uses_whole_reply() {
        let llm = Arc::new(ScriptedLlm::replying(&["SELECT 1"]));
        let translator = translator(llm, TranslationStrategyKind::SuggestThenTranslate);
        let result = translator.translate("anything", &context(BackendKind::BigQuery)).await;
        assert_eq!(result, TranslationResult::Sql("SELECT 1".to_string()));
    }

    #[test]
    fn test_strategy_deserializes_from_config_names() {
        let kind: TranslationStrategyKind = serde_json::from_str("\"suggest_then_translate\"").unwrap();
        assert_eq!(kind, TranslationStrategyKind::SuggestThenTranslate);
    }
}
