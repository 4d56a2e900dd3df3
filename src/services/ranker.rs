// Keyword relevance scoring of snapshot tables against a question
use crate::models::{RelevanceScore, SchemaSnapshot, TableDescriptor, TableKind};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::LazyLock;

const STOP_WORDS: &[&str] = &[
    "show", "me", "the", "what", "how", "many", "by", "for", "in", "of", "a", "an", "is", "are", "from", "to",
    "with",
];

/// A keyword in one group pulls in every member of that group.
const SYNONYM_GROUPS: &[&[&str]] = &[
    &["cost", "spend", "expense", "billing", "charge", "payment", "daily_cost"],
    &["user", "customer", "account", "organization", "email"],
    &["date", "daily", "monthly", "yearly", "time", "period"],
    &["cloud", "aws", "gcp", "azure", "provider", "region"],
    &["database", "cluster", "instance", "node", "deployment"],
];

const COST_NAME_PATTERNS: &[&str] = &["cost", "billing", "spend", "charge"];
const COST_CONTAINER_PATTERNS: &[&str] = &["cost", "billing", "usage"];
const PRIMARY_PATTERNS: &[&str] = &["fact", "main", "core", "primary"];
const LOOKUP_PATTERNS: &[&str] = &["dim", "lookup", "ref"];

const KEY_COLUMNS_SHOWN: usize = 8;
const MAX_STARS: u32 = 5;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w+\b").expect("static regex"));

/// Scoring weights. Tuning values, all overridable from configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub container_match: u32,
    pub name_match: u32,
    pub cost_pattern_bonus: u32,
    pub base_table_bonus: u32,
    pub primary_pattern_bonus: u32,
    pub lookup_pattern_bonus: u32,
    pub description_bonus: u32,
    pub column_match: u32,
    pub top_k: usize,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            container_match: 1,
            name_match: 2,
            cost_pattern_bonus: 3,
            base_table_bonus: 2,
            primary_pattern_bonus: 5,
            lookup_pattern_bonus: 3,
            description_bonus: 1,
            column_match: 1,
            top_k: 5,
        }
    }
}

pub struct TableRelevanceRanker {
    weights: RankingWeights,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

impl TableRelevanceRanker {
    pub fn new(weights: RankingWeights) -> Self {
        Self { weights }
    }

    /// Lower-cased words of the question minus stop words and short tokens,
    /// expanded through the synonym groups.
    pub fn extract_keywords(question: &str) -> BTreeSet<String> {
        let lowered = question.to_lowercase();
        let mut keywords = BTreeSet::new();

        for token in WORD_RE.find_iter(&lowered).map(|m| m.as_str()) {
            if token.chars().count() <= 2 || STOP_WORDS.contains(&token) {
                continue;
            }
            keywords.insert(token.to_string());
            for group in SYNONYM_GROUPS.iter().filter(|g| g.contains(&token)) {
                keywords.extend(group.iter().map(|s| s.to_string()));
            }
        }

        keywords
    }

    /// Whether the table is considered at all: its container or name
    /// matches a keyword, or either matches the cost/usage patterns.
    fn passes_gate(table: &TableDescriptor, keywords: &BTreeSet<String>) -> bool {
        let container = table.container_id.to_lowercase();
        let name = table.table_name.to_lowercase();

        keywords.iter().any(|kw| container.contains(kw.as_str()) || name.contains(kw.as_str()))
            || contains_any(&name, COST_NAME_PATTERNS)
            || contains_any(&container, COST_CONTAINER_PATTERNS)
    }

    /// Score one table without applying the relevance gate.
    pub fn score_table(&self, table: &TableDescriptor, keywords: &BTreeSet<String>) -> RelevanceScore {
        let w = &self.weights;
        let container = table.container_id.to_lowercase();
        let name = table.table_name.to_lowercase();
        let columns: Vec<String> = table.columns.iter().map(|c| c.name.to_lowercase()).collect();

        let mut score = 0u32;
        let mut matched_keywords = BTreeSet::new();

        for kw in keywords {
            let kw = kw.as_str();
            if container.contains(kw) {
                score += w.container_match;
            }
            if name.contains(kw) {
                score += w.name_match;
                matched_keywords.insert(kw.to_string());
            }
            let column_hits = columns.iter().filter(|c| c.contains(kw)).count() as u32;
            if column_hits > 0 {
                score += w.column_match * column_hits;
                matched_keywords.insert(kw.to_string());
            }
        }

        if contains_any(&name, COST_NAME_PATTERNS) {
            score += w.cost_pattern_bonus;
        }
        if table.kind == TableKind::Table {
            score += w.base_table_bonus;
        }
        if contains_any(&name, PRIMARY_PATTERNS) {
            score += w.primary_pattern_bonus;
        }
        if contains_any(&name, LOOKUP_PATTERNS) {
            score += w.lookup_pattern_bonus;
        }
        if table.description.is_some() {
            score += w.description_bonus;
        }

        RelevanceScore {
            table: table.qualified_name.clone(),
            score,
            matched_keywords,
        }
    }

    /// Top-K tables for the question, best first. Ties keep snapshot order.
    pub fn rank(&self, question: &str, snapshot: &SchemaSnapshot) -> Vec<RelevanceScore> {
        let keywords = Self::extract_keywords(question);
        self.rank_with_keywords(&keywords, snapshot)
    }

    pub fn rank_with_keywords(&self, keywords: &BTreeSet<String>, snapshot: &SchemaSnapshot) -> Vec<RelevanceScore> {
        let mut scored: Vec<RelevanceScore> = snapshot
            .tables()
            .iter()
            .filter(|t| Self::passes_gate(t, keywords))
            .map(|t| self.score_table(t, keywords))
            .filter(|s| s.score > 0)
            .collect();

        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored.truncate(self.weights.top_k);
        scored
    }

    /// Readable rendering of ranked tables for the question.
    pub fn format_suggestions(question: &str, ranked: &[RelevanceScore], snapshot: &SchemaSnapshot) -> String {
        if ranked.is_empty() {
            return "No relevant tables found for your query.".to_string();
        }

        let mut out = format!(
            "Suggested tables for \"{}\", most relevant first:\n",
            question.trim()
        );

        for (i, score) in ranked.iter().enumerate() {
            out.push_str(&format!("\n{}. **{}**\n", i + 1, score.table));

            if let Some(table) = snapshot.get(&score.table) {
                if let Some(description) = &table.description {
                    out.push_str(&format!("   Description: {}\n", description));
                }
                if let Some(rows) = table.row_count.filter(|r| *r > 0) {
                    out.push_str(&format!("   Rows: {}\n", rows));
                }
                if !table.columns.is_empty() {
                    let cols: Vec<&str> = table
                        .columns
                        .iter()
                        .take(KEY_COLUMNS_SHOWN)
                        .map(|c| c.name.as_str())
                        .collect();
                    out.push_str(&format!("   Key columns: {}\n", cols.join(", ")));
                }
            }

            let stars = "★".repeat(score.score.min(MAX_STARS) as usize);
            let matches: Vec<&str> = score.matched_keywords.iter().map(String::as_str).collect();
            out.push_str(&format!("   Relevance: {} (matches: {})\n", stars, matches.join(", ")));
        }

        out
    }
}
