use serde::Deserialize;
use std::env;

use crate::api::middleware::AppError;
use crate::services::database::{default_schemas, BackendKind};
use crate::services::ranker::RankingWeights;
use crate::services::translator::TranslationStrategyKind;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub database: DatabaseConfig,
    pub warehouse: WarehouseConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub ranking: RankingWeights,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// postgresql | mysql | bigquery
    pub kind: String,
}

/// Relational backend settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    /// Schemas to introspect. Empty picks the backend's default, `*` means
    /// every non-system schema.
    pub schemas: Vec<String>,
    pub max_pool_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    pub project_id: Option<String>,
    pub access_token: Option<String>,
    pub api_base_url: String,
    pub max_containers: usize,
    pub max_tables_per_container: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub gateway_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub translate_timeout_secs: u64,
    pub execute_timeout_secs: u64,
    pub row_cap: usize,
    /// 0 means one worker per CPU
    pub introspection_concurrency: usize,
    pub strategy: TranslationStrategyKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Pick up a local .env before reading any variable
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("backend.kind", "postgresql")?
            .set_default("database.schemas", Vec::<String>::new())?
            .set_default("database.max_pool_size", 16)?
            .set_default("warehouse.api_base_url", "https://bigquery.googleapis.com/bigquery/v2")?
            .set_default("warehouse.max_containers", 10)?
            .set_default("warehouse.max_tables_per_container", 10)?
            .set_default("llm.gateway_url", "https://api.anthropic.com/v1/messages")?
            .set_default("llm.model", "claude-3-haiku-20240307")?
            .set_default("llm.temperature", 0.1)?
            .set_default("pipeline.translate_timeout_secs", 30)?
            .set_default("pipeline.execute_timeout_secs", 60)?
            .set_default("pipeline.row_cap", 1000)?
            .set_default("pipeline.introspection_concurrency", 0)?
            .set_default("pipeline.strategy", "direct")?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?;

        if let Ok(kind) = env::var("BACKEND_KIND") {
            builder = builder.set_override("backend.kind", kind)?;
        } else if env::var("USE_BIGQUERY").map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false) {
            builder = builder.set_override("backend.kind", "bigquery")?;
        }

        if let Ok(database_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", Some(database_url))?;
        }

        if let Ok(schemas) = env::var("DATABASE_SCHEMAS") {
            let schemas: Vec<String> = schemas
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            builder = builder.set_override("database.schemas", schemas)?;
        }

        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(8000))?;
        }

        if let Ok(project_id) = env::var("BIGQUERY_PROJECT_ID") {
            builder = builder.set_override("warehouse.project_id", Some(project_id))?;
        }

        if let Ok(token) = env::var("BIGQUERY_ACCESS_TOKEN") {
            builder = builder.set_override("warehouse.access_token", Some(token))?;
        }

        if let Ok(api_url) = env::var("BIGQUERY_API_URL") {
            builder = builder.set_override("warehouse.api_base_url", api_url)?;
        }

        if let Ok(gateway_url) = env::var("LLM_GATEWAY_URL") {
            builder = builder.set_override("llm.gateway_url", gateway_url)?;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY").or_else(|_| env::var("ANTHROPIC_API_KEY")) {
            builder = builder.set_override("llm.api_key", Some(api_key))?;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            builder = builder.set_override("llm.model", model)?;
        }

        if let Ok(secs) = env::var("TRANSLATE_TIMEOUT_SECS") {
            builder = builder.set_override("pipeline.translate_timeout_secs", secs.parse::<u64>().unwrap_or(30))?;
        }

        if let Ok(secs) = env::var("EXECUTE_TIMEOUT_SECS") {
            builder = builder.set_override("pipeline.execute_timeout_secs", secs.parse::<u64>().unwrap_or(60))?;
        }

        if let Ok(cap) = env::var("QUERY_ROW_CAP") {
            builder = builder.set_override("pipeline.row_cap", cap.parse::<u64>().unwrap_or(1000))?;
        }

        if let Ok(strategy) = env::var("TRANSLATION_STRATEGY") {
            builder = builder.set_override("pipeline.strategy", strategy)?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(log_style) = env::var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Check that the credentials the selected backend needs are present.
    pub fn validate(&self) -> Result<(), AppError> {
        let kind = BackendKind::from_str(&self.backend.kind)
            .map_err(|e| AppError::Configuration(e.to_string()))?;

        match kind {
            BackendKind::PostgreSQL | BackendKind::MySQL => {
                if self.database.url.as_deref().map_or(true, str::is_empty) {
                    return Err(AppError::Configuration(
                        "Missing required environment variable: DATABASE_URL".to_string(),
                    ));
                }
            }
            BackendKind::BigQuery => {
                if self.warehouse.project_id.as_deref().map_or(true, str::is_empty) {
                    return Err(AppError::Configuration(
                        "Missing required environment variable: BIGQUERY_PROJECT_ID".to_string(),
                    ));
                }
                if self.warehouse.access_token.as_deref().map_or(true, str::is_empty) {
                    return Err(AppError::Configuration(
                        "Missing required environment variable: BIGQUERY_ACCESS_TOKEN".to_string(),
                    ));
                }
            }
        }

        if self.llm.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(AppError::Configuration(
                "Missing required environment variable: LLM_API_KEY".to_string(),
            ));
        }

        if self.pipeline.row_cap == 0 {
            return Err(AppError::Configuration("pipeline.row_cap must be positive".to_string()));
        }

        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Relational schemas to introspect, falling back to the backend default
    pub fn schema_allowlist(&self, kind: BackendKind) -> Vec<String> {
        match self.database.schemas.as_slice() {
            [] => default_schemas(kind, self.database.url.as_deref()),
            [all] if all == "*" => Vec::new(),
            schemas => schemas.to_vec(),
        }
    }

    pub fn introspection_concurrency(&self) -> usize {
        match self.pipeline.introspection_concurrency {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        // Clear environment variables for this test
        env::remove_var("HOST");
        env::remove_var("PORT");
        env::remove_var("BACKEND_KIND");
        env::remove_var("USE_BIGQUERY");
        env::remove_var("TRANSLATION_STRATEGY");
        env::remove_var("DATABASE_SCHEMAS");

        let config = Config::from_env();
        assert!(config.is_ok());

        let config = config.unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.backend.kind, "postgresql");
        assert_eq!(config.pipeline.translate_timeout_secs, 30);
        assert_eq!(config.pipeline.execute_timeout_secs, 60);
        assert_eq!(config.pipeline.row_cap, 1000);
        assert_eq!(config.pipeline.strategy, TranslationStrategyKind::Direct);
        assert_eq!(config.warehouse.max_containers, 10);
        assert_eq!(config.ranking, RankingWeights::default());
        assert!(config.database.schemas.is_empty());
        assert!(config.introspection_concurrency() >= 1);
    }

    #[test]
    fn test_validate_reports_missing_credentials() {
        let mut config = Config::from_env().unwrap();
        config.backend.kind = "bigquery".to_string();
        config.warehouse.project_id = None;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Configuration(msg) if msg.contains("BIGQUERY_PROJECT_ID")));

        config.backend.kind = "postgresql".to_string();
        config.database.url = Some("postgresql://localhost/db".to_string());
        config.llm.api_key = None;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Configuration(msg) if msg.contains("LLM_API_KEY")));

        config.llm.api_key = Some("key".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_schema_allowlist_follows_backend() {
        let mut config = Config::from_env().unwrap();
        config.database.schemas = Vec::new();

        config.database.url = Some("postgresql://user:pw@localhost:5432/warehouse".to_string());
        assert_eq!(config.schema_allowlist(BackendKind::PostgreSQL), vec!["public"]);

        config.database.url = Some("mysql://root:pw@db:3306/appdb".to_string());
        assert_eq!(config.schema_allowlist(BackendKind::MySQL), vec!["appdb"]);

        config.database.url = Some("mysql://root:pw@db:3306".to_string());
        assert!(config.schema_allowlist(BackendKind::MySQL).is_empty());

        config.database.schemas = vec!["*".to_string()];
        assert!(config.schema_allowlist(BackendKind::PostgreSQL).is_empty());

        config.database.schemas = vec!["sales".to_string(), "crm".to_string()];
        assert_eq!(config.schema_allowlist(BackendKind::MySQL), vec!["sales", "crm"]);
    }

    #[test]
    fn test_validate_rejects_unknown_backend() {
        let mut config = Config::from_env().unwrap();
        config.backend.kind = "oracle".to_string();
        assert!(matches!(config.validate(), Err(AppError::Configuration(_))));
    }
}
