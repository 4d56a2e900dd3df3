// Request-scoped question -> SQL -> rows -> explanation pipeline
use crate::api::middleware::AppError;
use crate::config::Config;
use crate::models::{PipelineResponse, TableSuggestionResponse, TranslationResult};
use crate::services::executor::{QueryExecutor, DEFAULT_ROW_CAP};
use crate::services::explainer::ResultExplainer;
use crate::services::introspector::{build_snapshot, SchemaIntrospector};
use crate::services::llm_service::GenerativeBackend;
use crate::services::qualifier::SqlQualifier;
use crate::services::ranker::{RankingWeights, TableRelevanceRanker};
use crate::services::schema_context::SchemaContext;
use crate::services::translator::{is_sql_query, SqlTranslator, TranslationStrategyKind};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::Instrument;
use uuid::Uuid;

pub const TIMEOUT_EXPLANATION: &str = "Query processing timed out. Please try a simpler query.";
const TIMEOUT_REASON: &str = "Timeout";

/// Stage a run was in when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Translating,
    Qualifying,
    Executing,
    Explaining,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Translating,
    Qualifying,
    Executing,
    Explaining,
    Done,
    Failed { stage: Stage, reason: String },
}

impl PipelineState {
    fn stage(&self) -> Stage {
        match self {
            PipelineState::Translating => Stage::Translating,
            PipelineState::Qualifying => Stage::Qualifying,
            PipelineState::Executing => Stage::Executing,
            PipelineState::Explaining => Stage::Explaining,
            PipelineState::Failed { stage, .. } => *stage,
            PipelineState::Idle | PipelineState::Done => Stage::Idle,
        }
    }
}

/// Ordered record of the states one run passed through
#[derive(Debug, Default)]
struct Trace {
    states: Vec<PipelineState>,
}

impl Trace {
    fn enter(&mut self, state: PipelineState) {
        tracing::info!("Pipeline state: {:?}", state);
        self.states.push(state);
    }

    fn current_stage(&self) -> Stage {
        self.states.last().map_or(Stage::Idle, PipelineState::stage)
    }

    fn fail(&mut self, stage: Stage, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!("Pipeline failed during {:?}: {}", stage, reason);
        self.states.push(PipelineState::Failed { stage, reason });
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub translate_timeout: Duration,
    /// Shared budget for execution plus explanation
    pub execute_timeout: Duration,
    pub row_cap: usize,
    pub introspection_concurrency: usize,
    pub strategy: TranslationStrategyKind,
    pub ranking: RankingWeights,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            translate_timeout: Duration::from_secs(30),
            execute_timeout: Duration::from_secs(60),
            row_cap: DEFAULT_ROW_CAP,
            introspection_concurrency: 4,
            strategy: TranslationStrategyKind::Direct,
            ranking: RankingWeights::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            translate_timeout: Duration::from_secs(config.pipeline.translate_timeout_secs),
            execute_timeout: Duration::from_secs(config.pipeline.execute_timeout_secs),
            row_cap: config.pipeline.row_cap,
            introspection_concurrency: config.introspection_concurrency(),
            strategy: config.pipeline.strategy,
            ranking: config.ranking.clone(),
        }
    }
}

/// Answers questions end to end.
///
/// The schema context is built lazily on first use, at most once: concurrent
/// first callers wait on the same build, and a failed build leaves nothing
/// behind so a later call can try again.
pub struct QueryPipeline {
    introspector: Arc<dyn SchemaIntrospector>,
    translator: SqlTranslator,
    executor: QueryExecutor,
    explainer: ResultExplainer,
    ranker: TableRelevanceRanker,
    settings: PipelineSettings,
    context: OnceCell<Arc<SchemaContext>>,
}

impl QueryPipeline {
    pub fn new(
        introspector: Arc<dyn SchemaIntrospector>,
        llm: Arc<dyn GenerativeBackend>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            translator: SqlTranslator::new(llm.clone(), settings.strategy, settings.ranking.clone()),
            executor: QueryExecutor::new(introspector.clone(), settings.row_cap),
            explainer: ResultExplainer::new(llm),
            ranker: TableRelevanceRanker::new(settings.ranking.clone()),
            introspector,
            settings,
            context: OnceCell::new(),
        }
    }

    /// The shared schema context, building it on first call
    pub async fn schema_context(&self) -> Result<Arc<SchemaContext>, AppError> {
        self.context
            .get_or_try_init(|| async {
                tracing::info!("Building schema context");
                let snapshot =
                    build_snapshot(self.introspector.as_ref(), self.settings.introspection_concurrency).await?;
                let catalog_project = self.introspector.catalog_project().map(str::to_string);
                Ok::<_, AppError>(Arc::new(SchemaContext::new(
                    snapshot,
                    self.introspector.dialect(),
                    catalog_project,
                )))
            })
            .await
            .cloned()
    }

    pub fn is_context_ready(&self) -> bool {
        self.context.initialized()
    }

    pub async fn run(&self, question: &str) -> PipelineResponse {
        self.run_traced(question).await.0
    }

    /// Run one question, returning the response and every state visited
    pub async fn run_traced(&self, question: &str) -> (PipelineResponse, Vec<PipelineState>) {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline", %request_id);
        async {
            let mut trace = Trace::default();
            let response = self.drive(question, &mut trace).await;
            (response, trace.states)
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, question: &str, trace: &mut Trace) -> PipelineResponse {
        trace.enter(PipelineState::Idle);

        let question = question.trim();
        if question.is_empty() {
            let err = AppError::Validation("Question must not be empty".to_string());
            trace.fail(Stage::Idle, err.to_string());
            return PipelineResponse::failed(String::new(), "Please provide a question.".to_string(), err.to_string());
        }

        let context = match self.schema_context().await {
            Ok(context) => context,
            Err(e) => {
                trace.fail(Stage::Idle, e.to_string());
                return PipelineResponse::failed(
                    String::new(),
                    format!("Schema information is unavailable: {}", e),
                    e.to_string(),
                );
            }
        };

        let raw_sql = if is_sql_query(question) {
            question.to_string()
        } else {
            trace.enter(PipelineState::Translating);
            match timeout(self.settings.translate_timeout, self.translator.translate(question, &context)).await {
                Err(_) => {
                    trace.fail(Stage::Translating, TIMEOUT_REASON);
                    return Self::timed_out(String::new());
                }
                Ok(TranslationResult::Failure(reason)) => {
                    trace.fail(Stage::Translating, reason.clone());
                    return PipelineResponse::failed(
                        String::new(),
                        format!("Could not translate the question into SQL: {}", reason),
                        reason,
                    );
                }
                Ok(TranslationResult::Sql(sql)) => sql,
            }
        };

        trace.enter(PipelineState::Qualifying);
        let sql = SqlQualifier::from_context(&context).qualify(&raw_sql);
        if sql != raw_sql {
            tracing::debug!("Qualified SQL: {}", sql);
        }

        let outcome = timeout(self.settings.execute_timeout, async {
            trace.enter(PipelineState::Executing);
            let result = self.executor.execute(&sql).await?;
            trace.enter(PipelineState::Explaining);
            let explanation = self.explainer.explain(&sql, &result, &context.text).await;
            Ok::<_, AppError>((result, explanation))
        })
        .await;

        match outcome {
            Err(_) => {
                let stage = trace.current_stage();
                trace.fail(stage, TIMEOUT_REASON);
                Self::timed_out(sql)
            }
            Ok(Err(e)) => {
                let message = e.to_string();
                trace.fail(Stage::Executing, message.clone());
                PipelineResponse::failed(sql, format!("Error executing query: {}", message), message)
            }
            Ok(Ok((result, explanation))) => {
                trace.enter(PipelineState::Done);
                PipelineResponse::succeeded(sql, result.rows, explanation)
            }
        }
    }

    fn timed_out(sql: String) -> PipelineResponse {
        PipelineResponse::failed(sql, TIMEOUT_EXPLANATION.to_string(), TIMEOUT_REASON.to_string())
    }

    /// Rank snapshot tables against the question without calling the
    /// generative backend.
    pub async fn suggest_tables(&self, question: &str) -> Result<TableSuggestionResponse, AppError> {
        let context = self.schema_context().await?;
        let keywords = TableRelevanceRanker::extract_keywords(question);
        let tables = self.ranker.rank_with_keywords(&keywords, &context.snapshot);
        let suggestions = TableRelevanceRanker::format_suggestions(question, &tables, &context.snapshot);

        Ok(TableSuggestionResponse {
            keywords: keywords.into_iter().collect(),
            tables,
            suggestions,
        })
    }
}
