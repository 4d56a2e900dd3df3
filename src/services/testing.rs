// In-memory collaborators for unit tests
use crate::api::middleware::AppError;
use crate::models::{Row, TableDescriptor};
use crate::services::database::BackendKind;
use crate::services::introspector::SchemaIntrospector;
use crate::services::llm_service::GenerativeBackend;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Introspector serving a fixed table list
pub struct MockIntrospector {
    dialect: BackendKind,
    tables: Vec<TableDescriptor>,
    failing_tables: HashSet<String>,
    failing_containers: HashSet<String>,
    connection_lost: bool,
    unreachable: bool,
    catalog_project: Option<String>,
    rows: Vec<Row>,
    query_error: Option<String>,
    list_delay: Option<Duration>,
    query_delay: Option<Duration>,
    list_calls: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

impl MockIntrospector {
    pub fn new(dialect: BackendKind, tables: Vec<TableDescriptor>) -> Self {
        Self {
            dialect,
            tables,
            failing_tables: HashSet::new(),
            failing_containers: HashSet::new(),
            connection_lost: false,
            unreachable: false,
            catalog_project: None,
            rows: Vec::new(),
            query_error: None,
            list_delay: None,
            query_delay: None,
            list_calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// `describe_table` fails for this qualified name
    pub fn with_failing_table(mut self, qualified_name: &str) -> Self {
        self.failing_tables.insert(qualified_name.to_string());
        self
    }

    /// `list_tables` fails for this container
    pub fn with_failing_container(mut self, container_id: &str) -> Self {
        self.failing_containers.insert(container_id.to_string());
        self
    }

    /// Containers list fine, then every `describe_table` loses the connection
    pub fn with_connection_loss(mut self) -> Self {
        self.connection_lost = true;
        self
    }

    /// `list_containers` fails
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn with_catalog_project(mut self, project: &str) -> Self {
        self.catalog_project = Some(project.to_string());
        self
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_query_error(mut self, message: &str) -> Self {
        self.query_error = Some(message.to_string());
        self
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = Some(delay);
        self
    }

    /// Number of `list_containers` calls, one per snapshot build
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// SQL received by `run_query`, in call order
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SchemaIntrospector for MockIntrospector {
    fn dialect(&self) -> BackendKind {
        self.dialect
    }

    fn catalog_project(&self) -> Option<&str> {
        self.catalog_project.as_deref()
    }

    async fn list_containers(&self) -> Result<Vec<String>, AppError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            return Err(AppError::Connection("connection refused".to_string()));
        }

        let mut containers: Vec<String> = Vec::new();
        for table in &self.tables {
            if !containers.contains(&table.container_id) {
                containers.push(table.container_id.clone());
            }
        }
        Ok(containers)
    }

    async fn list_tables(&self, container_id: &str) -> Result<Vec<String>, AppError> {
        if self.failing_containers.contains(container_id) {
            return Err(AppError::Introspection(format!("permission denied for schema {}", container_id)));
        }
        Ok(self
            .tables
            .iter()
            .filter(|t| t.container_id == container_id)
            .map(|t| t.table_name.clone())
            .collect())
    }

    async fn describe_table(&self, container_id: &str, table_name: &str) -> Result<TableDescriptor, AppError> {
        if self.connection_lost {
            return Err(AppError::Connection("connection reset by peer".to_string()));
        }
        let qualified = format!("{}.{}", container_id, table_name);
        if self.failing_tables.contains(&qualified) {
            return Err(AppError::Introspection(format!("permission denied for {}", qualified)));
        }
        self.tables
            .iter()
            .find(|t| t.qualified_name == qualified)
            .cloned()
            .ok_or_else(|| AppError::NotFound(qualified))
    }

    async fn run_query(&self, sql: &str, row_cap: usize) -> Result<Vec<Row>, AppError> {
        self.executed.lock().unwrap().push(sql.to_string());
        if let Some(delay) = self.query_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.query_error {
            return Err(AppError::Execution(message.clone()));
        }
        Ok(self.rows.iter().take(row_cap).cloned().collect())
    }
}

/// Generative backend replaying scripted replies in order
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(*r)).collect())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GenerativeBackend for ScriptedLlm {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, AppError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(AppError::LlmService(message)),
            None => Err(AppError::LlmService("no scripted reply left".to_string())),
        }
    }
}
