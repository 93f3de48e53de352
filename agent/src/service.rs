use std::path::PathBuf;
use std::sync::Arc;

use ai::{AiError, ChatModel, OpenAiClient};
use config::ChatConfig;
use db::{DbError, QueryPolicy, SqliteDatabase};

use crate::decision::{Agent, AgentError};
use crate::tools::QueryToolSet;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("LLM not initialized. Make sure {0} is set.")]
    NotInitialized(String),
    #[error("database file '{}' not found. Run the provision command first.", .0.display())]
    DatabaseMissing(PathBuf),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Client(#[from] AiError),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

#[derive(Debug)]
enum AgentSlot {
    Ready(Agent),
    Unavailable { api_key_env: String },
}

/// Built once at startup and shared by every request handler.
#[derive(Debug)]
pub struct ChatService {
    slot: AgentSlot,
}

impl ChatService {
    pub fn ready(agent: Agent) -> Self {
        Self {
            slot: AgentSlot::Ready(agent),
        }
    }

    /// A service whose every question fails until restarted with credentials.
    pub fn unavailable(api_key_env: impl Into<String>) -> Self {
        Self {
            slot: AgentSlot::Unavailable {
                api_key_env: api_key_env.into(),
            },
        }
    }

    pub async fn start(conf: &ChatConfig) -> Result<Self, ServiceError> {
        Self::start_with(conf, |name| std::env::var(name).ok()).await
    }

    /// A missing database aborts startup. A missing API key does not: the
    /// service comes up unavailable and reports it on each question.
    pub async fn start_with(
        conf: &ChatConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ServiceError> {
        if !conf.database.path.exists() {
            return Err(ServiceError::DatabaseMissing(conf.database.path.clone()));
        }

        let Some(api_key) = conf.api_key_with(lookup) else {
            tracing::warn!(
                var = %conf.ai.api_key_env,
                "API key not set; questions will be refused"
            );
            return Ok(Self::unavailable(conf.ai.api_key_env.clone()));
        };

        tracing::info!(model = %conf.ai.model, "initializing LLM and tools");

        let policy = QueryPolicy::from_read_only(conf.database.read_only);
        let db = SqliteDatabase::open(&conf.database.path, policy).await?;
        let client = OpenAiClient::from_config(&conf.ai, &api_key)?;
        tracing::debug!(model = client.model(), endpoint = %conf.ai.url, "model client ready");
        let model: Arc<dyn ChatModel> = Arc::new(client);
        let tools = QueryToolSet::new(Box::new(db), model.clone())
            .with_max_rows(conf.database.max_result_rows);

        let agent = Agent::new(model, Arc::new(tools))
            .with_system_prompt(conf.ai.system_prompt.clone())
            .with_max_turns(conf.ai.max_turns);

        tracing::info!(tools = agent.tool_count(), ?policy, "LLM initialized");
        Ok(Self::ready(agent))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.slot, AgentSlot::Ready(_))
    }

    pub fn agent(&self) -> Result<&Agent, ServiceError> {
        match &self.slot {
            AgentSlot::Ready(agent) => Ok(agent),
            AgentSlot::Unavailable { api_key_env } => {
                Err(ServiceError::NotInitialized(api_key_env.clone()))
            }
        }
    }

    pub async fn ask(&self, question: &str) -> Result<String, ServiceError> {
        let outcome = self.agent()?.run(question).await?;
        Ok(outcome.answer)
    }
}
