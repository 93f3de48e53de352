use std::fmt;
use std::future::Future;
use std::sync::Arc;

use ai::{AiError, ChatModel, Message, ToolCall};

use crate::conversation::Conversation;
use crate::tools::{ToolError, ToolExecutor};

pub const DEFAULT_MAX_TURNS: usize = 25;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful SQL assistant. You have access to a \
database. Use the tools to answer user questions.";

#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    AwaitingModel,
    AwaitingTools(Vec<ToolCall>),
    Done(String),
}

/// Progress reported while a question is being answered.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    ToolCall(ToolCall),
    ToolResult {
        call_id: String,
        name: String,
        content: String,
    },
    Answer(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("model call failed: {0}")]
    Model(#[from] AiError),
    #[error("turn limit exceeded: the model was still requesting tools after {max_turns} turns")]
    TurnLimitExceeded { max_turns: usize },
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub answer: String,
    pub conversation: Conversation,
    /// Number of model calls made.
    pub turns: usize,
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: Arc<dyn ToolExecutor>,
    system_prompt: String,
    max_turns: usize,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("system_prompt", &self.system_prompt)
            .field("max_turns", &self.max_turns)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            model,
            tools,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn tool_count(&self) -> usize {
        self.tools.definitions().len()
    }

    pub async fn run(&self, question: &str) -> Result<AgentOutcome, AgentError> {
        self.run_with_events(question, |_| async {}).await
    }

    /// Alternates model turns and tool turns until the model answers without
    /// requesting tools. Tool calls run one at a time, in the order given.
    pub async fn run_with_events<F, Fut>(
        &self,
        question: &str,
        mut on_event: F,
    ) -> Result<AgentOutcome, AgentError>
    where
        F: FnMut(AgentEvent) -> Fut,
        Fut: Future<Output = ()>,
    {
        let definitions = self.tools.definitions();
        let mut conversation = Conversation::new(self.system_prompt.clone(), question);
        let mut state = LoopState::AwaitingModel;
        let mut turns = 0;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if turns >= self.max_turns {
                        tracing::warn!(max_turns = self.max_turns, "turn limit exceeded");
                        return Err(AgentError::TurnLimitExceeded {
                            max_turns: self.max_turns,
                        });
                    }
                    turns += 1;

                    tracing::debug!(turn = turns, messages = conversation.len(), "calling model");
                    let reply = self
                        .model
                        .complete(conversation.messages(), &definitions)
                        .await?;

                    let answer = reply.content.clone();
                    conversation.push(reply);

                    let pending = conversation.pending_tool_calls();
                    if pending.is_empty() {
                        LoopState::Done(answer)
                    } else {
                        LoopState::AwaitingTools(pending.to_vec())
                    }
                }
                LoopState::AwaitingTools(calls) => {
                    for call in calls {
                        on_event(AgentEvent::ToolCall(call.clone())).await;

                        let content = self.execute(&call).await;

                        on_event(AgentEvent::ToolResult {
                            call_id: call.id.clone(),
                            name: call.name.clone(),
                            content: content.clone(),
                        })
                        .await;
                        conversation.push(Message::tool_result(call.id, content));
                    }
                    LoopState::AwaitingModel
                }
                LoopState::Done(answer) => {
                    tracing::info!(turns, "answer ready");
                    on_event(AgentEvent::Answer(answer.clone())).await;
                    return Ok(AgentOutcome {
                        answer,
                        conversation,
                        turns,
                    });
                }
            };
        }
    }

    /// Never fails: errors become the tool result text the model sees.
    async fn execute(&self, call: &ToolCall) -> String {
        tracing::info!(tool = %call.name, call_id = %call.id, "agent is calling tool");

        match self.tools.invoke(&call.name, &call.arguments).await {
            Ok(output) => output,
            Err(ToolError::NotFound(name)) => {
                tracing::warn!(tool = %name, "model requested an unknown tool");
                format!("Error: Tool '{name}' not found.")
            }
            Err(err) => {
                tracing::warn!(tool = %call.name, "tool failed: {err}");
                format!("Error executing tool: {err}")
            }
        }
    }
}
