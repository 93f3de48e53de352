use ai::{Message, Role, ToolCall};

/// Ordered message history for one question. Entries can only be appended;
/// the whole sequence is replayed to the model on every turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Seeds the history with the system instruction and the user question.
    pub fn new(system: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system), Message::user(question)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Tool calls of the most recent assistant turn, if it is the last message.
    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        match self.last() {
            Some(msg) if msg.role == Role::Assistant => &msg.tool_calls,
            _ => &[],
        }
    }

    /// Pairs every tool request with the tool result that answered it.
    pub fn tool_exchanges(&self) -> Vec<(&ToolCall, &Message)> {
        self.messages
            .iter()
            .flat_map(|msg| msg.tool_calls.iter())
            .filter_map(|call| {
                self.messages
                    .iter()
                    .find(|msg| {
                        msg.role == Role::Tool && msg.tool_call_id.as_deref() == Some(call.id.as_str())
                    })
                    .map(|result| (call, result))
            })
            .collect()
    }
}
