//! Multi-turn chat with tool calls.

use std::future::Future;

use serde::Serialize;
use serde_json::Value;

use crate::{Client, ContentBlock, LlmError, Message, MessageRequest, Role, extract_text};

/// Upper bound on model/tool round trips for a single user turn.
pub const MAX_TOOL_ROUNDS: usize = 8;
const CHAT_MAX_TOKENS: u32 = 4096;

/// A tool the model may call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Executes tool calls on behalf of a [`Conversation`].
pub trait ToolHandler {
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Runs a tool. An `Err` is reported back to the model as a failed call.
    fn call(&self, name: &str, input: &Value) -> impl Future<Output = Result<Value, String>>;
}

/// Chat history plus the settings needed to continue it.
#[derive(Debug, Clone)]
pub struct Conversation {
    model: String,
    system: String,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(model: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Starts over with an empty history.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Sends a user message and returns the model's final text answer,
    /// running any tools it asks for in between.
    ///
    /// On error the history is restored to what it was before the call.
    pub async fn send<H: ToolHandler>(
        &mut self,
        client: &Client,
        tools: &H,
        text: &str,
    ) -> Result<String, LlmError> {
        let checkpoint = self.messages.len();
        self.messages.push(Message::user_text(text));
        let result = self.run(client, tools).await;
        if result.is_err() {
            self.messages.truncate(checkpoint);
        }
        result
    }

    async fn run<H: ToolHandler>(&mut self, client: &Client, tools: &H) -> Result<String, LlmError> {
        let definitions = tools.definitions();

        for round in 0..MAX_TOOL_ROUNDS {
            let request = MessageRequest {
                model: &self.model,
                max_tokens: CHAT_MAX_TOKENS,
                system: Some(&self.system),
                tools: &definitions,
                messages: &self.messages,
            };
            let response = client.create_message(&request).await?;
            let wants_tools = response.wants_tools();
            let content: Vec<ContentBlock> = response
                .content
                .into_iter()
                .filter(|block| *block != ContentBlock::Unknown)
                .collect();

            let calls: Vec<(String, String, Value)> = content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect();

            if !wants_tools || calls.is_empty() {
                let answer = extract_text(&content)?;
                self.messages.push(Message {
                    role: Role::Assistant,
                    content,
                });
                return Ok(answer);
            }

            self.messages.push(Message {
                role: Role::Assistant,
                content,
            });

            let mut results = Vec::with_capacity(calls.len());
            for (id, name, input) in calls {
                tracing::debug!(round, tool = %name, "running tool");
                let (content, is_error) = match tools.call(&name, &input).await {
                    Ok(value) => (value.to_string(), false),
                    Err(message) => {
                        tracing::warn!(tool = %name, error = %message, "tool call failed");
                        (message, true)
                    }
                };
                results.push(ContentBlock::ToolResult {
                    tool_use_id: id,
                    content,
                    is_error,
                });
            }
            self.messages.push(Message {
                role: Role::User,
                content: results,
            });
        }

        Err(LlmError::ToolRounds(MAX_TOOL_ROUNDS))
    }
}
