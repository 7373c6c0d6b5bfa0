//! OpenAI-compatible chat completions with function calling

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{ChatSnapshot, Role, Turn};
use crate::functions::{FunctionCall, FunctionDefinition};
use crate::pipeline::{Completion, LanguageModel};
use crate::voice::DEFAULT_BASE_URL;
use crate::{Error, Result};

/// Chat completions client
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Message {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl Message {
    const fn text(role: &'static str, content: String) -> Self {
        Self {
            role,
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Serialize)]
struct Tool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a FunctionDefinition,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ToolCall {
    id: String,
    #[serde(rename = "type")]
    tool_type: String,
    function: ToolFunction,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ToolFunction {
    name: String,
    /// JSON-encoded arguments
    arguments: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

impl OpenAiChat {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for chat completions".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: None,
        })
    }

    /// Point at a different OpenAI-compatible server
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Cap completion length
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn complete(
        &self,
        chat: &ChatSnapshot,
        functions: &[FunctionDefinition],
    ) -> Result<Completion> {
        let request = ChatRequest {
            model: &self.model,
            messages: to_messages(chat),
            tools: functions
                .iter()
                .map(|function| Tool {
                    tool_type: "function",
                    function,
                })
                .collect(),
            max_tokens: self.max_tokens,
        };

        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "requesting completion"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Model(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!("chat API error {status}: {body}")));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Model(format!("failed to parse completion: {e}")))?;

        let message = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Model("completion had no choices".to_string()))?
            .message;

        parse_message(message)
    }
}

fn parse_message(message: ResponseMessage) -> Result<Completion> {
    let text = message.content.unwrap_or_default();

    let Some(tool_call) = message.tool_calls.into_iter().next() else {
        return Ok(Completion::text(text));
    };

    let arguments: Value = if tool_call.function.arguments.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&tool_call.function.arguments).map_err(|e| {
            Error::Model(format!(
                "malformed arguments for {}: {e}",
                tool_call.function.name
            ))
        })?
    };

    Ok(Completion {
        text,
        function_call: Some(FunctionCall {
            id: tool_call.id,
            name: tool_call.function.name,
            arguments,
        }),
    })
}

/// Map the session log onto chat messages
///
/// A function turn becomes the assistant's tool call followed by the tool
/// result, which is the pairing the API requires.
fn to_messages(chat: &ChatSnapshot) -> Vec<Message> {
    let mut messages = Vec::with_capacity(chat.len());
    for turn in chat.iter() {
        match turn.role {
            Role::System => messages.push(Message::text("system", turn.text.clone())),
            Role::User => messages.push(Message::text("user", turn.text.clone())),
            Role::Assistant => messages.push(Message::text("assistant", turn.text.clone())),
            Role::Function => push_function_turn(&mut messages, turn),
        }
    }
    messages
}

fn push_function_turn(messages: &mut Vec<Message>, turn: &Turn) {
    let Some(call) = &turn.call else {
        messages.push(Message::text(
            "system",
            format!("Function result: {}", turn.text),
        ));
        return;
    };

    messages.push(Message {
        role: "assistant",
        content: None,
        tool_calls: Some(vec![ToolCall {
            id: call.id.clone(),
            tool_type: "function".to_string(),
            function: ToolFunction {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        }]),
        tool_call_id: None,
    });
    messages.push(Message {
        role: "tool",
        content: Some(turn.text.clone()),
        tool_calls: None,
        tool_call_id: Some(call.id.clone()),
    });
}
