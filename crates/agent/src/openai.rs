use std::time::Duration;

use async_trait::async_trait;
use projbot_core::config::LlmConfig;
use projbot_core::session::{Message, Role, ToolCall};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::llm::{Decision, LlmClient, LlmError};

/// Chat-completions client with function calling against an OpenAI-style
/// endpoint.
pub struct OpenAiClient {
    http: reqwest::Client,
    completions_url: String,
    api_key: SecretString,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::Transport("llm.api_key is not configured".to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Transport(format!("http client build failed: {error}")))?;

        Ok(Self {
            http,
            completions_url: format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn wire_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };
                let mut wire = json!({ "role": role, "content": message.content });
                if !message.tool_calls.is_empty() {
                    wire["tool_calls"] = Value::Array(
                        message
                            .tool_calls
                            .iter()
                            .map(|call| {
                                json!({
                                    "id": call.id,
                                    "type": "function",
                                    "function": {
                                        "name": call.name,
                                        "arguments": call.arguments.to_string(),
                                    },
                                })
                            })
                            .collect(),
                    );
                }
                if let Some(call_id) = &message.tool_call_id {
                    wire["tool_call_id"] = json!(call_id);
                }
                wire
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    /// The arguments object arrives JSON-encoded inside a string.
    arguments: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Value],
    temperature: f64,
    max_tokens: u32,
}

// The endpoint rejects an empty tools array, so leave the field out entirely.
fn no_tools(tools: &&[Value]) -> bool {
    tools.is_empty()
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn decide(&self, messages: &[Message], tools: &[Value]) -> Result<Decision, LlmError> {
        let request = CompletionRequest {
            model: &self.model,
            messages: Self::wire_messages(messages),
            tools,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&self.completions_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Transport(format!(
                "completions endpoint returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let payload: CompletionResponse = response
            .json()
            .await
            .map_err(|error| LlmError::Protocol(error.to_string()))?;
        let choice = payload
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Protocol("response carried no choices".to_string()))?;

        if !choice.message.tool_calls.is_empty() {
            let mut calls = Vec::with_capacity(choice.message.tool_calls.len());
            for wire in choice.message.tool_calls {
                let arguments: Value = serde_json::from_str(&wire.function.arguments)
                    .map_err(|error| {
                        LlmError::Protocol(format!(
                            "arguments for {} are not valid JSON: {error}",
                            wire.function.name
                        ))
                    })?;
                calls.push(ToolCall { id: wire.id, name: wire.function.name, arguments });
            }
            debug!(event_name = "agent.llm.invoke", call_count = calls.len());
            return Ok(Decision::Invoke(calls));
        }

        let content = choice.message.content.unwrap_or_default();
        let content = content.trim();
        if content.is_empty() {
            return Err(LlmError::Protocol(
                "response had neither content nor tool calls".to_string(),
            ));
        }
        Ok(Decision::Final(content.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use projbot_core::session::{Message, ToolCall};
    use serde_json::json;

    use super::OpenAiClient;

    #[test]
    fn wire_messages_carry_tool_call_linkage() {
        let call = ToolCall {
            id: "call-1".into(),
            name: "search_projects".into(),
            arguments: json!({ "query": "website" }),
        };
        let messages = vec![
            Message::user("find the website project"),
            Message::assistant_with_tool_calls(vec![call]),
            Message::tool("call-1", r#"{"ok":true}"#),
        ];

        let wire = OpenAiClient::wire_messages(&messages);

        assert_eq!(wire[0]["role"], "user");
        assert_eq!(wire[1]["tool_calls"][0]["function"]["name"], "search_projects");
        assert_eq!(
            wire[1]["tool_calls"][0]["function"]["arguments"],
            r#"{"query":"website"}"#
        );
        assert_eq!(wire[2]["role"], "tool");
        assert_eq!(wire[2]["tool_call_id"], "call-1");
    }
}
