//! Chat-Completions Client
//!
//! Thin client for an OpenAI-style chat endpoint with function calling.
//! One request, one response; failures surface once and are not retried.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Client errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Set on tool-role messages: the call this result answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on tool-role messages: the tool that produced the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: &str) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::plain("assistant", content)
    }

    /// Tool result message answering `call_id` from tool `name`
    pub fn tool_result(call_id: &str, name: &str, result: &Value) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(result.to_string()),
            tool_calls: None,
            tool_call_id: Some(call_id.to_string()),
            name: Some(name.to_string()),
        }
    }

    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn default_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

impl ToolCall {
    /// Decode the argument string; malformed arguments become an empty object
    pub fn parse_arguments(&self) -> Value {
        serde_json::from_str(&self.function.arguments)
            .unwrap_or_else(|_| Value::Object(Default::default()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

/// Chat-completions API client
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: Option<&str>, base_url: &str, model: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: api_key.map(|s| s.to_string()),
            base_url: base_url.to_string(),
            model: model.to_string(),
        }
    }

    /// Create from config
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(
            config.llm_api_key.as_deref(),
            &config.llm_base_url,
            &config.llm_model,
        )
    }

    /// Check if an API key is configured
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send the conversation, optionally with tool schemas
    ///
    /// Returns the assistant message from `choices[0]`. Tool schemas use the
    /// `{type: "function", function: {...}}` envelope.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
    ) -> Result<ChatMessage, LlmError> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::MissingApiKey)?;

        let request = ChatRequest {
            model: &self.model,
            messages,
            tools,
            tool_choice: if tools.is_some() { Some("auto") } else { None },
            stream: false,
        };

        debug!(
            "LLM request: model={}, messages={}, tools={}",
            self.model,
            messages.len(),
            tools.map(|t| t.len()).unwrap_or(0)
        );

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            info!(
                "LLM response: model={}, in={}, out={}",
                self.model, usage.prompt_tokens, usage.completion_tokens
            );
        }

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::Malformed("empty choices array".to_string()))
    }

    /// Single-turn chat without tools; returns the text content
    pub async fn simple_chat(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(prompt)];
        let reply = self.chat(&messages, None).await?;
        Ok(reply.content.unwrap_or_default())
    }
}
