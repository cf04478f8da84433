//! Chat-completion client used by the orchestrator.
//!
//! The model only proposes: it answers with text or with tool calls, and every tool call is
//! validated and executed by the dispatcher.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use storefront_core::config::{LlmConfig, LlmProvider};

use crate::tools::{ToolDefinition, ToolInvocation};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LlmRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LlmReply {
    Text(String),
    /// Tool calls win over any text the model sent alongside them.
    ToolCalls(Vec<ToolInvocation>),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm client configuration invalid: {0}")]
    Configuration(String),
    #[error("llm request failed: {0}")]
    Request(String),
    #[error("llm request timed out")]
    Timeout,
    #[error("llm returned status {status}: {message}")]
    Server { status: u16, message: String },
    #[error("llm response could not be parsed: {0}")]
    Parse(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmReply, LlmError>;
}

/// Client for any server speaking the OpenAI chat-completions protocol (OpenAI, Ollama).
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.provider == LlmProvider::OpenAi && config.api_key.is_none() {
            return Err(LlmError::Configuration(
                "llm.api_key is required for the openai provider".to_string(),
            ));
        }
        if config.model.trim().is_empty() {
            return Err(LlmError::Configuration("llm.model must not be empty".to_string()));
        }

        let base_url = config.base_url.as_deref().unwrap_or(match config.provider {
            LlmProvider::OpenAi => OPENAI_BASE_URL,
            LlmProvider::Ollama => OLLAMA_BASE_URL,
        });
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;

        Ok(Self {
            client,
            endpoint: completions_endpoint(base_url),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, request: &LlmRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": request.messages,
        });
        if !request.tools.is_empty() {
            body["tools"] =
                Value::Array(request.tools.iter().map(ToolDefinition::to_openai).collect());
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmReply, LlmError> {
        let mut http = self.client.post(&self.endpoint).json(&self.request_body(request));
        if let Some(api_key) = &self.api_key {
            http = http.bearer_auth(api_key.expose_secret());
        }

        let response = http.send().await.map_err(|error| {
            if error.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Request(error.to_string())
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Server { status: status.as_u16(), message });
        }

        let body: Value =
            response.json().await.map_err(|error| LlmError::Parse(error.to_string()))?;
        parse_chat_completion(&body)
    }
}

fn completions_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    }
}

/// Reads the first choice of a chat-completion response body.
///
/// Tool arguments arrive as a JSON-encoded string (OpenAI) or as an object (some Ollama
/// builds). A string that isn't valid JSON is passed through as a string so the dispatcher
/// reports it as unreadable arguments.
pub fn parse_chat_completion(body: &Value) -> Result<LlmReply, LlmError> {
    let message = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| LlmError::Parse("response has no choices[0].message".to_string()))?;

    let calls = message.get("tool_calls").and_then(Value::as_array);
    if let Some(calls) = calls.filter(|calls| !calls.is_empty()) {
        let mut invocations = Vec::with_capacity(calls.len());
        for call in calls {
            let function = call
                .get("function")
                .ok_or_else(|| LlmError::Parse("tool call without function".to_string()))?;
            let name = function
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| LlmError::Parse("tool call without name".to_string()))?;
            let arguments = match function.get("arguments") {
                Some(Value::String(raw)) if raw.trim().is_empty() => json!({}),
                Some(Value::String(raw)) => {
                    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
                }
                Some(Value::Null) | None => json!({}),
                Some(other) => other.clone(),
            };
            invocations.push(ToolInvocation {
                call_id: call.get("id").and_then(Value::as_str).map(str::to_string),
                name: name.to_string(),
                arguments,
            });
        }
        return Ok(LlmReply::ToolCalls(invocations));
    }

    let text = message.get("content").and_then(Value::as_str).unwrap_or_default();
    Ok(LlmReply::Text(text.trim().to_string()))
}
