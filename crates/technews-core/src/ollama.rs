//! Ollama chat backend with a bounded tool-call loop.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::generation::{Generation, Generator, Message, Role, ToolSet};
use crate::redact::redact_secrets;
use crate::{Result, TechNewsError};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: Role,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

impl WireMessage {
    fn tool_result(name: &str, result: &Value) -> Self {
        Self {
            role: Role::Tool,
            content: result.to_string(),
            tool_calls: Vec::new(),
            tool_name: Some(name.to_string()),
        }
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<WireMessage>,
    #[serde(default)]
    error: Option<String>,
}

pub struct OllamaGenerator {
    http: reqwest::Client,
    base_url: String,
    model: String,
    max_tool_rounds: usize,
}

impl fmt::Debug for OllamaGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaGenerator")
            .field("http", &"<reqwest::Client>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish()
    }
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tool_rounds: 5,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.generation.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|err| TechNewsError::InvalidConfiguration(err.to_string()))?;

        Ok(Self {
            http,
            base_url: config
                .generation_base_url()
                .trim_end_matches('/')
                .to_string(),
            model: config.generation.model.clone(),
            max_tool_rounds: config.generation.max_tool_rounds,
        })
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    async fn chat(&self, messages: &[WireMessage], tools: &ToolSet) -> Result<Value> {
        let url = format!("{}/chat", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages,
            tools: tools.definitions(),
            stream: false,
        };

        debug!(model = %self.model, messages = messages.len(), "generation request");

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|err| TechNewsError::GenerationFailed(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (body, _) = redact_secrets(&body);
            return Err(TechNewsError::GenerationFailed(format!(
                "backend returned {status}: {body}"
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| TechNewsError::GenerationFailed(format!("undecodable reply: {err}")))
    }

    async fn invoke(tools: &ToolSet, call: &FunctionCall) -> Value {
        let Some(tool) = tools.get(call.name.trim()) else {
            warn!(tool = %call.name, "model requested an unknown tool");
            return json!({ "error": format!("unknown tool `{}`", call.name) });
        };

        let arguments = match &call.arguments {
            Value::String(raw) => serde_json::from_str(raw).unwrap_or(Value::Null),
            other => other.clone(),
        };

        match tool.call(arguments).await {
            Ok(result) => result,
            Err(err) => {
                warn!(tool = %call.name, error = %err, "tool call failed");
                json!({ "error": err.to_string() })
            }
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    #[instrument(name = "generation.ollama", skip_all, fields(model = %self.model))]
    async fn generate(&self, messages: &[Message], tools: &ToolSet) -> Result<Generation> {
        let mut history: Vec<WireMessage> = messages.iter().map(WireMessage::from).collect();
        let mut steps = Vec::new();
        let no_tools = ToolSet::new();

        for round in 0..=self.max_tool_rounds {
            let offered = if round < self.max_tool_rounds {
                tools
            } else {
                &no_tools
            };
            let raw = self.chat(&history, offered).await?;
            let reply: ChatResponse = serde_json::from_value(raw.clone())
                .map_err(|err| TechNewsError::GenerationFailed(format!("malformed reply: {err}")))?;

            if let Some(error) = reply.error {
                return Err(TechNewsError::GenerationFailed(error));
            }
            let message = reply.message.ok_or_else(|| {
                TechNewsError::GenerationFailed("reply carried no message".to_string())
            })?;

            if message.tool_calls.is_empty() {
                let text = Some(message.content.trim().to_string()).filter(|t| !t.is_empty());
                debug!(round, steps = steps.len(), has_text = text.is_some(), "generation finished");
                return Ok(Generation {
                    text,
                    structured: Some(json!({ "response": raw, "steps": steps })),
                });
            }

            history.push(message.clone());
            for call in &message.tool_calls {
                let result = Self::invoke(tools, &call.function).await;
                history.push(WireMessage::tool_result(&call.function.name, &result));
                steps.push(json!({
                    "tool": call.function.name,
                    "arguments": call.function.arguments,
                    "result": result,
                }));
            }
        }

        Err(TechNewsError::GenerationFailed(format!(
            "model kept requesting tools after {} rounds",
            self.max_tool_rounds
        )))
    }
}
