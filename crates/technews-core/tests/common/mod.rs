#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use technews_core::article::{SearchRequest, SearchResponse};
use technews_core::transport::{Author, CommandInvocation, CommandSpec, InboundMessage};
use technews_core::{
    Generation, Generator, Message, OutboundMessage, ReportProducer, Result, Role, SearchBackend,
    TechNewsError, ToolSet, Transport,
};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Retrieval backend that serves fixed records and remembers every request.
pub struct StaticBackend {
    pub records: Vec<Value>,
    pub requests: Mutex<Vec<SearchRequest>>,
}

impl StaticBackend {
    pub fn new(records: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            records,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SearchBackend for StaticBackend {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(SearchResponse {
            status: "ok".into(),
            total_results: self.records.len() as u64,
            articles: self.records.clone(),
        })
    }
}

/// Generator that behaves like a cooperative model: with tools on offer it calls the
/// first one with the user's topic and reports the result; without tools it answers
/// with `summary`.
pub struct ToolCallingGenerator {
    pub summary: Option<String>,
    pub calls: Mutex<Vec<Vec<Message>>>,
}

impl ToolCallingGenerator {
    pub fn new(summary: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            summary: summary.map(str::to_string),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ToolCallingGenerator {
    async fn generate(&self, messages: &[Message], tools: &ToolSet) -> Result<Generation> {
        self.calls.lock().unwrap().push(messages.to_vec());

        let topic = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.clone())
            .unwrap_or_default();

        let Some(name) = tools.names().first().map(|name| name.to_string()) else {
            return Ok(Generation {
                text: self.summary.clone(),
                structured: None,
            });
        };

        let tool = tools
            .get(&name)
            .ok_or_else(|| TechNewsError::GenerationFailed(format!("tool {name} vanished")))?;
        let arguments = json!({ "topic": topic });
        let result = tool.call(arguments.clone()).await?;

        Ok(Generation {
            text: Some(format!("Tool {name} returned: {result}")),
            structured: Some(json!({
                "steps": [{ "tool": name, "arguments": arguments, "result": result }]
            })),
        })
    }
}

/// Generator that always fails and counts attempts.
#[derive(Default)]
pub struct FailingGenerator {
    pub attempts: Mutex<usize>,
}

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _messages: &[Message], _tools: &ToolSet) -> Result<Generation> {
        *self.attempts.lock().unwrap() += 1;
        Err(TechNewsError::GenerationFailed("backend timed out".into()))
    }
}

/// Producer that replays queued results, then keeps answering with `fallback`.
pub struct ScriptedProducer {
    pub responses: Mutex<VecDeque<Result<String>>>,
    pub fallback: String,
    pub topics: Mutex<Vec<String>>,
}

impl ScriptedProducer {
    pub fn new(fallback: &str) -> Arc<Self> {
        Self::with_responses(fallback, Vec::new())
    }

    pub fn with_responses(fallback: &str, responses: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            fallback: fallback.to_string(),
            topics: Mutex::new(Vec::new()),
        })
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportProducer for ScriptedProducer {
    async fn produce(&self, topic: &str) -> Result<String> {
        self.topics.lock().unwrap().push(topic.to_string());
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Producer that blocks until released, to hold a topic in flight.
#[derive(Default)]
pub struct GatedProducer {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl ReportProducer for GatedProducer {
    async fn produce(&self, topic: &str) -> Result<String> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(format!("report on {topic}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Available,
    Rejecting,
    Unreachable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send {
        channel_id: String,
        message: OutboundMessage,
    },
    Reply {
        message_id: String,
        message: OutboundMessage,
    },
    Register(CommandSpec),
    Defer(String),
    EditDeferred {
        token: String,
        message: OutboundMessage,
    },
    Respond {
        token: String,
        message: OutboundMessage,
    },
    ChannelCheck(String),
}

/// In-memory transport recording every call with the (virtual) time it happened.
#[derive(Default)]
pub struct RecordingTransport {
    pub channel: ChannelState,
    pub fail_defer: bool,
    calls: Mutex<Vec<(Instant, Call)>>,
    changed: Notify,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_channel(channel: ChannelState) -> Arc<Self> {
        Arc::new(Self {
            channel,
            ..Self::default()
        })
    }

    pub fn failing_defer() -> Arc<Self> {
        Arc::new(Self {
            fail_defer: true,
            ..Self::default()
        })
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((Instant::now(), call));
        self.changed.notify_one();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Channel sends with the time they happened.
    pub fn sends(&self) -> Vec<(Instant, String, OutboundMessage)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(at, call)| match call {
                Call::Send {
                    channel_id,
                    message,
                } => Some((*at, channel_id.clone(), message.clone())),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `count` channel sends have been recorded.
    pub async fn wait_for_sends(&self, count: usize) {
        loop {
            if self.sends().len() >= count {
                return;
            }
            self.changed.notified().await;
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, channel_id: &str, message: &OutboundMessage) -> Result<()> {
        self.record(Call::Send {
            channel_id: channel_id.to_string(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn reply(&self, original: &InboundMessage, message: &OutboundMessage) -> Result<()> {
        self.record(Call::Reply {
            message_id: original.id.clone(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn register_command(&self, spec: &CommandSpec) -> Result<()> {
        self.record(Call::Register(spec.clone()));
        Ok(())
    }

    async fn defer(&self, invocation: &CommandInvocation) -> Result<()> {
        if self.fail_defer {
            return Err(TechNewsError::Transport("interaction expired".into()));
        }
        self.record(Call::Defer(invocation.token.clone()));
        Ok(())
    }

    async fn edit_deferred(
        &self,
        invocation: &CommandInvocation,
        message: &OutboundMessage,
    ) -> Result<()> {
        self.record(Call::EditDeferred {
            token: invocation.token.clone(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn respond(
        &self,
        invocation: &CommandInvocation,
        message: &OutboundMessage,
    ) -> Result<()> {
        self.record(Call::Respond {
            token: invocation.token.clone(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn channel_accepts_messages(&self, channel_id: &str) -> Result<bool> {
        self.record(Call::ChannelCheck(channel_id.to_string()));
        match self.channel {
            ChannelState::Available => Ok(true),
            ChannelState::Rejecting => Ok(false),
            ChannelState::Unreachable => Err(TechNewsError::Transport("unknown channel".into())),
        }
    }
}

pub fn user_message(id: &str, content: &str) -> InboundMessage {
    InboundMessage {
        id: id.to_string(),
        channel_id: "chan-1".to_string(),
        author: Author {
            id: "user-1".to_string(),
            name: "reader".to_string(),
            bot: false,
        },
        content: content.to_string(),
    }
}

pub fn command(token: &str, topic: Option<&str>) -> CommandInvocation {
    let mut invocation = CommandInvocation {
        id: format!("interaction-{token}"),
        token: token.to_string(),
        channel_id: "chan-1".to_string(),
        command_name: "technews".to_string(),
        ..CommandInvocation::default()
    };
    if let Some(topic) = topic {
        invocation
            .options
            .insert("topic".to_string(), topic.to_string());
    }
    invocation
}
