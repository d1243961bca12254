//! Chat-platform boundary: outbound delivery, command registration and inbound events.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub const COMMAND_NAME: &str = "technews";
pub const TOPIC_OPTION: &str = "topic";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// Rich card attached to a message. Unset fields are omitted from the wire payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    /// RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub content: String,
    pub embeds: Vec<Embed>,
    /// Only visible to the invoking user; honoured for command responses.
    pub ephemeral: bool,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub channel_id: String,
    pub author: Author,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub id: String,
    /// Continuation token used to answer the invocation later.
    pub token: String,
    pub channel_id: String,
    pub command_name: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl CommandInvocation {
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }
}

/// Wire form is tagged: `{"type": "message", ...}` or `{"type": "command", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Message(InboundMessage),
    Command(CommandInvocation),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOptionSpec {
    pub name: String,
    pub description: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    pub options: Vec<CommandOptionSpec>,
}

/// `/technews [topic]`.
pub fn technews_command() -> CommandSpec {
    CommandSpec {
        name: COMMAND_NAME.to_string(),
        description: "Get the latest tech news".to_string(),
        options: vec![CommandOptionSpec {
            name: TOPIC_OPTION.to_string(),
            description: "Specific tech topic (e.g., AI, blockchain, cybersecurity)".to_string(),
            required: false,
        }],
    }
}

/// Outbound side of the chat platform. Implementations must be safe for concurrent use.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, channel_id: &str, message: &OutboundMessage) -> Result<()>;

    async fn reply(&self, original: &InboundMessage, message: &OutboundMessage) -> Result<()>;

    async fn register_command(&self, spec: &CommandSpec) -> Result<()>;

    /// Acknowledge a command now and answer it later with [`Transport::edit_deferred`].
    async fn defer(&self, invocation: &CommandInvocation) -> Result<()>;

    async fn edit_deferred(
        &self,
        invocation: &CommandInvocation,
        message: &OutboundMessage,
    ) -> Result<()>;

    /// Answer a command that was never deferred.
    async fn respond(&self, invocation: &CommandInvocation, message: &OutboundMessage)
    -> Result<()>;

    async fn channel_accepts_messages(&self, channel_id: &str) -> Result<bool>;
}
