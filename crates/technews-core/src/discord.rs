//! Discord REST (v10) transport.
//!
//! Only the outbound half lives here; gateway events are turned into
//! [`InboundEvent`](crate::transport::InboundEvent)s by whatever feeds the scheduler.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::Config;
use crate::redact::redact_secrets;
use crate::security::{SecretValue, require_env};
use crate::transport::{CommandInvocation, CommandSpec, InboundMessage, OutboundMessage, Transport};
use crate::{Result, TechNewsError};

const EPHEMERAL_FLAG: u64 = 1 << 6;
const CALLBACK_CHANNEL_MESSAGE: u8 = 4;
const CALLBACK_DEFERRED_CHANNEL_MESSAGE: u8 = 5;
const CHAT_INPUT_COMMAND: u8 = 1;
const STRING_OPTION: u8 = 3;

/// Channel types that carry text messages (guild text, DM, voice text, group DM,
/// announcement, and the three thread kinds).
const TEXT_CHANNEL_TYPES: [u64; 8] = [0, 1, 2, 3, 5, 10, 11, 12];

pub struct DiscordTransport {
    http: reqwest::Client,
    api_base: String,
    token: SecretValue,
    application_id: String,
}

impl fmt::Debug for DiscordTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordTransport")
            .field("api_base", &self.api_base)
            .field("token", &self.token)
            .field("application_id", &self.application_id)
            .finish()
    }
}

impl DiscordTransport {
    pub fn new(
        api_base: impl Into<String>,
        token: SecretValue,
        application_id: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
            application_id: application_id.into(),
        }
    }

    /// Resolves the bot token and application id from the environment.
    pub fn from_config(config: &Config) -> Result<Self> {
        let token = require_env(&config.transport.token_env)?;
        let application_id = require_env(&config.transport.application_id_env)?;
        Ok(Self::new(
            &config.transport.api_base,
            token,
            application_id.expose(),
        ))
    }

    async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = format!("{}/{}", self.api_base, path);
        debug!(%method, %path, "discord request");

        let mut request = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bot {}", self.token.expose()));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| TechNewsError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (body, _) = redact_secrets(&body);
            warn!(%status, %path, "discord rejected the request");
            return Err(TechNewsError::Transport(format!(
                "discord returned {status} for {path}: {body}"
            )));
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = response
            .text()
            .await
            .map_err(|err| TechNewsError::Transport(err.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|err| TechNewsError::Transport(format!("undecodable reply: {err}")))
    }
}

fn message_body(message: &OutboundMessage) -> Value {
    let mut body = json!({
        "content": message.content,
        "embeds": message.embeds,
    });
    if message.ephemeral {
        body["flags"] = json!(EPHEMERAL_FLAG);
    }
    body
}

fn command_body(spec: &CommandSpec) -> Value {
    let options: Vec<Value> = spec
        .options
        .iter()
        .map(|option| {
            json!({
                "type": STRING_OPTION,
                "name": option.name,
                "description": option.description,
                "required": option.required,
            })
        })
        .collect();

    json!({
        "name": spec.name,
        "description": spec.description,
        "type": CHAT_INPUT_COMMAND,
        "options": options,
    })
}

#[async_trait]
impl Transport for DiscordTransport {
    async fn send(&self, channel_id: &str, message: &OutboundMessage) -> Result<()> {
        let body = message_body(message);
        self.call(
            Method::POST,
            &format!("channels/{channel_id}/messages"),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn reply(&self, original: &InboundMessage, message: &OutboundMessage) -> Result<()> {
        let mut body = message_body(message);
        body["message_reference"] = json!({ "message_id": original.id });
        self.call(
            Method::POST,
            &format!("channels/{}/messages", original.channel_id),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn register_command(&self, spec: &CommandSpec) -> Result<()> {
        let body = command_body(spec);
        self.call(
            Method::POST,
            &format!("applications/{}/commands", self.application_id),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn defer(&self, invocation: &CommandInvocation) -> Result<()> {
        let body = json!({ "type": CALLBACK_DEFERRED_CHANNEL_MESSAGE });
        self.call(
            Method::POST,
            &format!("interactions/{}/{}/callback", invocation.id, invocation.token),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn edit_deferred(
        &self,
        invocation: &CommandInvocation,
        message: &OutboundMessage,
    ) -> Result<()> {
        let body = message_body(message);
        self.call(
            Method::PATCH,
            &format!(
                "webhooks/{}/{}/messages/@original",
                self.application_id, invocation.token
            ),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn respond(
        &self,
        invocation: &CommandInvocation,
        message: &OutboundMessage,
    ) -> Result<()> {
        let body = json!({
            "type": CALLBACK_CHANNEL_MESSAGE,
            "data": message_body(message),
        });
        self.call(
            Method::POST,
            &format!("interactions/{}/{}/callback", invocation.id, invocation.token),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn channel_accepts_messages(&self, channel_id: &str) -> Result<bool> {
        let channel = self
            .call(Method::GET, &format!("channels/{channel_id}"), None)
            .await?;
        let kind = channel.get("type").and_then(Value::as_u64);
        Ok(kind.is_some_and(|kind| TEXT_CHANNEL_TYPES.contains(&kind)))
    }
}
