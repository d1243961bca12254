//! Local stand-in for the chat platform: stdin lines in, stdout messages out.

use async_trait::async_trait;
use technews_core::transport::{Author, COMMAND_NAME, CommandSpec, TOPIC_OPTION};
use technews_core::{
    CommandInvocation, InboundEvent, InboundMessage, OutboundMessage, Result, Transport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

pub const CONSOLE_CHANNEL: &str = "console";

#[derive(Debug, Default)]
pub struct ConsoleTransport;

impl ConsoleTransport {
    fn print(&self, target: &str, message: &OutboundMessage) {
        let visibility = if message.ephemeral { " (ephemeral)" } else { "" };
        println!("[{target}]{visibility} {}", message.content);
        for embed in &message.embeds {
            match serde_json::to_string_pretty(embed) {
                Ok(rendered) => println!("{rendered}"),
                Err(err) => warn!(error = %err, "unable to render embed"),
            }
        }
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send(&self, channel_id: &str, message: &OutboundMessage) -> Result<()> {
        self.print(&format!("#{channel_id}"), message);
        Ok(())
    }

    async fn reply(&self, original: &InboundMessage, message: &OutboundMessage) -> Result<()> {
        self.print(&format!("reply to {}", original.id), message);
        Ok(())
    }

    async fn register_command(&self, spec: &CommandSpec) -> Result<()> {
        println!("/{} [{}] registered", spec.name, TOPIC_OPTION);
        Ok(())
    }

    async fn defer(&self, invocation: &CommandInvocation) -> Result<()> {
        println!("[/{}] thinking...", invocation.command_name);
        Ok(())
    }

    async fn edit_deferred(
        &self,
        invocation: &CommandInvocation,
        message: &OutboundMessage,
    ) -> Result<()> {
        self.print(&format!("/{}", invocation.command_name), message);
        Ok(())
    }

    async fn respond(
        &self,
        invocation: &CommandInvocation,
        message: &OutboundMessage,
    ) -> Result<()> {
        self.print(&format!("/{}", invocation.command_name), message);
        Ok(())
    }

    async fn channel_accepts_messages(&self, _channel_id: &str) -> Result<bool> {
        Ok(true)
    }
}

/// `/technews [topic]` becomes a command; any other non-empty line a message.
pub fn parse_line(line: &str) -> Option<InboundEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let id = Uuid::new_v4().to_string();
    let command_prefix = format!("/{COMMAND_NAME}");

    if let Some(rest) = line.strip_prefix(&command_prefix) {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            let mut invocation = CommandInvocation {
                id: id.clone(),
                token: id,
                channel_id: CONSOLE_CHANNEL.to_string(),
                command_name: COMMAND_NAME.to_string(),
                ..CommandInvocation::default()
            };
            let topic = rest.trim();
            if !topic.is_empty() {
                invocation
                    .options
                    .insert(TOPIC_OPTION.to_string(), topic.to_string());
            }
            return Some(InboundEvent::Command(invocation));
        }
    }

    Some(InboundEvent::Message(InboundMessage {
        id,
        channel_id: CONSOLE_CHANNEL.to_string(),
        author: Author {
            id: "console".to_string(),
            name: "console".to_string(),
            bot: false,
        },
        content: line.to_string(),
    }))
}

/// Forward stdin lines as events until stdin closes or the receiver goes away.
pub fn spawn_stdin_reader(events: mpsc::Sender<InboundEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let Some(event) = parse_line(&line) else {
                        continue;
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "failed to read stdin");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_lines_become_invocations() {
        match parse_line("/technews  quantum computing ") {
            Some(InboundEvent::Command(invocation)) => {
                assert_eq!(invocation.command_name, "technews");
                assert_eq!(invocation.option("topic"), Some("quantum computing"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        match parse_line("/technews") {
            Some(InboundEvent::Command(invocation)) => assert!(invocation.options.is_empty()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn other_lines_become_messages() {
        match parse_line("/technewsletter") {
            Some(InboundEvent::Message(message)) => {
                assert_eq!(message.content, "/technewsletter");
                assert!(!message.author.bot);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(parse_line("   ").is_none());
    }
}
