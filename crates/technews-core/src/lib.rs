//! Technology news reporting core.
//!
//! A topic goes through a two-stage generation [`Pipeline`] (article extraction, then
//! synthesis) and the resulting report is delivered by the [`DeliveryScheduler`], which
//! fans in chat messages, slash commands and a recurring timer. Collaborators (the
//! generation backend, the article search backend and the chat transport) sit behind
//! traits so that processes wire them explicitly.

pub mod article;
pub mod config;
pub mod delivery;
pub mod discord;
pub mod error;
pub mod extract;
pub mod generation;
pub mod metrics;
pub mod newsapi;
pub mod ollama;
pub mod pipeline;
pub mod prompts;
pub mod redact;
pub mod scheduler;
pub mod security;
pub mod stages;
pub mod telemetry;
pub mod tools;
pub mod transport;

pub use article::{Article, ArticleQuery, ArticleSource, FetchWindow, SearchBackend, SortBy};
pub use config::{Config, ConfigLoader, DeliveryMode};
pub use delivery::truncate_report;
pub use discord::DiscordTransport;
pub use error::{Result, TechNewsError};
pub use extract::{Node, NodeId, ResultExtractor, ResultTree};
pub use generation::{Generation, Generator, Message, Role, Tool, ToolSet};
pub use newsapi::NewsApiClient;
pub use ollama::OllamaGenerator;
pub use pipeline::{Pipeline, ReportProducer, ReporterAgent};
pub use scheduler::{
    DeliveryOutcome, DeliveryScheduler, RetryPolicy, ScheduleHandle, SchedulerConfig, SkipReason,
};
pub use stages::{ExtractionStage, Stage, SynthesisStage};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use tools::{NewsSearchTool, ReportTool};
pub use transport::{
    CommandInvocation, CommandSpec, Embed, InboundEvent, InboundMessage, OutboundMessage,
    Transport,
};
