//! Topic-to-report composition and the agent-style producer.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::article::{ArticleQuery, ArticleSource};
use crate::extract::{ResultExtractor, ResultTree};
use crate::generation::{Generator, Message, ToolSet};
use crate::prompts::REPORTER_INSTRUCTIONS;
use crate::redact::redact_secrets;
use crate::stages::{ExtractionStage, Stage, SynthesisStage, string_field};
use crate::tools::{NewsSearchTool, ReportTool};
use crate::{Result, TechNewsError};

pub const NO_REPORT_PLACEHOLDER: &str = "Không tìm thấy nội dung bài báo.";

/// Anything that turns a topic into a deliverable report.
#[async_trait]
pub trait ReportProducer: Send + Sync {
    async fn produce(&self, topic: &str) -> Result<String>;
}

/// Extraction followed by synthesis, with payload checks between them.
///
/// Never retries; callers decide whether a failed run is rerun.
pub struct Pipeline {
    extraction: Arc<dyn Stage>,
    synthesis: Arc<dyn Stage>,
}

impl Pipeline {
    pub fn new(extraction: Arc<dyn Stage>, synthesis: Arc<dyn Stage>) -> Self {
        Self {
            extraction,
            synthesis,
        }
    }

    /// Standard wiring: the search tool over `source`, one generator for both stages.
    pub fn from_parts(
        generator: Arc<dyn Generator>,
        source: Arc<ArticleSource>,
        query: ArticleQuery,
        with_headlines: bool,
    ) -> Self {
        let mut tools =
            ToolSet::new().with(Arc::new(NewsSearchTool::topic_search(source.clone(), query)));
        if with_headlines {
            tools.add(Arc::new(NewsSearchTool::headlines(source)));
        }

        Self::new(
            Arc::new(ExtractionStage::new(generator.clone(), tools)),
            Arc::new(SynthesisStage::new(generator)),
        )
    }

    #[instrument(name = "pipeline.run", skip(self))]
    pub async fn run(&self, topic: &str) -> Result<String> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(TechNewsError::InvalidTopic);
        }

        let started = Instant::now();

        let extracted = self.extraction.run(json!({ "topic": topic })).await?;
        let findings = string_field(&extracted, "articles", self.extraction.id())?;
        debug!(findings_len = findings.len(), "extraction payload accepted");

        let synthesized = self
            .synthesis
            .run(json!({ "articles": findings }))
            .await?;
        let report = string_field(&synthesized, "articles", self.synthesis.id())?;
        if report.trim().is_empty() {
            return Err(TechNewsError::schema(
                self.synthesis.id(),
                "report must not be empty",
            ));
        }

        info!(
            report_len = report.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline completed"
        );
        Ok(report.to_string())
    }
}

#[async_trait]
impl ReportProducer for Pipeline {
    async fn produce(&self, topic: &str) -> Result<String> {
        self.run(topic).await
    }
}

/// Asks the generator to answer as a reporter that calls the whole pipeline as a tool,
/// then digs the report out of whatever came back.
pub struct ReporterAgent {
    generator: Arc<dyn Generator>,
    tools: ToolSet,
    extractor: ResultExtractor,
}

impl ReporterAgent {
    pub fn new(generator: Arc<dyn Generator>, pipeline: Arc<dyn ReportProducer>) -> Self {
        Self {
            generator,
            tools: ToolSet::new().with(Arc::new(ReportTool::new(pipeline))),
            extractor: ResultExtractor::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: ResultExtractor) -> Self {
        self.extractor = extractor;
        self
    }
}

#[async_trait]
impl ReportProducer for ReporterAgent {
    #[instrument(name = "reporter_agent.produce", skip(self))]
    async fn produce(&self, topic: &str) -> Result<String> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(TechNewsError::InvalidTopic);
        }

        let messages = [Message::system(REPORTER_INSTRUCTIONS), Message::user(topic)];
        let generation = self.generator.generate(&messages, &self.tools).await?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            let (payload, hits) = redact_secrets(&generation.to_value().to_string());
            debug!(redactions = ?hits, payload = %payload, "reporter agent result");
        }

        let tree = ResultTree::from_generation(&generation);
        match self.extractor.extract(&tree) {
            Ok(report) => Ok(report),
            Err(TechNewsError::ExtractionNotFound) => {
                warn!("no report found in agent result, falling back to plain text");
                Ok(generation
                    .text()
                    .map(str::to_string)
                    .unwrap_or_else(|| NO_REPORT_PLACEHOLDER.to_string()))
            }
            Err(err) => Err(err),
        }
    }
}
