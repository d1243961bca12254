//! The two generation stages of the news pipeline.
//!
//! Stages exchange JSON objects: extraction takes `{topic}` and yields
//! `{articles}`; synthesis takes `{articles}` and yields `{articles}`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::generation::{Generator, Message, ToolSet};
use crate::prompts::{NEWS_INSTRUCTIONS, WRITER_INSTRUCTIONS, synthesis_prompt};
use crate::{Result, TechNewsError};

pub const NO_ARTICLES_PLACEHOLDER: &str = "No articles found.";
pub const NO_SUMMARY_PLACEHOLDER: &str = "No summary available.";

/// A single step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> &str;

    async fn run(&self, input: Value) -> Result<Value>;
}

/// Read a required string field from a stage payload.
pub fn string_field<'a>(payload: &'a Value, field: &str, stage: &str) -> Result<&'a str> {
    match payload.get(field) {
        Some(Value::String(value)) => Ok(value.as_str()),
        Some(other) => Err(TechNewsError::schema(
            stage,
            format!("`{field}` must be a string, got {}", json_kind(other)),
        )),
        None => Err(TechNewsError::schema(stage, format!("missing `{field}`"))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Turns a topic into raw findings, letting the generator call the search tools.
pub struct ExtractionStage {
    generator: Arc<dyn Generator>,
    tools: ToolSet,
}

impl ExtractionStage {
    pub fn new(generator: Arc<dyn Generator>, tools: ToolSet) -> Self {
        Self { generator, tools }
    }

    #[instrument(name = "stage.extraction", skip(self))]
    pub async fn extract(&self, topic: &str) -> Result<String> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(TechNewsError::InvalidTopic);
        }

        info!(%topic, tools = ?self.tools.names(), "fetching latest articles");

        let messages = [Message::system(NEWS_INSTRUCTIONS), Message::user(topic)];
        let generation = self.generator.generate(&messages, &self.tools).await?;

        let findings = match generation.text() {
            Some(text) => text.to_string(),
            None => {
                let structured = generation.structured.unwrap_or_else(|| json!({}));
                serde_json::to_string_pretty(&structured)
                    .map_err(|err| TechNewsError::GenerationFailed(err.to_string()))?
            }
        };

        info!(findings_len = findings.len(), "finished fetching articles");
        Ok(findings)
    }
}

#[async_trait]
impl Stage for ExtractionStage {
    fn id(&self) -> &str {
        "extraction"
    }

    async fn run(&self, input: Value) -> Result<Value> {
        let topic = string_field(&input, "topic", self.id())?;
        let findings = self.extract(topic).await?;
        Ok(json!({ "articles": findings }))
    }
}

/// Condenses raw findings into the audience-facing report.
pub struct SynthesisStage {
    generator: Arc<dyn Generator>,
}

impl SynthesisStage {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    #[instrument(name = "stage.synthesis", skip_all, fields(findings_len = findings.len()))]
    pub async fn synthesize(&self, findings: &str) -> Result<String> {
        if findings.is_empty() {
            debug!("no findings; skipping synthesis call");
            return Ok(NO_ARTICLES_PLACEHOLDER.to_string());
        }

        let messages = [
            Message::system(WRITER_INSTRUCTIONS),
            Message::user(synthesis_prompt(findings)),
        ];
        let generation = self.generator.generate(&messages, &ToolSet::new()).await?;

        Ok(generation
            .text()
            .map(str::to_string)
            .unwrap_or_else(|| NO_SUMMARY_PLACEHOLDER.to_string()))
    }
}

#[async_trait]
impl Stage for SynthesisStage {
    fn id(&self) -> &str {
        "synthesis"
    }

    async fn run(&self, input: Value) -> Result<Value> {
        let findings = string_field(&input, "articles", self.id())?;
        let report = self.synthesize(findings).await?;
        Ok(json!({ "articles": report }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::Generation;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        reply: Generation,
        calls: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedGenerator {
        fn new(reply: Generation) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, messages: &[Message], _tools: &ToolSet) -> Result<Generation> {
            self.calls.lock().unwrap().push(messages.to_vec());
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn extraction_rejects_blank_topic_without_calling_backend() {
        let generator = ScriptedGenerator::new(Generation::from_text("unused"));
        let stage = ExtractionStage::new(generator.clone(), ToolSet::new());

        let err = stage.extract("   ").await.unwrap_err();
        assert!(matches!(err, TechNewsError::InvalidTopic));
        assert!(generator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn extraction_sends_topic_as_opening_user_message() {
        let generator = ScriptedGenerator::new(Generation::from_text("3 articles"));
        let stage = ExtractionStage::new(generator.clone(), ToolSet::new());

        assert_eq!(stage.extract(" rust ").await.unwrap(), "3 articles");
        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls[0][1], Message::user("rust"));
    }

    #[tokio::test]
    async fn extraction_serialises_structured_result_when_text_is_absent() {
        let generator = ScriptedGenerator::new(Generation {
            text: None,
            structured: Some(json!({"articles": [{"header": "A"}]})),
        });
        let stage = ExtractionStage::new(generator, ToolSet::new());

        let findings = stage.extract("ai").await.unwrap();
        let parsed: Value = serde_json::from_str(&findings).unwrap();
        assert_eq!(parsed["articles"][0]["header"], "A");
    }

    #[tokio::test]
    async fn extraction_yields_empty_object_when_nothing_came_back() {
        let generator = ScriptedGenerator::new(Generation::default());
        let stage = ExtractionStage::new(generator, ToolSet::new());
        assert_eq!(stage.extract("ai").await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn synthesis_short_circuits_on_empty_findings() {
        let generator = ScriptedGenerator::new(Generation::from_text("unused"));
        let stage = SynthesisStage::new(generator.clone());

        assert_eq!(stage.synthesize("").await.unwrap(), NO_ARTICLES_PLACEHOLDER);
        assert!(generator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn synthesis_embeds_findings_and_falls_back_to_placeholder() {
        let generator = ScriptedGenerator::new(Generation::default());
        let stage = SynthesisStage::new(generator.clone());

        assert_eq!(
            stage.synthesize("raw findings").await.unwrap(),
            NO_SUMMARY_PLACEHOLDER
        );
        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0][1].content.contains("raw findings"));
    }

    #[tokio::test]
    async fn stage_payloads_are_validated() {
        let generator = ScriptedGenerator::new(Generation::from_text("x"));
        let stage = SynthesisStage::new(generator);

        let err = stage.run(json!({"articles": 7})).await.unwrap_err();
        assert!(matches!(err, TechNewsError::SchemaViolation { .. }));

        let out = stage.run(json!({"articles": "findings"})).await.unwrap();
        assert_eq!(out, json!({"articles": "x"}));
    }
}
