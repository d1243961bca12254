//! Tools exposed to the generation backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use crate::article::{ArticleQuery, ArticleSource};
use crate::generation::Tool;
use crate::pipeline::ReportProducer;
use crate::{Result, TechNewsError};

const HEADLINES_TOPIC: &str = "artificial intelligence";

fn topic_argument(arguments: &Value) -> Result<&str> {
    arguments
        .get("topic")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .ok_or(TechNewsError::InvalidTopic)
}

fn topic_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "topic": {
                "type": "string",
                "description": "Topic to search news for, e.g. \"technology\""
            }
        },
        "required": ["topic"]
    })
}

/// Searches the article source on the model's behalf.
pub struct NewsSearchTool {
    source: Arc<ArticleSource>,
    query: ArticleQuery,
    fixed_topic: Option<&'static str>,
    name: &'static str,
    description: &'static str,
}

impl NewsSearchTool {
    pub fn topic_search(source: Arc<ArticleSource>, query: ArticleQuery) -> Self {
        Self {
            source,
            query,
            fixed_topic: None,
            name: "news_search",
            description: "Extract the latest news articles on a technology topic",
        }
    }

    /// Yesterday's newest AI coverage; takes no arguments.
    pub fn headlines(source: Arc<ArticleSource>) -> Self {
        Self {
            source,
            query: ArticleQuery::latest_headlines(),
            fixed_topic: Some(HEADLINES_TOPIC),
            name: "tech_headlines",
            description: "Extract the newest artificial intelligence headlines from the last day",
        }
    }
}

#[async_trait]
impl Tool for NewsSearchTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters(&self) -> Value {
        if self.fixed_topic.is_some() {
            json!({"type": "object", "properties": {}})
        } else {
            topic_schema()
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let topic = match self.fixed_topic {
            Some(topic) => topic,
            None => topic_argument(&arguments)?,
        };

        let articles = self.source.fetch_query(topic, self.query).await?;
        info!(tool = self.name, %topic, count = articles.len(), "news search tool returned");

        if articles.is_empty() {
            return Ok(json!({
                "articles": [],
                "searchTopic": format!("No articles found for {topic}."),
            }));
        }

        Ok(json!({
            "articles": articles,
            "searchTopic": topic,
        }))
    }
}

/// Runs a whole report producer as a single tool call.
pub struct ReportTool {
    producer: Arc<dyn ReportProducer>,
}

impl ReportTool {
    pub fn new(producer: Arc<dyn ReportProducer>) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl Tool for ReportTool {
    fn name(&self) -> &str {
        "news_workflow"
    }

    fn description(&self) -> &str {
        "Fetch the latest news on a technology topic and return a summarized report"
    }

    fn parameters(&self) -> Value {
        topic_schema()
    }

    async fn call(&self, arguments: Value) -> Result<Value> {
        let topic = topic_argument(&arguments)?;
        let report = self.producer.produce(topic).await?;
        Ok(json!({ "articles": report }))
    }
}
