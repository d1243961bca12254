//! Article retrieval and normalisation.
//!
//! The retrieval backend is unreliable: records arrive with missing or mistyped
//! fields. [`ArticleSource`] never drops such records; it fills in sentinel values
//! so callers always see as many articles as the backend reported.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::{Result, TechNewsError};

pub const DEFAULT_HEADER: &str = "No title";
pub const DEFAULT_AUTHOR: &str = "N/A";
pub const DEFAULT_CONTENT: &str = "No content available";

/// Normalised news article handed to the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub header: String,
    pub author: String,
    pub date: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Article {
    /// Coerce an arbitrary backend record into an article, defaulting what is missing.
    pub fn from_raw(record: &Value) -> Self {
        Self {
            header: string_field(record, "title").unwrap_or_else(|| DEFAULT_HEADER.to_string()),
            author: string_field(record, "author").unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            date: string_field(record, "publishedAt").unwrap_or_else(|| Utc::now().to_rfc3339()),
            content: string_field(record, "content")
                .unwrap_or_else(|| DEFAULT_CONTENT.to_string()),
            url: string_field(record, "url"),
        }
    }
}

fn string_field(record: &Value, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Ordering requested from the retrieval backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortBy {
    #[default]
    #[serde(rename = "relevancy")]
    Relevancy,
    #[serde(rename = "publishedAt")]
    PublishedAt,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Relevancy => "relevancy",
            SortBy::PublishedAt => "publishedAt",
        }
    }
}

/// Inclusive date range expressed in days before today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub from_days: u32,
    pub to_days: u32,
}

impl FetchWindow {
    pub fn last_days(days: u32) -> Self {
        Self {
            from_days: days,
            to_days: 0,
        }
    }

    /// Calendar dates of the window, or `InvalidQuery` when they fall outside the
    /// representable range.
    fn dates(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        let days_before = |days: u32| {
            today
                .checked_sub_signed(Duration::days(i64::from(days)))
                .ok_or_else(|| {
                    TechNewsError::InvalidQuery(format!(
                        "window reaches {days} days back, beyond the supported date range"
                    ))
                })
        };
        Ok((days_before(self.from_days)?, days_before(self.to_days)?))
    }
}

/// Fetch parameters that do not depend on the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArticleQuery {
    pub window: FetchWindow,
    pub limit: u32,
    pub sort_by: SortBy,
}

impl ArticleQuery {
    /// Two weeks of the most relevant coverage.
    pub fn topic_search() -> Self {
        Self {
            window: FetchWindow::last_days(14),
            limit: 5,
            sort_by: SortBy::Relevancy,
        }
    }

    /// Yesterday's newest articles.
    pub fn latest_headlines() -> Self {
        Self {
            window: FetchWindow::last_days(1),
            limit: 10,
            sort_by: SortBy::PublishedAt,
        }
    }
}

/// Request sent to the retrieval backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub language: String,
    pub sort_by: SortBy,
    pub page_size: u32,
}

/// Raw backend response. Records stay untyped until [`Article::from_raw`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub articles: Vec<Value>,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Must fail with `SourceUnavailable` before any I/O when credentials are missing.
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;
}

/// Wraps the retrieval backend and normalises its records.
pub struct ArticleSource {
    backend: Arc<dyn SearchBackend>,
    language: String,
}

impl ArticleSource {
    pub fn new(backend: Arc<dyn SearchBackend>, language: impl Into<String>) -> Self {
        Self {
            backend,
            language: language.into(),
        }
    }

    #[instrument(name = "article_source.fetch", skip(self, sort_by), fields(sort_by = sort_by.as_str()))]
    pub async fn fetch(
        &self,
        topic: &str,
        window: FetchWindow,
        limit: u32,
        sort_by: SortBy,
    ) -> Result<Vec<Article>> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(TechNewsError::InvalidTopic);
        }
        if limit == 0 {
            return Err(TechNewsError::InvalidQuery("limit must be greater than zero".into()));
        }
        if window.from_days < window.to_days {
            return Err(TechNewsError::InvalidQuery(format!(
                "window starts after it ends (from {} days, to {} days)",
                window.from_days, window.to_days
            )));
        }

        let (from, to) = window.dates(Utc::now().date_naive())?;
        let request = SearchRequest {
            query: topic.to_string(),
            from,
            to,
            language: self.language.clone(),
            sort_by,
            page_size: limit,
        };

        let response = self.backend.search(&request).await?;

        info!(
            status = %response.status,
            total_results = response.total_results,
            articles_count = response.articles.len(),
            "retrieval backend responded"
        );

        let articles: Vec<Article> = response
            .articles
            .iter()
            .take(limit as usize)
            .map(Article::from_raw)
            .collect();

        debug!(count = articles.len(), "normalised articles");
        Ok(articles)
    }

    pub async fn fetch_query(&self, topic: &str, query: ArticleQuery) -> Result<Vec<Article>> {
        self.fetch(topic, query.window, query.limit, query.sort_by)
            .await
    }
}
