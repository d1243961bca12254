use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::article::{SearchBackend, SearchRequest, SearchResponse};
use crate::config::Config;
use crate::redact::redact_secrets;
use crate::security::SecretValue;
use crate::{Result, TechNewsError};

const NEWSAPI_URL: &str = "https://newsapi.org/v2";

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// `everything` endpoint of newsapi.org.
pub struct NewsApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretValue>,
    key_env: String,
}

impl fmt::Debug for NewsApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewsApiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key)
            .finish()
    }
}

impl NewsApiClient {
    pub fn new(api_key: Option<SecretValue>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: NEWSAPI_URL.to_string(),
            api_key,
            key_env: "NEWS_API_KEY".to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.news.base_url.trim_end_matches('/').to_string(),
            api_key: config.news_api_key(),
            key_env: config.news.api_key_env.clone(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SearchBackend for NewsApiClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let Some(api_key) = self.api_key.as_ref() else {
            return Err(TechNewsError::SourceUnavailable(format!(
                "{} is not set",
                self.key_env
            )));
        };

        let url = format!("{}/everything", self.base_url);
        let from = request.from.format("%Y-%m-%d").to_string();
        let to = request.to.format("%Y-%m-%d").to_string();
        let page_size = request.page_size.to_string();

        debug!(query = %request.query, %from, %to, "searching news backend");

        let response = self
            .http
            .get(&url)
            .header("X-Api-Key", api_key.expose())
            .query(&[
                ("q", request.query.as_str()),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("language", request.language.as_str()),
                ("sortBy", request.sort_by.as_str()),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(|err| TechNewsError::SourceUnavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|err| err.message.or(err.code))
                .unwrap_or_else(|| redact_secrets(&body).0);
            warn!(%status, "news backend rejected the request");
            return Err(TechNewsError::SourceUnavailable(format!(
                "news backend returned {status}: {detail}"
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|err| TechNewsError::SourceUnavailable(format!("undecodable reply: {err}")))?;

        if body.status == "error" {
            return Err(TechNewsError::SourceUnavailable(
                "news backend reported an error status".to_string(),
            ));
        }

        Ok(body)
    }
}
