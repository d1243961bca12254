use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::TechNewsError;
use crate::article::{FetchWindow, SortBy};
use crate::scheduler::{RetryPolicy, SchedulerConfig};
use crate::security::{SecretValue, optional_env};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "TECHNEWS_CONFIG";
/// One year.
const MAX_INTERVAL_HOURS: u64 = 24 * 365;
/// One day.
const MAX_INITIAL_DELAY_SECS: u64 = 24 * 60 * 60;

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub news: NewsConfig,
    pub delivery: DeliveryConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Self, TechNewsError> {
        let config: Config = toml::from_str(raw)
            .map_err(|err| TechNewsError::InvalidConfiguration(err.to_string()))?;
        ConfigLoader::validate(&config)?;
        Ok(config)
    }

    /// Resolve the retrieval credential. Absence is reported by the backend at call time.
    pub fn news_api_key(&self) -> Option<SecretValue> {
        optional_env(&self.news.api_key_env)
    }

    /// Destination channel for the recurring report, if configured.
    pub fn news_channel_id(&self) -> Option<String> {
        optional_env(&self.delivery.channel_id_env).map(|value| value.expose().to_string())
    }

    /// Generation backend base URL, preferring the environment override.
    pub fn generation_base_url(&self) -> String {
        self.generation
            .base_url_env
            .as_deref()
            .and_then(optional_env)
            .map(|value| value.expose().to_string())
            .unwrap_or_else(|| self.generation.base_url.clone())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let delivery = &self.delivery;
        SchedulerConfig {
            channel_id: self.news_channel_id(),
            interval: Duration::from_secs(delivery.interval_hours.saturating_mul(60 * 60)),
            initial_delay: Duration::from_secs(delivery.initial_delay_secs),
            topics: delivery.topics.clone(),
            default_command_topic: delivery.default_command_topic.clone(),
            max_report_chars: delivery.max_report_chars,
            dedupe_in_flight: delivery.dedupe_in_flight,
            retry: RetryPolicy {
                max_retries: delivery.max_retries,
                initial_backoff: Duration::from_millis(delivery.initial_backoff_ms),
                max_backoff: Duration::from_millis(delivery.max_backoff_ms),
            },
        }
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `TECHNEWS_CONFIG` environment variable.
    /// 3. `config.toml` in the current working directory.
    pub fn load(path: Option<PathBuf>) -> Result<Config, TechNewsError> {
        let candidate = resolve_path(path);
        let raw = fs::read_to_string(&candidate)
            .map_err(|err| TechNewsError::config_io(candidate.clone(), err))?;
        Config::from_toml(&raw)
    }

    fn validate(config: &Config) -> Result<(), TechNewsError> {
        let invalid = |msg: &str| Err(TechNewsError::InvalidConfiguration(msg.to_string()));

        if config.news.api_key_env.trim().is_empty() {
            return invalid("news.api_key_env must reference an environment variable");
        }
        if config.delivery.channel_id_env.trim().is_empty() {
            return invalid("delivery.channel_id_env must reference an environment variable");
        }
        if config.transport.token_env.trim().is_empty() {
            return invalid("transport.token_env must reference an environment variable");
        }
        if config.transport.ingress_bind.is_some()
            && config.transport.ingress_token_env.trim().is_empty()
        {
            return invalid("transport.ingress_token_env must reference an environment variable");
        }
        if config.news.page_size == 0 {
            return invalid("news.page_size must be greater than zero");
        }
        if config.news.from_days < config.news.to_days {
            return invalid("news.from_days must not be smaller than news.to_days");
        }
        if config.generation.max_tool_rounds == 0 {
            return invalid("generation.max_tool_rounds must be greater than zero");
        }
        if config.delivery.interval_hours == 0 {
            return invalid("delivery.interval_hours must be greater than zero");
        }
        if config.delivery.interval_hours > MAX_INTERVAL_HOURS {
            return invalid("delivery.interval_hours must not exceed 8760 (one year)");
        }
        if config.delivery.initial_delay_secs > MAX_INITIAL_DELAY_SECS {
            return invalid("delivery.initial_delay_secs must not exceed 86400 (one day)");
        }
        if config.delivery.max_report_chars == 0 {
            return invalid("delivery.max_report_chars must be greater than zero");
        }
        if config.delivery.topics.is_empty()
            || config.delivery.topics.iter().any(|t| t.trim().is_empty())
        {
            return invalid("delivery.topics must list at least one non-empty topic");
        }
        if config.delivery.default_command_topic.trim().is_empty() {
            return invalid("delivery.default_command_topic must not be empty");
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = path {
        return path;
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return PathBuf::from(from_env);
        }
    }

    Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub base_url_env: Option<String>,
    pub model: String,
    pub max_tool_rounds: usize,
    pub request_timeout_secs: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434/api".to_string(),
            base_url_env: Some("SERVER".to_string()),
            model: "gpt-oss:20b".to_string(),
            max_tool_rounds: 5,
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub api_key_env: String,
    pub base_url: String,
    pub language: String,
    pub from_days: u32,
    pub to_days: u32,
    pub page_size: u32,
    pub sort_by: SortBy,
    pub headlines_tool: bool,
}

impl NewsConfig {
    pub fn window(&self) -> FetchWindow {
        FetchWindow {
            from_days: self.from_days,
            to_days: self.to_days,
        }
    }
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_key_env: "NEWS_API_KEY".to_string(),
            base_url: "https://newsapi.org/v2".to_string(),
            language: "en".to_string(),
            from_days: 14,
            to_days: 0,
            page_size: 5,
            sort_by: SortBy::Relevancy,
            headlines_tool: false,
        }
    }
}

/// Which producer the delivery triggers funnel into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    Pipeline,
    Agent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub mode: DeliveryMode,
    pub channel_id_env: String,
    pub interval_hours: u64,
    pub initial_delay_secs: u64,
    pub topics: Vec<String>,
    pub default_command_topic: String,
    pub max_report_chars: usize,
    pub dedupe_in_flight: bool,
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Pipeline,
            channel_id_env: "NEWS_CHANNEL_ID".to_string(),
            interval_hours: 6,
            initial_delay_secs: 30,
            topics: [
                "artificial intelligence",
                "blockchain",
                "cybersecurity",
                "technology trends",
                "machine learning",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            default_command_topic: "technology".to_string(),
            max_report_chars: 8192,
            dedupe_in_flight: false,
            max_retries: 2,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub token_env: String,
    pub application_id_env: String,
    pub api_base: String,
    /// Address for the inbound event endpoint, e.g. `127.0.0.1:8080`. Unset means no
    /// inbound source outside console mode.
    pub ingress_bind: Option<String>,
    /// Bearer token callers of the inbound endpoint must present.
    pub ingress_token_env: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            token_env: "DISCORD_TOKEN".to_string(),
            application_id_env: "DISCORD_APPLICATION_ID".to_string(),
            api_base: "https://discord.com/api/v10".to_string(),
            ingress_bind: None,
            ingress_token_env: "TECHNEWS_INGRESS_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml("").expect("defaults are valid");
        assert_eq!(config.generation.model, "gpt-oss:20b");
        assert_eq!(config.news.page_size, 5);
        assert_eq!(config.news.sort_by, SortBy::Relevancy);
        assert_eq!(config.delivery.interval_hours, 6);
        assert_eq!(config.delivery.initial_delay_secs, 30);
        assert_eq!(config.delivery.topics.len(), 5);
        assert_eq!(config.delivery.max_report_chars, 8192);
        assert_eq!(config.delivery.mode, DeliveryMode::Pipeline);
    }

    #[test]
    fn loads_partial_file_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[news]
page_size = 10
sort_by = "publishedAt"

[delivery]
mode = "agent"
topics = ["rust"]
"#
        )
        .unwrap();

        let config = ConfigLoader::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.news.page_size, 10);
        assert_eq!(config.news.sort_by, SortBy::PublishedAt);
        assert_eq!(config.delivery.mode, DeliveryMode::Agent);
        assert_eq!(config.delivery.topics, vec!["rust".to_string()]);
        assert_eq!(config.delivery.interval_hours, 6);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ConfigLoader::load(Some(PathBuf::from("/nonexistent/technews.toml")))
            .unwrap_err();
        assert!(matches!(err, TechNewsError::ConfigIo { .. }));
    }

    #[test]
    fn rejects_inverted_window() {
        let err = Config::from_toml("[news]\nfrom_days = 1\nto_days = 3\n").unwrap_err();
        assert!(matches!(err, TechNewsError::InvalidConfiguration(_)));
    }

    #[test]
    fn rejects_zero_interval_and_blank_topics() {
        assert!(Config::from_toml("[delivery]\ninterval_hours = 0\n").is_err());
        assert!(Config::from_toml("[delivery]\ntopics = [\"ai\", \" \"]\n").is_err());
        assert!(Config::from_toml("[delivery]\ntopics = []\n").is_err());
    }

    #[test]
    fn rejects_oversized_schedule_values() {
        let err = Config::from_toml("[delivery]\ninterval_hours = 9223372036854775807\n")
            .unwrap_err();
        assert!(matches!(err, TechNewsError::InvalidConfiguration(_)));
        assert!(Config::from_toml("[delivery]\ninterval_hours = 8761\n").is_err());
        assert!(Config::from_toml("[delivery]\ninterval_hours = 8760\n").is_ok());
        assert!(Config::from_toml("[delivery]\ninitial_delay_secs = 86401\n").is_err());
    }

    #[test]
    fn scheduler_config_saturates_unvalidated_intervals() {
        let mut config = Config::default();
        config.delivery.interval_hours = u64::MAX;
        assert_eq!(config.scheduler_config().interval, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn scheduler_config_converts_units() {
        let config = Config::default();
        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.interval, Duration::from_secs(6 * 60 * 60));
        assert_eq!(scheduler.initial_delay, Duration::from_secs(30));
        assert_eq!(scheduler.retry.max_retries, 2);
        assert_eq!(scheduler.retry.initial_backoff, Duration::from_millis(1000));
    }

    #[test]
    fn ingress_is_opt_in() {
        let config = Config::default();
        assert_eq!(config.transport.ingress_bind, None);
        assert_eq!(config.transport.ingress_token_env, "TECHNEWS_INGRESS_TOKEN");

        let config = Config::from_toml("[transport]\ningress_bind = \"127.0.0.1:8080\"\n").unwrap();
        assert_eq!(config.transport.ingress_bind.as_deref(), Some("127.0.0.1:8080"));

        let err = Config::from_toml(
            "[transport]\ningress_bind = \"127.0.0.1:8080\"\ningress_token_env = \" \"\n",
        )
        .unwrap_err();
        assert!(matches!(err, TechNewsError::InvalidConfiguration(_)));
    }
}
